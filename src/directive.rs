use std::str::FromStr;

use crate::{
    error::{AsmError, ErrorKind},
    lexer::{Statement, Token, TokenKind},
    memory::{parse_value, MemoryImage, CAPACITY, DATA_MAX, DATA_MIN},
    symbol::{is_valid_label, Symbol, SymbolError, SymbolTable},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    Data,
    String,
    Mat,
    Extern,
    Entry,
}

impl DirKind {
    pub fn name(self) -> &'static str {
        match self {
            DirKind::Data => ".data",
            DirKind::String => ".string",
            DirKind::Mat => ".mat",
            DirKind::Extern => ".extern",
            DirKind::Entry => ".entry",
        }
    }

    /// Directives that place words in memory. Labels in front of them are data labels.
    pub fn emits_data(self) -> bool {
        matches!(self, DirKind::Data | DirKind::String | DirKind::Mat)
    }
}

impl FromStr for DirKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ".data" => Ok(DirKind::Data),
            ".string" => Ok(DirKind::String),
            ".mat" => Ok(DirKind::Mat),
            ".extern" => Ok(DirKind::Extern),
            ".entry" => Ok(DirKind::Entry),
            _ => Err(()),
        }
    }
}

/// A checked directive, ready to be applied.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Directive {
    /// `.data`, `.string` and `.mat` all reduce to a run of data words
    Words(Vec<i16>),
    Extern(String),
    Entry(String),
}

/// Validate a directive line whose head is `kind`. Nothing is changed yet.
pub fn parse(kind: DirKind, stmt: &Statement) -> Result<Directive, AsmError> {
    let err = |e: ErrorKind, tok: &Token| AsmError::new(e, stmt.line, tok.span);
    let missing = || {
        AsmError::new(
            ErrorKind::MissingOperand {
                directive: kind.name(),
            },
            stmt.line,
            stmt.body_span(),
        )
    };

    match kind {
        DirKind::Data => {
            if stmt.operands.is_empty() {
                return Err(missing());
            }
            stmt.operands
                .iter()
                .map(|tok| literal(tok).ok_or_else(|| err(invalid_literal(tok), tok)))
                .collect::<Result<Vec<_>, _>>()
                .map(Directive::Words)
        }
        DirKind::String => {
            let tok = stmt.operands.first().ok_or_else(missing)?;
            let text = match tok.kind {
                TokenKind::Str { terminated: true } => &tok.text[1..tok.text.len() - 1],
                _ => return Err(err(ErrorKind::InvalidStringLiteral, tok)),
            };
            if !text.is_ascii() {
                return Err(err(ErrorKind::InvalidStringLiteral, tok));
            }
            no_more(stmt, 1)?;
            let mut words: Vec<i16> = text.bytes().map(i16::from).collect();
            words.push(0);
            Ok(Directive::Words(words))
        }
        DirKind::Mat => {
            let (dims, used) = matrix_dims(&stmt.operands).ok_or_else(missing)?;
            let dims_span = stmt.operands[0].span.join(stmt.operands[used - 1].span);
            let (rows, cols) = parse_dims(&dims).ok_or_else(|| {
                AsmError::new(
                    ErrorKind::InvalidMatrixDimensions { dims: dims.clone() },
                    stmt.line,
                    dims_span,
                )
            })?;
            let cells = rows
                .checked_mul(cols)
                .filter(|cells| *cells <= CAPACITY)
                .ok_or_else(|| AsmError::new(ErrorKind::MemoryOverflow, stmt.line, dims_span))?;

            let inits = &stmt.operands[used..];
            if inits.len() > cells {
                return Err(err(
                    ErrorKind::TooManyInitializers {
                        cells,
                        given: inits.len(),
                    },
                    &inits[cells],
                ));
            }
            let mut words = inits
                .iter()
                .map(|tok| literal(tok).ok_or_else(|| err(invalid_literal(tok), tok)))
                .collect::<Result<Vec<_>, _>>()?;
            words.resize(cells, 0);
            Ok(Directive::Words(words))
        }
        DirKind::Extern | DirKind::Entry => {
            let tok = stmt.operands.first().ok_or_else(missing)?;
            if !is_valid_label(&tok.text) {
                return Err(err(
                    ErrorKind::InvalidLabel {
                        name: tok.text.clone(),
                    },
                    tok,
                ));
            }
            no_more(stmt, 1)?;
            Ok(match kind {
                DirKind::Extern => Directive::Extern(tok.text.clone()),
                _ => Directive::Entry(tok.text.clone()),
            })
        }
    }
}

/// Carry out a parsed directive. `.entry` waits for the second pass.
pub fn apply(
    dir: &Directive,
    symbols: &mut SymbolTable,
    memory: &mut MemoryImage,
) -> Result<(), ErrorKind> {
    match dir {
        Directive::Words(words) => memory.push_data_all(words),
        Directive::Extern(name) => symbols
            .add(Symbol::external(name))
            .map_err(|_: SymbolError| ErrorKind::DuplicateSymbol { name: name.clone() }),
        Directive::Entry(_) => Ok(()),
    }
}

fn literal(tok: &Token) -> Option<i16> {
    match tok.kind {
        TokenKind::Word => parse_value(&tok.text, DATA_MIN, DATA_MAX),
        _ => None,
    }
}

fn invalid_literal(tok: &Token) -> ErrorKind {
    ErrorKind::InvalidLiteral {
        literal: tok.text.clone(),
    }
}

fn no_more(stmt: &Statement, expected: usize) -> Result<(), AsmError> {
    let extra = stmt.operands.get(expected..).unwrap_or(&[]);
    match (extra.first(), extra.last()) {
        (Some(first), Some(last)) => Err(AsmError::new(
            ErrorKind::ExtraneousText {
                text: extra
                    .iter()
                    .map(|tok| tok.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            },
            stmt.line,
            first.span.join(last.span),
        )),
        _ => Ok(()),
    }
}

/// Dimension text and the number of operand tokens it spans. `[2][3]` and `[2] [3]` are both accepted.
fn matrix_dims(operands: &[Token]) -> Option<(String, usize)> {
    let first = operands.first()?;
    match operands.get(1) {
        Some(next)
            if first.text.starts_with('[')
                && first.text.matches('[').count() == 1
                && next.text.starts_with('[') =>
        {
            Some((format!("{}{}", first.text, next.text), 2))
        }
        _ => Some((first.text.clone(), 1)),
    }
}

fn parse_dims(text: &str) -> Option<(usize, usize)> {
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;
    let (rows, cols) = inner.split_once("][")?;
    let dim = |s: &str| -> Option<usize> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok().filter(|n| *n > 0)
    };
    Some((dim(rows)?, dim(cols)?))
}
