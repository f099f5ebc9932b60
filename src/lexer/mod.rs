use crate::lexer::cursor::Cursor;
use crate::span::Span;

pub mod cursor;

/// A 'light' token that only carries basic and easily derivable info
#[derive(Debug)]
pub struct LToken {
    pub kind: LTokenKind,
    pub len: u32,
}

impl LToken {
    pub fn new(kind: LTokenKind, len: u32) -> Self {
        LToken { kind, len }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LTokenKind {
    /// Any run of characters that is not whitespace, a comment or a string
    Word,
    Str {
        terminated: bool,
    },
    Comment,
    /// Also includes commas
    Whitespace,
    Eof,
}

/// Test if a character separates tokens.
pub(crate) fn is_whitespace(c: char) -> bool {
    // Commas only separate operands
    matches!(c, ' ' | '\t' | '\r' | '\n' | ',')
}

fn is_word(c: char) -> bool {
    !is_whitespace(c) && c != ';' && c != '"'
}

impl Cursor<'_> {
    pub fn advance_token(&mut self) -> LToken {
        let first_char = match self.bump() {
            Some(c) => c,
            None => return LToken::new(LTokenKind::Eof, 0),
        };
        let token_kind = match first_char {
            ';' => {
                self.take_while(|c| c != '\n');
                LTokenKind::Comment
            }
            c if is_whitespace(c) => {
                self.take_while(is_whitespace);
                LTokenKind::Whitespace
            }
            '"' => {
                self.take_while(|c| c != '"' && c != '\n');
                let terminated = self.first() == '"';
                if terminated {
                    self.bump();
                }
                LTokenKind::Str { terminated }
            }
            _ => {
                self.take_while(is_word);
                LTokenKind::Word
            }
        };
        let res = LToken::new(token_kind, self.pos_in_token());
        self.reset_pos();
        res
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// `NAME:` at the start of a line. The colon is not part of the text.
    Label,
    /// Word starting with `.`
    Directive,
    Word,
    Str { terminated: bool },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

/// One normalized source line, split into its parts.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Statement {
    /// 1-based line number
    pub line: usize,
    /// Whole line without the line terminator
    pub span: Span,
    /// Line length in characters
    pub width: usize,
    pub label: Option<Token>,
    /// Directive or mnemonic
    pub head: Option<Token>,
    pub operands: Vec<Token>,
}

impl Statement {
    /// Span from the head to the last operand, or the whole line.
    pub fn body_span(&self) -> Span {
        match (&self.head, self.operands.last()) {
            (Some(head), Some(last)) => head.span.join(last.span),
            (Some(head), None) => head.span,
            _ => self.span,
        }
    }

    pub fn is_directive(&self, name: &str) -> bool {
        matches!(&self.head, Some(tok) if tok.kind == TokenKind::Directive && tok.text == name)
    }
}

/// Split a source into statements. Blank and comment-only lines are dropped.
pub fn lex(src: &str) -> Vec<Statement> {
    let mut offs = 0;
    let mut stmts = Vec::new();
    for (idx, raw) in src.split_inclusive('\n').enumerate() {
        let line = raw.trim_end_matches(|c: char| c == '\n' || c == '\r');
        if let Some(stmt) = lex_line(line, offs, idx + 1) {
            stmts.push(stmt);
        }
        offs += raw.len();
    }
    stmts
}

/// Lex a single line starting at byte `offs` of the source.
pub fn lex_line(line: &str, offs: usize, line_no: usize) -> Option<Statement> {
    let mut cursor = Cursor::new(line);
    let mut pos = 0usize;
    let mut toks: Vec<Token> = Vec::new();
    loop {
        let ltok = cursor.advance_token();
        let len = ltok.len as usize;
        let text = &line[pos..pos + len];
        let span = Span::at(offs + pos, len);
        pos += len;
        let kind = match ltok.kind {
            LTokenKind::Eof => break,
            LTokenKind::Whitespace | LTokenKind::Comment => continue,
            LTokenKind::Str { terminated } => TokenKind::Str { terminated },
            LTokenKind::Word if toks.is_empty() && text.len() > 1 && text.ends_with(':') => {
                toks.push(Token {
                    kind: TokenKind::Label,
                    text: text[..text.len() - 1].to_string(),
                    span: Span::at(span.offs(), len - 1),
                });
                continue;
            }
            LTokenKind::Word if text.starts_with('.') => TokenKind::Directive,
            LTokenKind::Word => TokenKind::Word,
        };
        toks.push(Token {
            kind,
            text: text.to_string(),
            span,
        });
    }
    if toks.is_empty() {
        return None;
    }

    let mut toks = toks.into_iter().peekable();
    let label = toks.next_if(|tok| tok.kind == TokenKind::Label);
    let head = toks.next();
    Some(Statement {
        line: line_no,
        span: Span::at(offs, line.len()),
        width: line.chars().count(),
        label,
        head,
        operands: toks.collect(),
    })
}
