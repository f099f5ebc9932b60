use tracing::debug;

use crate::{
    error::{AsmError, ErrorKind},
    lexer::{lex_line, Statement, TokenKind},
    span::Span,
    symbol::{is_reserved, is_valid_label, FxMap},
};

const MACRO_START: &str = "macro";
const MACRO_END: &str = "endmacro";

/// A definition being read. Bodies of rejected definitions are still consumed.
struct OpenMacro<'a> {
    name: String,
    line: usize,
    span: Span,
    accepted: bool,
    body: Vec<&'a str>,
}

/// Expand `macro NAME` ... `endmacro` blocks into a normalized source.
///
/// Definitions are collected first, so a macro may be used above its definition.
/// Bodies are copied as they are; macro calls inside a body are not expanded.
/// Trailing whitespace is trimmed from every output line.
pub fn expand_macros(src: &str) -> Result<String, Vec<AsmError>> {
    let mut macros: FxMap<String, Vec<&str>> = FxMap::default();
    let mut errors = Vec::new();
    let mut kept: Vec<(&str, Option<Statement>)> = Vec::new();
    let mut open: Option<OpenMacro> = None;

    let mut offs = 0;
    for (idx, raw) in src.split_inclusive('\n').enumerate() {
        let line = raw.trim_end_matches(|c: char| c == '\n' || c == '\r');
        let stmt = lex_line(line, offs, idx + 1);
        offs += raw.len();

        let keyword = stmt.as_ref().and_then(macro_keyword);
        if let Some(def) = open.as_mut() {
            match keyword {
                Some(MACRO_END) => {
                    if let Some(stmt) = &stmt {
                        errors.extend(trailing(stmt));
                    }
                    if let Some(def) = open.take() {
                        if def.accepted {
                            debug!(name = %def.name, lines = def.body.len(), "macro defined");
                            macros.insert(def.name, def.body);
                        }
                    }
                    continue;
                }
                Some(MACRO_START) => {
                    errors.push(AsmError::new(
                        ErrorKind::UnterminatedMacro {
                            name: def.name.clone(),
                        },
                        def.line,
                        def.span,
                    ));
                    open = None;
                }
                _ => {
                    def.body.push(line);
                    continue;
                }
            }
        }

        match (keyword, &stmt) {
            (Some(MACRO_START), Some(stmt)) => {
                let (def, err) = start_macro(stmt, &macros);
                errors.extend(err);
                open = Some(def);
            }
            (Some(MACRO_END), Some(stmt)) => errors.push(AsmError::new(
                ErrorKind::UnrecognizedStatement,
                stmt.line,
                stmt.body_span(),
            )),
            _ => kept.push((line, stmt)),
        }
    }
    if let Some(def) = open {
        errors.push(AsmError::new(
            ErrorKind::UnterminatedMacro { name: def.name },
            def.line,
            def.span,
        ));
    }

    let mut out = String::with_capacity(src.len());
    for (line, stmt) in kept {
        let call = stmt.as_ref().and_then(|stmt| {
            let head = stmt.head.as_ref().filter(|_| stmt.label.is_none())?;
            macros.get(&head.text).map(|body| (stmt, body))
        });
        match call {
            Some((stmt, body)) => {
                errors.extend(trailing(stmt));
                for body_line in body {
                    out.push_str(body_line.trim_end());
                    out.push('\n');
                }
            }
            None => {
                out.push_str(line.trim_end());
                out.push('\n');
            }
        }
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        errors.sort_by_key(|err| err.line);
        Err(errors)
    }
}

/// `macro` or `endmacro` when a line consists of that keyword (and its operands).
fn macro_keyword(stmt: &Statement) -> Option<&'static str> {
    let head = stmt.head.as_ref()?;
    if stmt.label.is_some() || head.kind != TokenKind::Word {
        return None;
    }
    [MACRO_START, MACRO_END]
        .into_iter()
        .find(|kw| *kw == head.text)
}

fn start_macro<'a>(
    stmt: &Statement,
    macros: &FxMap<String, Vec<&'a str>>,
) -> (OpenMacro<'a>, Option<AsmError>) {
    let span = stmt.body_span();
    let mut def = OpenMacro {
        name: String::new(),
        line: stmt.line,
        span,
        accepted: false,
        body: Vec::new(),
    };
    let Some(name) = stmt.operands.first() else {
        let kind = ErrorKind::MissingOperand {
            directive: MACRO_START,
        };
        return (def, Some(AsmError::new(kind, stmt.line, span)));
    };
    def.name = name.text.clone();
    if stmt.operands.len() > 1 {
        return (def, trailing_from(stmt, 1));
    }

    let kind = if is_reserved(&name.text) {
        ErrorKind::MacroNameReserved {
            name: name.text.clone(),
        }
    } else if !is_valid_label(&name.text) {
        ErrorKind::InvalidLabel {
            name: name.text.clone(),
        }
    } else if macros.contains_key(&name.text) {
        ErrorKind::DuplicateMacro {
            name: name.text.clone(),
        }
    } else {
        def.accepted = true;
        return (def, None);
    };
    (def, Some(AsmError::new(kind, stmt.line, name.span)))
}

/// Error for operands after `endmacro` or a macro call.
fn trailing(stmt: &Statement) -> Option<AsmError> {
    trailing_from(stmt, 0)
}

fn trailing_from(stmt: &Statement, skip: usize) -> Option<AsmError> {
    let extra = stmt.operands.get(skip..)?;
    let (first, last) = (extra.first()?, extra.last()?);
    let text = extra
        .iter()
        .map(|tok| tok.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Some(AsmError::new(
        ErrorKind::ExtraneousText { text },
        stmt.line,
        first.span.join(last.span),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<ErrorKind> {
        expand_macros(src)
            .unwrap_err()
            .into_iter()
            .map(|err| err.kind)
            .collect()
    }

    #[test]
    fn expands_calls() {
        let src = "\
macro twoinc
    inc r1
    inc r2
endmacro
MAIN: mov r1, r2
twoinc
    stop
";
        let out = expand_macros(src).unwrap();
        assert_eq!(out, "MAIN: mov r1, r2\n    inc r1\n    inc r2\n    stop\n");
    }

    #[test]
    fn use_before_definition() {
        let src = "twice\nmacro twice\nprn #1\nprn #1\nendmacro\n";
        assert_eq!(expand_macros(src).unwrap(), "prn #1\nprn #1\n");
    }

    #[test]
    fn bodies_are_not_expanded_again() {
        let src = "macro a\nb\nendmacro\nmacro b\nstop\nendmacro\na\n";
        assert_eq!(expand_macros(src).unwrap(), "b\n");
    }

    #[test]
    fn plain_source_is_only_trimmed() {
        let src = "; comment  \nMAIN: stop\t\n\n";
        assert_eq!(expand_macros(src).unwrap(), "; comment\nMAIN: stop\n\n");
    }

    #[test]
    fn labelled_line_is_not_a_call() {
        let src = "macro m\nstop\nendmacro\nL: m\n";
        assert_eq!(expand_macros(src).unwrap(), "L: m\n");
    }

    #[test]
    fn unterminated() {
        assert_eq!(
            kinds("macro m\nstop\n"),
            vec![ErrorKind::UnterminatedMacro { name: "m".into() }]
        );
        assert_eq!(
            kinds("macro m\nstop\nmacro n\nrts\nendmacro\n"),
            vec![ErrorKind::UnterminatedMacro { name: "m".into() }]
        );
    }

    #[test]
    fn bad_names() {
        assert_eq!(
            kinds("macro mov\nstop\nendmacro\n"),
            vec![ErrorKind::MacroNameReserved { name: "mov".into() }]
        );
        assert_eq!(
            kinds("macro r3\nendmacro\n"),
            vec![ErrorKind::MacroNameReserved { name: "r3".into() }]
        );
        assert_eq!(
            kinds("macro\nstop\nendmacro\n"),
            vec![ErrorKind::MissingOperand { directive: "macro" }]
        );
        assert_eq!(
            kinds("macro 9m\nendmacro\n"),
            vec![ErrorKind::InvalidLabel { name: "9m".into() }]
        );
    }

    #[test]
    fn duplicate_definition() {
        let src = "macro m\nstop\nendmacro\nmacro m\nrts\nendmacro\nm\n";
        let errs = expand_macros(src).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::DuplicateMacro { name: "m".into() });
        assert_eq!(errs[0].line, 4);
    }

    #[test]
    fn trailing_text() {
        assert!(matches!(
            kinds("macro m x\nendmacro\n")[..],
            [ErrorKind::ExtraneousText { .. }]
        ));
        assert!(matches!(
            kinds("macro m\nstop\nendmacro\nm r1\n")[..],
            [ErrorKind::ExtraneousText { .. }]
        ));
        assert_eq!(kinds("endmacro\n"), vec![ErrorKind::UnrecognizedStatement]);
    }

    #[test]
    fn error_spans_point_into_source() {
        let src = "stop\nmacro mov\nendmacro\n";
        let err = &expand_macros(src).unwrap_err()[0];
        assert_eq!(&src[err.span.unwrap().as_range()], "mov");
    }
}
