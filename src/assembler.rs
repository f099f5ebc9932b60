use tracing::{debug, trace};

use crate::{
    directive::{self, DirKind, Directive},
    encoder,
    error::{AsmError, ErrorKind},
    fixup,
    lexer::{lex, Statement, TokenKind},
    memory::{MemoryImage, BASE_ADDRESS},
    opcode::Opcode,
    operand::Operand,
    span::Span,
    symbol::{is_valid_label, Symbol, SymbolError, SymbolKind, SymbolTable},
};

/// Longest accepted source line, in characters.
pub const MAX_LINE_LEN: usize = 80;

/// An instruction kept around for the second pass.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct InstructionRecord {
    /// Address of the base word. Final once the fixup pass has run.
    pub address: u16,
    pub line: usize,
    pub source_text: String,
    pub opcode: Opcode,
    pub src: Option<Operand>,
    pub dst: Option<Operand>,
    pub src_span: Option<Span>,
    pub dst_span: Option<Span>,
}

/// Everything one assembly run owns. Build a fresh one (or `reset`) per source file.
#[derive(Clone, Default, Debug)]
pub struct Context {
    pub symbols: SymbolTable,
    pub memory: MemoryImage,
    pub instructions: Vec<InstructionRecord>,
    pub diagnostics: Vec<AsmError>,
    /// Operand words added by the fixup pass
    extra_words: u16,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn reset(&mut self) {
        self.symbols.clear();
        self.memory.clear();
        self.instructions.clear();
        self.diagnostics.clear();
        self.extra_words = 0;
    }

    /// Run both passes over a normalized source. Diagnostics end up in `self.diagnostics`.
    pub fn assemble(&mut self, src: &str) {
        self.reset();
        let stmts = lex(src);
        let result = self
            .first_pass(&stmts)
            .and_then(|()| self.second_pass(&stmts));
        if let Err(fatal) = result {
            debug!(error = %fatal, "assembly aborted");
            self.diagnostics.push(fatal);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(AsmError::is_error)
    }

    pub fn extra_words(&self) -> u16 {
        self.extra_words
    }

    /// Build the symbol table, the base words and the data section.
    ///
    /// Line errors are collected and the line skipped. Only running out of memory returns `Err`.
    pub fn first_pass(&mut self, stmts: &[Statement]) -> Result<(), AsmError> {
        for stmt in stmts {
            if let Err(err) = self.first_pass_line(stmt) {
                if err.kind.is_fatal() {
                    return Err(err);
                }
                self.diagnostics.push(err);
            }
        }

        // Data goes behind the base words
        let delta = BASE_ADDRESS + self.instructions.len() as u16;
        self.memory.relocate_data(delta);
        for sym in self.symbols.all_mut() {
            if sym.kind == SymbolKind::Data {
                sym.address += delta;
            }
        }
        debug!(
            instructions = self.instructions.len(),
            data = self.memory.data().len(),
            symbols = self.symbols.len(),
            "first pass complete"
        );
        Ok(())
    }

    fn first_pass_line(&mut self, stmt: &Statement) -> Result<(), AsmError> {
        if stmt.width > MAX_LINE_LEN {
            return Err(AsmError::new(
                ErrorKind::LineTooLong { width: stmt.width },
                stmt.line,
                stmt.span,
            ));
        }
        let Some(head) = &stmt.head else {
            return Err(AsmError::new(
                ErrorKind::UnrecognizedStatement,
                stmt.line,
                stmt.span,
            ));
        };
        if let Some(label) = &stmt.label {
            if !is_valid_label(&label.text) {
                return Err(AsmError::new(
                    ErrorKind::InvalidLabel {
                        name: label.text.clone(),
                    },
                    stmt.line,
                    label.span,
                ));
            }
        }

        match head.kind {
            TokenKind::Directive => {
                let kind: DirKind = head.text.parse().map_err(|_| {
                    AsmError::new(ErrorKind::UnrecognizedStatement, stmt.line, head.span)
                })?;
                let dir = directive::parse(kind, stmt)?;
                if kind.emits_data() {
                    self.define_label(stmt, SymbolKind::Data, self.memory.data().len() as u16)?;
                } else if let Some(label) = &stmt.label {
                    self.diagnostics.push(AsmError::warning(
                        ErrorKind::IgnoredLabel {
                            name: label.text.clone(),
                        },
                        stmt.line,
                        label.span,
                    ));
                }
                trace!(line = stmt.line, ?dir, "directive");
                directive::apply(&dir, &mut self.symbols, &mut self.memory)
                    .map_err(|kind| AsmError::new(kind, stmt.line, stmt.body_span()))
            }
            TokenKind::Word if head.text.bytes().all(|b| b.is_ascii_alphabetic()) => {
                let encoded = encoder::encode(stmt)?;
                let address = BASE_ADDRESS + self.instructions.len() as u16;
                self.define_label(stmt, SymbolKind::Code, address)?;
                self.memory
                    .push_code(encoded.word)
                    .map_err(|kind| AsmError::new(kind, stmt.line, stmt.body_span()))?;

                let spans: Vec<Span> = stmt.operands.iter().map(|tok| tok.span).collect();
                let (src_span, dst_span) = match spans.as_slice() {
                    [src, dst] => (Some(*src), Some(*dst)),
                    [src] => (Some(*src), None),
                    _ => (None, None),
                };
                self.instructions.push(InstructionRecord {
                    address,
                    line: stmt.line,
                    source_text: src_text(stmt),
                    opcode: encoded.opcode,
                    src: encoded.src,
                    dst: encoded.dst,
                    src_span,
                    dst_span,
                });
                Ok(())
            }
            _ => Err(AsmError::new(
                ErrorKind::UnrecognizedStatement,
                stmt.line,
                stmt.body_span(),
            )),
        }
    }

    fn define_label(&mut self, stmt: &Statement, kind: SymbolKind, address: u16) -> Result<(), AsmError> {
        let Some(label) = &stmt.label else {
            return Ok(());
        };
        self.symbols
            .add(Symbol::local(&label.text, address, kind))
            .map_err(|_| {
                AsmError::new(
                    ErrorKind::DuplicateSymbol {
                        name: label.text.clone(),
                    },
                    stmt.line,
                    label.span,
                )
            })
    }

    /// Mark entries, then expand every instruction into its final words.
    pub fn second_pass(&mut self, stmts: &[Statement]) -> Result<(), AsmError> {
        for stmt in stmts.iter().filter(|stmt| stmt.is_directive(".entry")) {
            // Malformed lines were already reported by the first pass
            if stmt.width > MAX_LINE_LEN {
                continue;
            }
            let Ok(Directive::Entry(name)) = directive::parse(DirKind::Entry, stmt) else {
                continue;
            };
            let kind = match self.symbols.mark_entry(&name) {
                Ok(()) => continue,
                Err(SymbolError::ConflictingSymbolRole) => ErrorKind::ConflictingSymbolRole { name },
                Err(_) => ErrorKind::EntryLabelNotFound { name },
            };
            self.diagnostics
                .push(AsmError::new(kind, stmt.line, stmt.operands[0].span));
        }

        self.extra_words = fixup::expand(self)?;
        debug!(
            extra_words = self.extra_words,
            code = self.memory.code().len(),
            data = self.memory.data().len(),
            "second pass complete"
        );
        Ok(())
    }
}

fn src_text(stmt: &Statement) -> String {
    let mut text = stmt.head.as_ref().map(|tok| tok.text.clone()).unwrap_or_default();
    for (idx, tok) in stmt.operands.iter().enumerate() {
        text.push_str(if idx == 0 { " " } else { ", " });
        text.push_str(&tok.text);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encoder::decode,
        memory::{to_word, WordKind},
        symbol::{AddrMode, Register},
    };

    fn assembled(src: &str) -> Context {
        let mut ctx = Context::new();
        ctx.assemble(src);
        ctx
    }

    fn kinds(ctx: &Context) -> Vec<ErrorKind> {
        ctx.diagnostics.iter().map(|e| e.kind.clone()).collect()
    }

    fn values(ctx: &Context) -> Vec<(u16, u16)> {
        ctx.memory.iter().map(|w| (w.address, w.value)).collect()
    }

    #[test]
    fn add_immediate_and_register() {
        let ctx = assembled("A: add #5, r2\n");
        assert!(!ctx.has_errors(), "{:?}", ctx.diagnostics);

        let sym = ctx.symbols.find("A").unwrap();
        assert_eq!(sym.address, 100);
        assert_eq!(sym.kind, SymbolKind::Code);

        let words: Vec<_> = ctx.memory.iter().copied().collect();
        assert_eq!(words.len(), 3);
        assert!(words.iter().all(|w| w.kind == WordKind::Code));
        assert_eq!(
            decode(words[0].value),
            (Opcode::Add, AddrMode::Immediate, AddrMode::Register)
        );
        assert_eq!(words[1].value, 5);
        assert_eq!(words[2].value, 2);
        assert_eq!(ctx.memory.counter(), 103);
    }

    #[test]
    fn data_follows_code() {
        let ctx = assembled(
            "\
LEN: .data 3
MAIN: mov LEN, r1
      prn #-1
      stop
",
        );
        assert!(!ctx.has_errors(), "{:?}", ctx.diagnostics);
        // mov LEN, r1 and prn #-1 gain two words and one
        assert_eq!(ctx.extra_words(), 3);
        assert_eq!(ctx.symbols.find("MAIN").unwrap().address, 100);
        assert_eq!(ctx.symbols.find("LEN").unwrap().address, 106);
        assert_eq!(
            values(&ctx),
            vec![
                (100, encoder::encode_word(Opcode::Mov, Some(AddrMode::Direct), Some(AddrMode::Register))),
                (101, 106),
                (102, 1),
                (103, encoder::encode_word(Opcode::Prn, Some(AddrMode::Immediate), None)),
                (104, to_word(-1)),
                (105, 15),
                (106, 3),
            ]
        );
    }

    #[test]
    fn code_labels_follow_expansion() {
        let ctx = assembled(
            "\
MAIN: mov M[r2], r3
LOOP: inc r3
      bne LOOP
      jmp END
END:  stop
M:    .mat [2][2] 1,2
",
        );
        assert!(!ctx.has_errors(), "{:?}", ctx.diagnostics);
        let addr = |name: &str| ctx.symbols.find(name).unwrap().address;
        // mov: base + 2 (indexed) + 1 (register)
        assert_eq!(addr("MAIN"), 100);
        assert_eq!(addr("LOOP"), 104);
        assert_eq!(addr("END"), 110);
        assert_eq!(addr("M"), 111);

        let words = values(&ctx);
        // bne LOOP operand word carries the final address of LOOP
        assert_eq!(words[7], (107, 104));
        // jmp END
        assert_eq!(words[9], (109, 110));
        // M[r2]: label address, then register number
        assert_eq!(words[1], (101, 111));
        assert_eq!(words[2], (102, Register::R2.num()));
        assert_eq!(&words[11..], &[(111, 1), (112, 2), (113, 0), (114, 0)]);
    }

    #[test]
    fn register_pair_shares_word() {
        let ctx = assembled("mov r1, r7\n");
        assert_eq!(values(&ctx)[1..], [(101, 0x17)]);
        assert_eq!(ctx.extra_words(), 1);
    }

    #[test]
    fn extra_words_move_every_data_symbol() {
        let src = "\
A: .data 1
S: .string \"hi\"
   lea S, r1
   cmp A, #4
B: .data 2
   rts
";
        let mut ctx = Context::new();
        let stmts = lex(src);
        ctx.first_pass(&stmts).unwrap();
        let before: Vec<(String, u16)> = ctx
            .symbols
            .all()
            .map(|sym| (sym.name.clone(), sym.address))
            .collect();
        ctx.second_pass(&stmts).unwrap();

        let extra = ctx.extra_words();
        assert_eq!(extra, 4);
        for (name, address) in before {
            assert_eq!(ctx.symbols.find(&name).unwrap().address - address, extra);
        }
    }

    #[test]
    fn duplicate_label_keeps_first() {
        let ctx = assembled("A: inc r1\nA: dec r1\n");
        assert_eq!(kinds(&ctx), vec![ErrorKind::DuplicateSymbol { name: "A".into() }]);
        assert_eq!(ctx.diagnostics[0].line, 2);
        assert_eq!(ctx.symbols.find("A").unwrap().address, 100);
    }

    #[test]
    fn entry_errors() {
        let ctx = assembled(".entry A\n.extern X\n.entry X\nstop\n");
        assert_eq!(
            kinds(&ctx),
            vec![
                ErrorKind::EntryLabelNotFound { name: "A".into() },
                ErrorKind::ConflictingSymbolRole { name: "X".into() },
            ]
        );
        assert!(ctx.symbols.all().all(|sym| !sym.is_entry));
    }

    #[test]
    fn entries_are_marked() {
        let ctx = assembled("MAIN: stop\n.entry MAIN\n");
        assert!(!ctx.has_errors());
        assert!(ctx.symbols.find("MAIN").unwrap().is_entry);
    }

    #[test]
    fn errors_do_not_stop_scanning() {
        let ctx = assembled(
            "\
foo r1
mov #1, #2
1abc: stop
.data 1, x
.bogus 1
\"str\"
L:
jmp NOWHERE
",
        );
        assert_eq!(
            kinds(&ctx),
            vec![
                ErrorKind::UnknownOpcode { mnemonic: "foo".into() },
                ErrorKind::IllegalAddressingMode {
                    mnemonic: "mov",
                    operand: "#2".into(),
                    slot: "destination"
                },
                ErrorKind::InvalidLabel { name: "1abc".into() },
                ErrorKind::InvalidLiteral { literal: "x".into() },
                ErrorKind::UnrecognizedStatement,
                ErrorKind::UnrecognizedStatement,
                ErrorKind::UnrecognizedStatement,
                ErrorKind::UndefinedSymbol { name: "NOWHERE".into() },
            ]
        );
        let lines: Vec<usize> = ctx.diagnostics.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn label_on_extern_is_ignored() {
        let ctx = assembled("X: .extern W\njsr W\n");
        assert!(!ctx.has_errors());
        assert_eq!(kinds(&ctx), vec![ErrorKind::IgnoredLabel { name: "X".into() }]);
        assert!(ctx.symbols.find("X").is_err());
    }

    #[test]
    fn long_line() {
        let line = format!("; {}\nstop {}\n", "x".repeat(100), " ".repeat(80));
        let ctx = assembled(&line);
        assert_eq!(kinds(&ctx), vec![ErrorKind::LineTooLong { width: 85 }]);
    }

    #[test]
    fn memory_overflow_is_fatal() {
        let mut src = String::new();
        for _ in 0..10 {
            src.push_str(".mat [10][10]\n");
        }
        src.push_str("foo\n");
        let ctx = assembled(&src);
        // The unknown opcode after the overflow is never reached
        assert_eq!(kinds(&ctx), vec![ErrorKind::MemoryOverflow]);
        assert_eq!(ctx.diagnostics[0].line, 10);
    }

    #[test]
    fn overflow_after_expansion() {
        let mut src = String::from(".mat [9][100]\n");
        for _ in 0..10 {
            src.push_str("mov A[r1], B[r2]\n");
        }
        src.push_str("A: .data 1\nB: .data 2\n");
        let ctx = assembled(&src);
        assert_eq!(kinds(&ctx), vec![ErrorKind::MemoryOverflow]);
    }

    #[test]
    fn reset_between_runs() {
        let src = "MAIN: mov X, r1\nX: .data 4\n.entry MAIN\n";
        let mut ctx = Context::new();
        ctx.assemble(src);
        let first = (values(&ctx), ctx.symbols.all().cloned().collect::<Vec<_>>());
        ctx.assemble(src);
        let second = (values(&ctx), ctx.symbols.all().cloned().collect::<Vec<_>>());
        assert_eq!(first, second);
        assert!(!ctx.has_errors());
    }
}
