use std::fmt;

use miette::{miette, LabeledSpan, NamedSource, Report, Severity};

use crate::span::Span;

/// Everything that can go wrong while turning source lines into an object image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    // Symbol table
    DuplicateSymbol { name: String },
    ConflictingSymbolRole { name: String },
    EntryLabelNotFound { name: String },
    UndefinedSymbol { name: String },

    // Directives
    MissingOperand { directive: &'static str },
    MemoryOverflow,
    InvalidStringLiteral,
    InvalidMatrixDimensions { dims: String },
    TooManyInitializers { cells: usize, given: usize },

    // Instructions
    UnknownOpcode { mnemonic: String },
    OperandArityMismatch { mnemonic: &'static str, expected: usize, found: usize },
    IllegalAddressingMode { mnemonic: &'static str, operand: String, slot: &'static str },
    InvalidOperand { operand: String },

    // Lines
    UnrecognizedStatement,
    InvalidLabel { name: String },
    InvalidLiteral { literal: String },
    ExtraneousText { text: String },
    LineTooLong { width: usize },

    // Macro expansion
    UnterminatedMacro { name: String },
    MacroNameReserved { name: String },
    DuplicateMacro { name: String },

    // Not fatal
    IgnoredLabel { name: String },
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSymbol { .. } => "asm::duplicate_symbol",
            Self::ConflictingSymbolRole { .. } => "asm::conflicting_role",
            Self::EntryLabelNotFound { .. } => "asm::entry_not_found",
            Self::UndefinedSymbol { .. } => "asm::undefined_symbol",
            Self::MissingOperand { .. } => "dir::missing_operand",
            Self::MemoryOverflow => "mem::overflow",
            Self::InvalidStringLiteral => "dir::string",
            Self::InvalidMatrixDimensions { .. } => "dir::mat_dims",
            Self::TooManyInitializers { .. } => "dir::mat_init",
            Self::UnknownOpcode { .. } => "instr::unknown_opcode",
            Self::OperandArityMismatch { .. } => "instr::arity",
            Self::IllegalAddressingMode { .. } => "instr::addressing_mode",
            Self::InvalidOperand { .. } => "instr::operand",
            Self::UnrecognizedStatement => "parse::statement",
            Self::InvalidLabel { .. } => "parse::label",
            Self::InvalidLiteral { .. } => "parse::bad_lit",
            Self::ExtraneousText { .. } => "parse::extraneous",
            Self::LineTooLong { .. } => "parse::line_length",
            Self::UnterminatedMacro { .. } => "macro::unterminated",
            Self::MacroNameReserved { .. } => "macro::reserved",
            Self::DuplicateMacro { .. } => "macro::duplicate",
            Self::IgnoredLabel { .. } => "parse::ignored_label",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Self::DuplicateSymbol { .. } => "labels and .extern names may only be declared once per file",
            Self::EntryLabelNotFound { .. } => ".entry must name a label defined in this file",
            Self::ConflictingSymbolRole { .. } => "a symbol cannot be both .extern and .entry",
            Self::UndefinedSymbol { .. } => "define the label in this file or declare it with .extern",
            Self::MissingOperand { .. } => "this directive needs at least one operand",
            Self::MemoryOverflow => "the program must fit between addresses 100 and 1023",
            Self::InvalidStringLiteral => ".string requires a quoted ASCII literal like \"hello\"",
            Self::InvalidMatrixDimensions { .. } => ".mat dimensions look like [2][3], both positive",
            Self::TooManyInitializers { .. } => "a matrix takes at most rows x columns values",
            Self::UnknownOpcode { .. } => "check the list of the 16 available instructions",
            Self::OperandArityMismatch { .. } => "check the number of operands for this instruction",
            Self::IllegalAddressingMode { .. } => "check which addressing modes this instruction allows",
            Self::InvalidOperand { .. } => "operands are #number, a label, LABEL[rN] or a register r0-r7",
            Self::UnrecognizedStatement => "lines should hold an instruction or a directive",
            Self::InvalidLabel { .. } => {
                "labels start with a letter, are alphanumeric, at most 31 characters and not reserved words"
            }
            Self::InvalidLiteral { .. } => "values range from -512 to 511",
            Self::ExtraneousText { .. } => "remove the trailing text",
            Self::LineTooLong { .. } => "source lines are limited to 80 characters",
            Self::UnterminatedMacro { .. } => "close every macro with endmacro",
            Self::MacroNameReserved { .. } => "macro names cannot be instructions, directives or registers",
            Self::DuplicateMacro { .. } => "each macro name may only be defined once",
            Self::IgnoredLabel { .. } => "labels in front of .extern and .entry have no meaning",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::DuplicateSymbol { .. } => "duplicate symbol",
            Self::EntryLabelNotFound { .. } => "unknown label",
            Self::ConflictingSymbolRole { .. } => "external symbol",
            Self::UndefinedSymbol { .. } => "undefined symbol",
            Self::MissingOperand { .. } => "missing operand",
            Self::MemoryOverflow => "no room for this word",
            Self::InvalidStringLiteral => "incorrect literal",
            Self::InvalidMatrixDimensions { .. } => "incorrect dimensions",
            Self::TooManyInitializers { .. } => "too many values",
            Self::UnknownOpcode { .. } => "unknown instruction",
            Self::OperandArityMismatch { .. } => "wrong operand count",
            Self::IllegalAddressingMode { .. } => "addressing mode not allowed",
            Self::InvalidOperand { .. } => "invalid operand",
            Self::UnrecognizedStatement => "unrecognized statement",
            Self::InvalidLabel { .. } => "invalid label",
            Self::InvalidLiteral { .. } => "incorrect literal",
            Self::ExtraneousText { .. } => "unexpected text",
            Self::LineTooLong { .. } => "line too long",
            Self::UnterminatedMacro { .. } => "unterminated macro",
            Self::MacroNameReserved { .. } => "reserved name",
            Self::DuplicateMacro { .. } => "duplicate macro",
            Self::IgnoredLabel { .. } => "ignored label",
        }
    }

    /// Ends the run on the spot.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MemoryOverflow)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSymbol { name } => write!(f, "Symbol `{name}` is already defined"),
            Self::ConflictingSymbolRole { name } => {
                write!(f, "Symbol `{name}` is declared external and cannot be an entry")
            }
            Self::EntryLabelNotFound { name } => write!(f, "Entry label `{name}` was not found"),
            Self::UndefinedSymbol { name } => write!(f, "Use of undefined symbol `{name}`"),
            Self::MissingOperand { directive } => write!(f, "Directive {directive} is missing its operand"),
            Self::MemoryOverflow => write!(f, "Program does not fit in memory"),
            Self::InvalidStringLiteral => write!(f, "Expected a valid string literal"),
            Self::InvalidMatrixDimensions { dims } => write!(f, "Invalid matrix dimensions `{dims}`"),
            Self::TooManyInitializers { cells, given } => {
                write!(f, "Matrix has {cells} cells but {given} values were given")
            }
            Self::UnknownOpcode { mnemonic } => write!(f, "Unknown instruction `{mnemonic}`"),
            Self::OperandArityMismatch {
                mnemonic,
                expected,
                found,
            } => write!(f, "`{mnemonic}` takes {expected} operand(s), found {found}"),
            Self::IllegalAddressingMode {
                mnemonic,
                operand,
                slot,
            } => write!(f, "`{mnemonic}` does not allow `{operand}` as its {slot} operand"),
            Self::InvalidOperand { operand } => write!(f, "Invalid operand `{operand}`"),
            Self::UnrecognizedStatement => write!(f, "Unrecognized statement"),
            Self::InvalidLabel { name } => write!(f, "Invalid label name `{name}`"),
            Self::InvalidLiteral { literal } => write!(f, "Encountered an invalid literal `{literal}`"),
            Self::ExtraneousText { text } => write!(f, "Unexpected text `{text}` after statement"),
            Self::LineTooLong { width } => write!(f, "Line is {width} characters long"),
            Self::UnterminatedMacro { name } => write!(f, "Macro `{name}` is never closed"),
            Self::MacroNameReserved { name } => write!(f, "`{name}` is reserved and cannot name a macro"),
            Self::DuplicateMacro { name } => write!(f, "Macro `{name}` is already defined"),
            Self::IgnoredLabel { name } => write!(f, "Label `{name}` is ignored"),
        }
    }
}

/// A diagnostic tied to one source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsmError {
    pub kind: ErrorKind,
    /// 1-based line number, 0 when not tied to a line
    pub line: usize,
    pub span: Option<Span>,
    pub severity: Severity,
}

impl AsmError {
    pub fn new(kind: ErrorKind, line: usize, span: Span) -> Self {
        AsmError {
            kind,
            line,
            span: Some(span),
            severity: Severity::Error,
        }
    }

    pub fn warning(kind: ErrorKind, line: usize, span: Span) -> Self {
        AsmError {
            severity: Severity::Warning,
            ..AsmError::new(kind, line, span)
        }
    }

    /// Diagnostic without a location, e.g. running out of memory after expansion.
    pub fn unplaced(kind: ErrorKind) -> Self {
        AsmError {
            kind,
            line: 0,
            span: None,
            severity: Severity::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render against the file the error came from.
    pub fn report(&self, src: NamedSource<String>) -> Report {
        let labels = match self.span {
            Some(span) => vec![LabeledSpan::at(span, self.kind.label())],
            None => Vec::new(),
        };
        miette!(
            severity = self.severity,
            code = self.kind.code(),
            help = self.kind.help(),
            labels = labels,
            "{}",
            self.kind
        )
        .with_source_code(src)
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(f, "line {}: {}", self.line, self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl std::error::Error for AsmError {}
