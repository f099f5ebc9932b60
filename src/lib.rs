// Source handling
mod span;
pub use span::Span;
mod lexer;
pub use lexer::{lex, Statement};
pub mod preprocess;
pub use preprocess::expand_macros;

// Machine model
pub mod memory;
pub use memory::{Encoding, MemoryImage, MemoryWord};
pub mod opcode;
pub use opcode::Opcode;
pub mod operand;
pub mod symbol;
pub use symbol::{Symbol, SymbolTable};

// Assembly
pub mod directive;
pub mod encoder;
pub mod fixup;
mod assembler;
pub use assembler::{Context, InstructionRecord};
pub mod object;
pub use object::ObjectArtifacts;

mod error;
pub use error::{AsmError, ErrorKind};

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 2;
