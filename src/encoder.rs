use crate::{
    error::{AsmError, ErrorKind},
    lexer::{Statement, Token, TokenKind},
    opcode::{ModeSet, Opcode},
    operand::{classify, Operand},
    symbol::AddrMode,
};

const OPCODE_MASK: u16 = 0b1111;
const SRC_SHIFT: u16 = 4;
const DST_SHIFT: u16 = 6;

/// Instruction that passed validation, with its base word.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Encoded {
    pub opcode: Opcode,
    pub src: Option<Operand>,
    pub dst: Option<Operand>,
    pub word: u16,
}

/// Pack opcode and operand modes into the base word. Absent operands encode as 0.
pub fn encode_word(opcode: Opcode, src: Option<AddrMode>, dst: Option<AddrMode>) -> u16 {
    let mode = |m: Option<AddrMode>| m.map_or(0, AddrMode::bits);
    (opcode.code() & OPCODE_MASK) | mode(src) << SRC_SHIFT | mode(dst) << DST_SHIFT
}

/// Split a base word back into opcode, source mode and destination mode.
pub fn decode(word: u16) -> (Opcode, AddrMode, AddrMode) {
    (
        Opcode::from_code(word & OPCODE_MASK),
        AddrMode::from_bits(word >> SRC_SHIFT),
        AddrMode::from_bits(word >> DST_SHIFT),
    )
}

/// Validate an instruction line (label already split off) and build its base word.
///
/// Operand words are left to the fixup pass, since symbol addresses are not known yet.
pub fn encode(stmt: &Statement) -> Result<Encoded, AsmError> {
    let Some(head) = &stmt.head else {
        return Err(AsmError::new(
            ErrorKind::UnrecognizedStatement,
            stmt.line,
            stmt.span,
        ));
    };
    let opcode: Opcode = head.text.parse().map_err(|_| {
        AsmError::new(
            ErrorKind::UnknownOpcode {
                mnemonic: head.text.clone(),
            },
            stmt.line,
            head.span,
        )
    })?;
    let desc = opcode.descriptor();

    if stmt.operands.len() != desc.operand_count {
        return Err(AsmError::new(
            ErrorKind::OperandArityMismatch {
                mnemonic: desc.mnemonic,
                expected: desc.operand_count,
                found: stmt.operands.len(),
            },
            stmt.line,
            stmt.body_span(),
        ));
    }

    // A lone operand is the source
    let (src_tok, dst_tok) = match stmt.operands.as_slice() {
        [src, dst] => (Some(src), Some(dst)),
        [src] => (Some(src), None),
        _ => (None, None),
    };
    let src = checked_operand(stmt, opcode, src_tok, desc.src, "source")?;
    let dst = checked_operand(stmt, opcode, dst_tok, desc.dst, "destination")?;

    let word = encode_word(
        opcode,
        src.as_ref().map(Operand::mode),
        dst.as_ref().map(Operand::mode),
    );
    Ok(Encoded {
        opcode,
        src,
        dst,
        word,
    })
}

fn checked_operand(
    stmt: &Statement,
    opcode: Opcode,
    tok: Option<&Token>,
    allowed: ModeSet,
    slot: &'static str,
) -> Result<Option<Operand>, AsmError> {
    let Some(tok) = tok else {
        return Ok(None);
    };
    let err = |kind| AsmError::new(kind, stmt.line, tok.span);
    if tok.kind != TokenKind::Word {
        return Err(err(ErrorKind::InvalidOperand {
            operand: tok.text.clone(),
        }));
    }
    match classify(Some(&tok.text)) {
        Some(mode) if allowed.contains(mode) => Operand::parse(&tok.text).map(Some).map_err(err),
        _ => Err(err(ErrorKind::IllegalAddressingMode {
            mnemonic: opcode.mnemonic(),
            operand: tok.text.clone(),
            slot,
        })),
    }
}
