use std::str::FromStr;

use crate::symbol::AddrMode;

/// Set of addressing modes, one bit per mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ModeSet(u8);

impl ModeSet {
    pub const NONE: ModeSet = ModeSet(0);
    pub const ANY: ModeSet = ModeSet(0b1111);
    /// Everything except immediates, i.e. something that can be written to.
    pub const WRITABLE: ModeSet = ModeSet(0b1110);
    /// Direct and indexed, an address in memory.
    pub const MEMORY: ModeSet = ModeSet(0b0110);

    pub const fn contains(self, mode: AddrMode) -> bool {
        self.0 & (1 << mode as u8) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Opcode {
    Mov = 0,
    Cmp,
    Add,
    Sub,
    Not,
    Clr,
    Lea,
    Inc,
    Dec,
    Jmp,
    Bne,
    Jsr,
    Red,
    Prn,
    Rts,
    Stop,
}

/// Static description of one instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OpcodeDescriptor {
    pub mnemonic: &'static str,
    pub opcode: Opcode,
    pub operand_count: usize,
    /// Source slot, holds the operand of one-operand instructions
    pub src: ModeSet,
    /// Destination slot, only used by two-operand instructions
    pub dst: ModeSet,
}

const fn desc(
    mnemonic: &'static str,
    opcode: Opcode,
    operand_count: usize,
    src: ModeSet,
    dst: ModeSet,
) -> OpcodeDescriptor {
    OpcodeDescriptor {
        mnemonic,
        opcode,
        operand_count,
        src,
        dst,
    }
}

/// Indexed by numeric opcode.
pub static OPCODE_TABLE: [OpcodeDescriptor; 16] = [
    desc("mov", Opcode::Mov, 2, ModeSet::ANY, ModeSet::WRITABLE),
    desc("cmp", Opcode::Cmp, 2, ModeSet::ANY, ModeSet::ANY),
    desc("add", Opcode::Add, 2, ModeSet::ANY, ModeSet::WRITABLE),
    desc("sub", Opcode::Sub, 2, ModeSet::ANY, ModeSet::WRITABLE),
    desc("not", Opcode::Not, 1, ModeSet::WRITABLE, ModeSet::NONE),
    desc("clr", Opcode::Clr, 1, ModeSet::WRITABLE, ModeSet::NONE),
    desc("lea", Opcode::Lea, 2, ModeSet::MEMORY, ModeSet::WRITABLE),
    desc("inc", Opcode::Inc, 1, ModeSet::WRITABLE, ModeSet::NONE),
    desc("dec", Opcode::Dec, 1, ModeSet::WRITABLE, ModeSet::NONE),
    desc("jmp", Opcode::Jmp, 1, ModeSet::WRITABLE, ModeSet::NONE),
    desc("bne", Opcode::Bne, 1, ModeSet::WRITABLE, ModeSet::NONE),
    desc("jsr", Opcode::Jsr, 1, ModeSet::WRITABLE, ModeSet::NONE),
    desc("red", Opcode::Red, 1, ModeSet::WRITABLE, ModeSet::NONE),
    desc("prn", Opcode::Prn, 1, ModeSet::ANY, ModeSet::NONE),
    desc("rts", Opcode::Rts, 0, ModeSet::NONE, ModeSet::NONE),
    desc("stop", Opcode::Stop, 0, ModeSet::NONE, ModeSet::NONE),
];

impl Opcode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Opcode {
        OPCODE_TABLE[(code & 0xF) as usize].opcode
    }

    pub fn descriptor(self) -> &'static OpcodeDescriptor {
        &OPCODE_TABLE[self as usize]
    }

    pub fn mnemonic(self) -> &'static str {
        self.descriptor().mnemonic
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OPCODE_TABLE
            .iter()
            .find(|desc| desc.mnemonic == s)
            .map(|desc| desc.opcode)
            .ok_or(())
    }
}
