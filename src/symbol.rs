use std::{fmt, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::{map::Entry, IndexMap};

use crate::opcode::Opcode;

// Keeps insertion order so artifacts come out the same on every run
pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Longest allowed label name.
pub const MAX_LABEL_LEN: usize = 31;

/// Represents the CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Register {
    pub fn num(self) -> u16 {
        self as u16
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r0" => Ok(Register::R0),
            "r1" => Ok(Register::R1),
            "r2" => Ok(Register::R2),
            "r3" => Ok(Register::R3),
            "r4" => Ok(Register::R4),
            "r5" => Ok(Register::R5),
            "r6" => Ok(Register::R6),
            "r7" => Ok(Register::R7),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.num())
    }
}

/// How an operand's value is located.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum AddrMode {
    /// `#5`
    Immediate = 0,
    /// `LABEL`
    Direct = 1,
    /// `LABEL[r2]`
    Indexed = 2,
    /// `r3`
    Register = 3,
}

impl AddrMode {
    pub const ALL: [AddrMode; 4] = [
        AddrMode::Immediate,
        AddrMode::Direct,
        AddrMode::Indexed,
        AddrMode::Register,
    ];

    pub fn bits(self) -> u16 {
        self as u16
    }

    pub fn from_bits(bits: u16) -> AddrMode {
        match bits & 0b11 {
            0 => AddrMode::Immediate,
            1 => AddrMode::Direct,
            2 => AddrMode::Indexed,
            _ => AddrMode::Register,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    Code,
    Data,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Symbol {
    pub name: String,
    pub address: u16,
    pub kind: SymbolKind,
    pub is_external: bool,
    pub is_entry: bool,
}

impl Symbol {
    pub fn local(name: &str, address: u16, kind: SymbolKind) -> Self {
        Symbol {
            name: name.to_string(),
            address,
            kind,
            is_external: false,
            is_entry: false,
        }
    }

    /// Declared with `.extern`. Resolved by the linker, so the address here is always 0.
    pub fn external(name: &str) -> Self {
        Symbol {
            name: name.to_string(),
            address: 0,
            kind: SymbolKind::Code,
            is_external: true,
            is_entry: false,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SymbolError {
    DuplicateSymbol,
    NotFound,
    UnknownEntryLabel,
    ConflictingSymbolRole,
}

/// Label name -> resolution, in insertion order.
#[derive(Clone, Default, Debug)]
pub struct SymbolTable {
    symbols: FxMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Names are unique. A second definition is rejected and the first one kept.
    pub fn add(&mut self, symbol: Symbol) -> Result<(), SymbolError> {
        match self.symbols.entry(symbol.name.clone()) {
            Entry::Occupied(_) => Err(SymbolError::DuplicateSymbol),
            Entry::Vacant(slot) => {
                slot.insert(symbol);
                Ok(())
            }
        }
    }

    pub fn find(&self, name: &str) -> Result<&Symbol, SymbolError> {
        self.symbols.get(name).ok_or(SymbolError::NotFound)
    }

    pub fn mark_entry(&mut self, name: &str) -> Result<(), SymbolError> {
        let symbol = self
            .symbols
            .get_mut(name)
            .ok_or(SymbolError::UnknownEntryLabel)?;
        if symbol.is_external {
            return Err(SymbolError::ConflictingSymbolRole);
        }
        symbol.is_entry = true;
        Ok(())
    }

    pub fn all(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub(crate) fn all_mut(&mut self) -> impl Iterator<Item = &mut Symbol> {
        self.symbols.values_mut()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn clear(&mut self) {
        self.symbols.clear()
    }
}

/// Words that cannot be used as labels or macro names.
pub fn is_reserved(name: &str) -> bool {
    name.parse::<Opcode>().is_ok()
        || name.parse::<Register>().is_ok()
        || (name.len() == 2 && name.starts_with('r') && name.as_bytes()[1].is_ascii_digit())
        || matches!(name, "data" | "string" | "mat" | "entry" | "extern" | "macro" | "endmacro")
}

/// Letter first, then letters and digits.
pub fn is_valid_label(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
        && name.len() <= MAX_LABEL_LEN
        && !is_reserved(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keeps_first_definition() {
        let mut table = SymbolTable::new();
        table.add(Symbol::local("A", 100, SymbolKind::Code)).unwrap();
        assert_eq!(
            table.add(Symbol::local("A", 105, SymbolKind::Data)),
            Err(SymbolError::DuplicateSymbol)
        );
        assert_eq!(table.find("A").unwrap().address, 100);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn extern_once_then_duplicate() {
        let mut table = SymbolTable::new();
        table.add(Symbol::external("X")).unwrap();
        assert_eq!(table.add(Symbol::external("X")), Err(SymbolError::DuplicateSymbol));
        assert_eq!(
            table.add(Symbol::local("X", 100, SymbolKind::Code)),
            Err(SymbolError::DuplicateSymbol)
        );
    }

    #[test]
    fn mark_entry() {
        let mut table = SymbolTable::new();
        table.add(Symbol::local("MAIN", 100, SymbolKind::Code)).unwrap();
        table.add(Symbol::external("EXT")).unwrap();

        table.mark_entry("MAIN").unwrap();
        assert!(table.find("MAIN").unwrap().is_entry);
        assert_eq!(table.mark_entry("NOPE"), Err(SymbolError::UnknownEntryLabel));
        assert_eq!(table.mark_entry("EXT"), Err(SymbolError::ConflictingSymbolRole));
        assert!(!table.find("EXT").unwrap().is_entry);
    }

    #[test]
    fn find_missing() {
        let table = SymbolTable::new();
        assert_eq!(table.find("A"), Err(SymbolError::NotFound));
    }

    #[test]
    fn insertion_order() {
        let mut table = SymbolTable::new();
        for name in ["Z", "A", "M"] {
            table.add(Symbol::local(name, 100, SymbolKind::Code)).unwrap();
        }
        let names: Vec<&str> = table.all().map(|sym| sym.name.as_str()).collect();
        assert_eq!(names, vec!["Z", "A", "M"]);
    }

    #[test]
    fn label_names() {
        assert!(is_valid_label("LOOP"));
        assert!(is_valid_label("x1"));
        assert!(!is_valid_label("1x"));
        assert!(!is_valid_label("mov"));
        assert!(!is_valid_label("r3"));
        assert!(!is_valid_label("r9"));
        assert!(!is_valid_label("a_b"));
        assert!(!is_valid_label(&"a".repeat(MAX_LABEL_LEN + 1)));
    }
}
