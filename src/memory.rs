use std::{fmt, str::FromStr};

use crate::error::ErrorKind;

/// Address of the first word of every image.
pub const BASE_ADDRESS: u16 = 100;
/// Addresses must stay below this.
pub const MEMORY_SIZE: u16 = 1024;
/// Words that fit between `BASE_ADDRESS` and `MEMORY_SIZE`.
pub const CAPACITY: usize = (MEMORY_SIZE - BASE_ADDRESS) as usize;

pub const WORD_BITS: u32 = 10;
pub const WORD_MASK: u16 = (1 << WORD_BITS) - 1;
/// Range of signed values a word can hold.
pub const DATA_MIN: i16 = -(1 << (WORD_BITS - 1));
pub const DATA_MAX: i16 = (1 << (WORD_BITS - 1)) - 1;

/// Truncate to the word width, two's complement for negative values.
pub fn to_word(value: i16) -> u16 {
    (value as u16) & WORD_MASK
}

/// Sign-extend a word back to its signed value.
pub fn from_word(word: u16) -> i16 {
    let word = word & WORD_MASK;
    if word & (1 << (WORD_BITS - 1)) != 0 {
        (word | !WORD_MASK) as i16
    } else {
        word as i16
    }
}

/// Parse a decimal literal with optional sign, inside `min..=max`.
pub fn parse_value(text: &str, min: i16, max: i16) -> Option<i16> {
    let digits = text.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i32 = text.parse().ok()?;
    (min as i32..=max as i32)
        .contains(&value)
        .then_some(value as i16)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WordKind {
    Code,
    Data,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MemoryWord {
    pub address: u16,
    pub value: u16,
    pub kind: WordKind,
}

/// Code words followed by data words.
///
/// While the first pass runs, data words carry their offset inside the data
/// section; `relocate_data` moves them behind the code.
#[derive(Clone, Default, Debug)]
pub struct MemoryImage {
    code: Vec<MemoryWord>,
    data: Vec<MemoryWord>,
}

impl MemoryImage {
    pub fn new() -> Self {
        MemoryImage::default()
    }

    pub fn clear(&mut self) {
        self.code.clear();
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.code.len() + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_room(&self, words: usize) -> Result<(), ErrorKind> {
        if self.len() + words > CAPACITY {
            Err(ErrorKind::MemoryOverflow)
        } else {
            Ok(())
        }
    }

    /// Append a code word, returning its address.
    pub fn push_code(&mut self, value: u16) -> Result<u16, ErrorKind> {
        self.check_room(1)?;
        let address = BASE_ADDRESS + self.code.len() as u16;
        self.code.push(MemoryWord {
            address,
            value: value & WORD_MASK,
            kind: WordKind::Code,
        });
        Ok(address)
    }

    /// Append a data word, returning its offset inside the data section.
    pub fn push_data(&mut self, value: i16) -> Result<u16, ErrorKind> {
        self.check_room(1)?;
        let offset = self.data.len() as u16;
        self.data.push(MemoryWord {
            address: offset,
            value: to_word(value),
            kind: WordKind::Data,
        });
        Ok(offset)
    }

    /// Append several data words, all or nothing.
    pub fn push_data_all(&mut self, values: &[i16]) -> Result<(), ErrorKind> {
        self.check_room(values.len())?;
        for &value in values {
            self.push_data(value)?;
        }
        Ok(())
    }

    pub fn relocate_data(&mut self, delta: u16) {
        for word in &mut self.data {
            word.address += delta;
        }
    }

    /// Swap in the final code section; data words are left untouched.
    pub fn replace_code(&mut self, code: Vec<MemoryWord>) -> Result<(), ErrorKind> {
        if code.len() + self.data.len() > CAPACITY {
            return Err(ErrorKind::MemoryOverflow);
        }
        self.code = code;
        Ok(())
    }

    pub fn code(&self) -> &[MemoryWord] {
        &self.code
    }

    pub fn data(&self) -> &[MemoryWord] {
        &self.data
    }

    /// All words in ascending address order once laid out.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryWord> {
        self.code.iter().chain(self.data.iter())
    }

    /// Next free address.
    pub fn counter(&self) -> u16 {
        BASE_ADDRESS + self.len() as u16
    }
}

/// How word values are written to the object file.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum Encoding {
    /// Five base-4 digits spelled `a`..`d`, most significant first
    #[default]
    Base4,
    /// Unsigned decimal value of the word
    Decimal,
}

const BASE4_DIGITS: [char; 4] = ['a', 'b', 'c', 'd'];
const BASE4_LEN: u32 = WORD_BITS / 2;

impl Encoding {
    pub fn encode(self, word: u16) -> String {
        let word = word & WORD_MASK;
        match self {
            Encoding::Base4 => (0..BASE4_LEN)
                .rev()
                .map(|pair| BASE4_DIGITS[((word >> (pair * 2)) & 0b11) as usize])
                .collect(),
            Encoding::Decimal => word.to_string(),
        }
    }

    pub fn decode(self, text: &str) -> Option<u16> {
        match self {
            Encoding::Base4 => decode_base4(text),
            Encoding::Decimal => text.parse().ok().filter(|word| *word <= WORD_MASK),
        }
    }
}

pub fn decode_base4(text: &str) -> Option<u16> {
    if text.len() != BASE4_LEN as usize {
        return None;
    }
    text.chars().try_fold(0u16, |acc, c| {
        let digit = BASE4_DIGITS.iter().position(|&d| d == c)?;
        Some(acc << 2 | digit as u16)
    })
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base4" => Ok(Encoding::Base4),
            "decimal" => Ok(Encoding::Decimal),
            _ => Err(format!("Unknown word encoding '{s}', expected 'base4' or 'decimal'")),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Base4 => write!(f, "base4"),
            Encoding::Decimal => write!(f, "decimal"),
        }
    }
}
