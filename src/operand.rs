use crate::{
    error::ErrorKind,
    memory::{parse_value, DATA_MAX, DATA_MIN},
    symbol::{is_valid_label, AddrMode, Register},
};

/// Classify an operand token by its shape alone.
///
/// `None` means the operand is absent, which only the encoder can judge.
pub fn classify(token: Option<&str>) -> Option<AddrMode> {
    let token = token?;
    let bytes = token.as_bytes();
    let mode = if token.starts_with('#') {
        AddrMode::Immediate
    } else if bytes.len() == 2 && bytes[0] == b'r' && bytes[1].is_ascii_digit() {
        AddrMode::Register
    } else if token.contains('[') && token.contains(']') {
        AddrMode::Indexed
    } else {
        AddrMode::Direct
    };
    Some(mode)
}

/// A validated instruction operand.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Immediate(i16),
    Direct(String),
    Indexed { label: String, index: Register },
    Register(Register),
}

impl Operand {
    pub fn parse(token: &str) -> Result<Operand, ErrorKind> {
        let invalid = || ErrorKind::InvalidOperand {
            operand: token.to_string(),
        };
        // Never None for a present token
        let Some(mode) = classify(Some(token)) else {
            return Err(invalid());
        };
        match mode {
            AddrMode::Immediate => parse_value(&token[1..], DATA_MIN, DATA_MAX)
                .map(Operand::Immediate)
                .ok_or_else(|| ErrorKind::InvalidLiteral {
                    literal: token.to_string(),
                }),
            AddrMode::Register => token.parse().map(Operand::Register).map_err(|_| invalid()),
            AddrMode::Indexed => {
                let (label, rest) = token.split_once('[').ok_or_else(invalid)?;
                let index = rest.strip_suffix(']').ok_or_else(invalid)?;
                match index.parse::<Register>() {
                    Ok(index) if is_valid_label(label) => Ok(Operand::Indexed {
                        label: label.to_string(),
                        index,
                    }),
                    _ => Err(invalid()),
                }
            }
            AddrMode::Direct if is_valid_label(token) => Ok(Operand::Direct(token.to_string())),
            AddrMode::Direct => Err(invalid()),
        }
    }

    pub fn mode(&self) -> AddrMode {
        match self {
            Operand::Immediate(_) => AddrMode::Immediate,
            Operand::Direct(_) => AddrMode::Direct,
            Operand::Indexed { .. } => AddrMode::Indexed,
            Operand::Register(_) => AddrMode::Register,
        }
    }

    /// Symbol whose address the operand needs, if any.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Operand::Direct(label) | Operand::Indexed { label, .. } => Some(label.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_modes() {
        assert_eq!(classify(None), None);
        assert_eq!(classify(Some("#-3")), Some(AddrMode::Immediate));
        assert_eq!(classify(Some("r7")), Some(AddrMode::Register));
        assert_eq!(classify(Some("r9")), Some(AddrMode::Register));
        assert_eq!(classify(Some("r10")), Some(AddrMode::Direct));
        assert_eq!(classify(Some("M[r1]")), Some(AddrMode::Indexed));
        assert_eq!(classify(Some("LOOP")), Some(AddrMode::Direct));
    }

    #[test]
    fn parse_operands() {
        assert_eq!(Operand::parse("#5"), Ok(Operand::Immediate(5)));
        assert_eq!(Operand::parse("#-512"), Ok(Operand::Immediate(-512)));
        assert_eq!(Operand::parse("r2"), Ok(Operand::Register(Register::R2)));
        assert_eq!(
            Operand::parse("M1[r3]"),
            Ok(Operand::Indexed {
                label: "M1".into(),
                index: Register::R3
            })
        );
        assert_eq!(Operand::parse("LEN"), Ok(Operand::Direct("LEN".into())));
    }

    #[test]
    fn reject_bad_operands() {
        assert!(matches!(Operand::parse("#"), Err(ErrorKind::InvalidLiteral { .. })));
        assert!(matches!(Operand::parse("#512"), Err(ErrorKind::InvalidLiteral { .. })));
        assert!(matches!(Operand::parse("#x"), Err(ErrorKind::InvalidLiteral { .. })));
        assert!(matches!(Operand::parse("r8"), Err(ErrorKind::InvalidOperand { .. })));
        assert!(matches!(Operand::parse("M[r8]"), Err(ErrorKind::InvalidOperand { .. })));
        assert!(matches!(Operand::parse("M[x]"), Err(ErrorKind::InvalidOperand { .. })));
        assert!(matches!(Operand::parse("[r1]"), Err(ErrorKind::InvalidOperand { .. })));
        assert!(matches!(Operand::parse("M[r1]x"), Err(ErrorKind::InvalidOperand { .. })));
        assert!(matches!(Operand::parse("9lives"), Err(ErrorKind::InvalidOperand { .. })));
    }
}
