use std::fmt;

/// Largest value a machine word can hold.
pub const MAX_WORD: i32 = 32767;
/// Smallest value a machine word can hold.
pub const MIN_WORD: i32 = -32768;
/// Highest addressable memory cell.
pub const MAX_ADDR: u16 = 0x0FFF;

/// Base of a numeric literal as written in source.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Radix {
    Dec,
    Oct,
    Hex,
}

impl Radix {
    pub fn base(self) -> u32 {
        match self {
            Radix::Dec => 10,
            Radix::Oct => 8,
            Radix::Hex => 16,
        }
    }
}

impl fmt::Display for Radix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Radix::Dec => "decimal",
            Radix::Oct => "octal",
            Radix::Hex => "hexadecimal",
        })
    }
}

/// A literal that does not parse, or parses outside the accepted value range.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InvalidLiteral(pub Radix);

/// An address literal outside the addressable range 0..=0xFFF.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AddressOutOfRange;

/// Squeeze an integer into a machine word.
///
/// Values already in range pass through. Values whose absolute magnitude falls
/// between 32,767 and 65,535 are reinterpreted as their 16-bit two's-complement
/// equivalent, so `65535` reads back as `-1` and `40000` as `-25536`. Anything
/// further out is rejected. Client programs rely on the exact boundary of this
/// window, so it is part of the literal format.
pub fn wrap_to_word(n: i32) -> Option<i16> {
    if (MIN_WORD..=MAX_WORD).contains(&n) {
        return Some(n as i16);
    }
    let abs = n.unsigned_abs();
    if (MAX_WORD as u32..=2 * MAX_WORD as u32 + 1).contains(&abs) {
        return Some((abs as i64 - 2 * (MAX_WORD as i64 + 1)) as i16);
    }
    None
}

/// Parse a numeric literal in the given radix into a machine word.
pub fn parse_literal(radix: Radix, text: &str) -> Result<i16, InvalidLiteral> {
    let n = i32::from_str_radix(text, radix.base()).map_err(|_| InvalidLiteral(radix))?;
    wrap_to_word(n).ok_or(InvalidLiteral(radix))
}

/// Parse a hex address literal used as an instruction operand.
///
/// Unlike directive values, operand addresses must land in addressable memory.
pub fn parse_address(text: &str) -> Result<u16, AddressOutOfRange> {
    let n = i32::from_str_radix(text, 16).map_err(|_| AddressOutOfRange)?;
    let word = wrap_to_word(n).ok_or(AddressOutOfRange)?;
    if word < 0 || word as u16 > MAX_ADDR {
        return Err(AddressOutOfRange);
    }
    Ok(word as u16)
}

/// Whether a token reads as a hex literal rather than a symbol.
///
/// Numeric literals must begin with a digit, so the address `BABE` is written
/// `0BABE`. This is the only way to tell the address `A` from the symbol `A`.
pub fn is_literal_token(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Exactly three uppercase hex digits: the low 12 bits in two's complement.
///
/// Overflowing addresses truncate (`0x1000` renders as `"000"`) and negative
/// inputs wrap (`-1` renders as `"FFF"`). Downstream tooling parses these
/// strings back, so the rendering is bit-exact.
pub fn to_hex3(n: i32) -> String {
    format!("{:03X}", (n as u32) & MAX_ADDR as u32)
}

/// Exactly four uppercase hex digits: the full word in two's complement.
pub fn to_hex4(word: i16) -> String {
    format!("{:04X}", word as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_window() {
        assert_eq!(wrap_to_word(0), Some(0));
        assert_eq!(wrap_to_word(32767), Some(32767));
        assert_eq!(wrap_to_word(-32768), Some(-32768));
        // Magnitudes inside the wrap window reinterpret as negative words
        assert_eq!(wrap_to_word(32768), Some(-32768));
        assert_eq!(wrap_to_word(65535), Some(-1));
        assert_eq!(wrap_to_word(40000), Some(-25536));
        assert_eq!(wrap_to_word(-40000), Some(-25536));
        // And anything beyond is rejected
        assert_eq!(wrap_to_word(65536), None);
        assert_eq!(wrap_to_word(-65536), None);
        assert_eq!(wrap_to_word(i32::MIN), None);
    }

    #[test]
    fn literals_by_radix() {
        assert_eq!(parse_literal(Radix::Dec, "-35"), Ok(-35));
        assert_eq!(parse_literal(Radix::Oct, "17"), Ok(15));
        assert_eq!(parse_literal(Radix::Hex, "0FFFF"), Ok(-1));
        assert_eq!(
            parse_literal(Radix::Dec, "99999"),
            Err(InvalidLiteral(Radix::Dec))
        );
        assert_eq!(
            parse_literal(Radix::Oct, "9"),
            Err(InvalidLiteral(Radix::Oct))
        );
    }

    #[test]
    fn address_range() {
        assert_eq!(parse_address("0FFF"), Ok(0xFFF));
        assert_eq!(parse_address("100"), Ok(0x100));
        assert_eq!(parse_address("1000"), Err(AddressOutOfRange));
        assert_eq!(parse_address("xyz"), Err(AddressOutOfRange));
    }

    #[test]
    fn literal_tokens() {
        assert!(is_literal_token("100"));
        assert!(is_literal_token("0BABE"));
        assert!(!is_literal_token("BABE"));
        assert!(!is_literal_token("X"));
        assert!(!is_literal_token("12G"));
    }

    #[test]
    fn hex_renderings() {
        assert_eq!(to_hex3(0x004), "004");
        assert_eq!(to_hex3(0x1000), "000");
        assert_eq!(to_hex3(-1), "FFF");
        assert_eq!(to_hex4(-1), "FFFF");
        assert_eq!(to_hex4(0x0C), "000C");
        assert_eq!(to_hex4(-32768), "8000");
    }
}
