use std::fmt;

use crate::machine::MEMORY_SIZE;
use crate::radix::MAX_ADDR;

/// A loadable machine program: the resolved (address, word) cells in address
/// order, plus the symbol map that assembly produced alongside them.
///
/// On disk this is a `.mex` file: a big-endian `u16` stream whose first word
/// is the origin address and whose remaining words are the cells in address
/// order. The symbol map travels separately as a text `.map` file and is not
/// needed to run.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Program {
    cells: Vec<(u16, i16)>,
    symbols: Vec<(String, u16)>,
}

/// A byte stream that does not decode as a program.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DecodeError {
    Misaligned,
    Empty,
    TooLarge,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecodeError::Misaligned => "file is not aligned to 16-bit words",
            DecodeError::Empty => "file contains no program words",
            DecodeError::TooLarge => "program does not fit in 4096 memory cells",
        })
    }
}

impl std::error::Error for DecodeError {}

impl Program {
    pub fn new(cells: Vec<(u16, i16)>, symbols: Vec<(String, u16)>) -> Self {
        Program { cells, symbols }
    }

    /// Address of the first cell, where execution begins.
    pub fn origin(&self) -> u16 {
        self.cells.first().map_or(0, |cell| cell.0)
    }

    pub fn cells(&self) -> &[(u16, i16)] {
        &self.cells
    }

    pub fn symbols(&self) -> &[(String, u16)] {
        &self.symbols
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Serialize to the `.mex` wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 * (self.cells.len() + 1));
        buf.extend(self.origin().to_be_bytes());
        for &(_, word) in &self.cells {
            buf.extend((word as u16).to_be_bytes());
        }
        buf
    }

    /// Deserialize from the `.mex` wire format. Symbols do not survive the
    /// trip; a decoded program carries an empty map.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() % 2 != 0 {
            return Err(DecodeError::Misaligned);
        }
        let mut words = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        let origin = words.next().ok_or(DecodeError::Empty)? & MAX_ADDR;
        let words: Vec<u16> = words.collect();
        if words.is_empty() {
            return Err(DecodeError::Empty);
        }
        if origin as usize + words.len() > MEMORY_SIZE {
            return Err(DecodeError::TooLarge);
        }
        let cells = words
            .into_iter()
            .enumerate()
            .map(|(i, word)| (origin + i as u16, word as i16))
            .collect();
        Ok(Program {
            cells,
            symbols: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_origin_first() {
        let program = Program::new(vec![(0x100, 0x1003), (0x101, 0x7000u16 as i16)], Vec::new());
        assert_eq!(
            program.encode(),
            vec![0x01, 0x00, 0x10, 0x03, 0x70, 0x00]
        );
    }

    #[test]
    fn decodes_cells_in_address_order() {
        let program = Program::decode(&[0x00, 0x10, 0x20, 0x05, 0xFF, 0xFF]).unwrap();
        assert_eq!(program.origin(), 0x010);
        assert_eq!(program.cells(), &[(0x010, 0x2005), (0x011, -1)]);
    }

    #[test]
    fn rejects_broken_streams() {
        assert_eq!(Program::decode(&[0x00]), Err(DecodeError::Misaligned));
        assert_eq!(Program::decode(&[0x00, 0x10]), Err(DecodeError::Empty));
        let too_big = vec![0u8; 2 + 2 * 4097];
        assert_eq!(Program::decode(&too_big), Err(DecodeError::TooLarge));
    }
}
