use std::str::FromStr;

use crate::machine::MachineState;
use crate::radix::{self, wrap_to_word};

/// Rendering mode for words crossing the I/O boundary, mirroring the three
/// ways the INPUT and OUTPUT registers can be read: hex, decimal, or as an
/// ASCII character.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DisplayMode {
    #[default]
    Hex,
    Dec,
    Ascii,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hex" => Ok(DisplayMode::Hex),
            "dec" => Ok(DisplayMode::Dec),
            "ascii" => Ok(DisplayMode::Ascii),
            _ => Err(format!("unknown display mode '{s}', expected hex, dec or ascii")),
        }
    }
}

impl DisplayMode {
    /// Interpret terminal text as a machine word in this mode. `None` means
    /// the text does not fit a 16-bit register.
    pub fn parse_word(self, text: &str) -> Option<i16> {
        match self {
            DisplayMode::Hex => i32::from_str_radix(text, 16).ok().and_then(wrap_to_word),
            DisplayMode::Dec => text.parse::<i32>().ok().and_then(wrap_to_word),
            DisplayMode::Ascii => Some(
                text.chars()
                    .next()
                    .map_or(0, |ch| (ch as u32 & 0x7F) as i16),
            ),
        }
    }

    /// Render a word the way this mode displays it.
    pub fn render_word(self, word: i16) -> String {
        match self {
            DisplayMode::Hex => radix::to_hex4(word),
            DisplayMode::Dec => word.to_string(),
            DisplayMode::Ascii => ((word as u16 & 0x7F) as u8 as char).to_string(),
        }
    }
}

/// Print the register file to stdout.
///
/// The minimal form is one `NAME value` pair per line for blackbox tests; the
/// full form is a small table showing each word register in hex, signed and
/// character renderings, with the 12-bit address registers in 3-digit hex.
pub fn print_registers(machine: &MachineState, minimal: bool) {
    if minimal {
        println!("AC {}", machine.ac());
        println!("IR {}", machine.ir());
        println!("MAR {}", radix::to_hex3(i32::from(machine.mar())));
        println!("MBR {}", machine.mbr());
        println!("PC {}", radix::to_hex3(i32::from(machine.pc())));
        println!("IN {}", machine.input());
        println!("OUT {}", machine.output());
        return;
    }

    println!("\x1b[2m┌──────────────────────────────────┐\x1b[0m");
    println!("\x1b[2m│        \x1b[3mhex      int    char\x1b[0m\x1b[2m       │\x1b[0m");
    print_word_row("AC ", machine.ac());
    print_word_row("IR ", machine.ir());
    print_addr_row("MAR", machine.mar());
    print_word_row("MBR", machine.mbr());
    print_addr_row("PC ", machine.pc());
    print_word_row("IN ", machine.input());
    print_word_row("OUT", machine.output());
    println!("\x1b[2m└──────────────────────────────────┘\x1b[0m");
}

fn print_word_row(name: &str, word: i16) {
    println!(
        "\x1b[2m│\x1b[0m \x1b[1m{}\x1b[0m  0x{:04x}  {:>6}    {} \x1b[2m│\x1b[0m",
        name,
        word as u16,
        word,
        char_display(word)
    );
}

fn print_addr_row(name: &str, addr: u16) {
    println!(
        "\x1b[2m│\x1b[0m \x1b[1m{}\x1b[0m   0x{:03x}  {:>6}        \x1b[2m│\x1b[0m",
        name, addr, addr
    );
}

/// Three-character display of a word as text, for the register table.
fn char_display(word: i16) -> String {
    match word as u16 {
        0x00 => "NUL".into(),
        0x08 => "BS ".into(),
        0x09 => "HT ".into(),
        0x0a => "LF ".into(),
        0x0d => "CR ".into(),
        0x1b => "ESC".into(),
        0x20 => "[_]".into(),
        // Printable ASCII; anything else is dashed out
        ch @ 0x21..=0x7e => format!("{:<3}", ch as u8 as char),
        _ => "\x1b[2m───\x1b[0m".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_in_each_mode() {
        assert_eq!(DisplayMode::Hex.parse_word("2A"), Some(0x2A));
        assert_eq!(DisplayMode::Hex.parse_word("FFFF"), Some(-1));
        assert_eq!(DisplayMode::Dec.parse_word("-35"), Some(-35));
        assert_eq!(DisplayMode::Ascii.parse_word("A"), Some(65));
        assert_eq!(DisplayMode::Ascii.parse_word(""), Some(0));
        assert_eq!(DisplayMode::Dec.parse_word("banana"), None);
        assert_eq!(DisplayMode::Dec.parse_word("99999"), None);
    }

    #[test]
    fn renders_in_each_mode() {
        assert_eq!(DisplayMode::Hex.render_word(-1), "FFFF");
        assert_eq!(DisplayMode::Dec.render_word(-1), "-1");
        assert_eq!(DisplayMode::Ascii.render_word(65), "A");
    }

    #[test]
    fn char_column() {
        assert_eq!(char_display(0), "NUL");
        assert_eq!(char_display(0x41), "A  ");
        assert_eq!(char_display(0x20), "[_]");
    }
}
