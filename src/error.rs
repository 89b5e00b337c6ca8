use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::radix::Radix;
use crate::symbol::Span;

/// Everything the assembler can complain about on a source line.
///
/// These are recoverable: a line collects its diagnostics and assembly moves
/// on to the next line. The one exception is
/// [`AsmErrorKind::MaxAddressExceeded`], which aborts the pass outright.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AsmErrorKind {
    MisplacedOrigin,
    InvalidLabelStart,
    DuplicateSymbol,
    UnknownInstruction,
    MissingInstruction,
    MissingOperand,
    AddressOutOfRange,
    InvalidLiteral(Radix),
    UndefinedSymbol,
    MaxLinesExceeded,
    MaxAddressExceeded,
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AsmErrorKind::MisplacedOrigin => {
                "ORG directive must be the first noncomment statement of the program"
            }
            AsmErrorKind::InvalidLabelStart => {
                "a label cannot have 0..9 as its beginning character"
            }
            AsmErrorKind::DuplicateSymbol => "statement label must be unique",
            AsmErrorKind::UnknownInstruction => "instruction not recognized",
            AsmErrorKind::MissingInstruction => "missing instruction",
            AsmErrorKind::MissingOperand => "missing operand",
            AsmErrorKind::AddressOutOfRange => {
                "hex address literal out of range, 0 to 0FFF allowable"
            }
            AsmErrorKind::InvalidLiteral(Radix::Dec) => {
                "invalid decimal value, -32768 to 32767 allowable"
            }
            AsmErrorKind::InvalidLiteral(Radix::Oct) => {
                "invalid octal value, 0 to 177777 allowable"
            }
            AsmErrorKind::InvalidLiteral(Radix::Hex) => {
                "invalid hexadecimal value, 0 to FFFF allowable"
            }
            AsmErrorKind::UndefinedSymbol => "operand undefined",
            AsmErrorKind::MaxLinesExceeded => "maximum program statements reached",
            AsmErrorKind::MaxAddressExceeded => "maximum address exceeded, assembly halted",
        };
        f.write_str(msg)
    }
}

impl AsmErrorKind {
    fn code(self) -> &'static str {
        match self {
            AsmErrorKind::MisplacedOrigin => "asm::org",
            AsmErrorKind::InvalidLabelStart => "asm::label_start",
            AsmErrorKind::DuplicateSymbol => "asm::duplicate_label",
            AsmErrorKind::UnknownInstruction => "asm::unknown_instruction",
            AsmErrorKind::MissingInstruction => "asm::missing_instruction",
            AsmErrorKind::MissingOperand => "asm::missing_operand",
            AsmErrorKind::AddressOutOfRange => "asm::addr_range",
            AsmErrorKind::InvalidLiteral(_) => "asm::bad_lit",
            AsmErrorKind::UndefinedSymbol => "asm::undefined",
            AsmErrorKind::MaxLinesExceeded => "asm::max_lines",
            AsmErrorKind::MaxAddressExceeded => "asm::max_addr",
        }
    }

    fn help(self) -> &'static str {
        match self {
            AsmErrorKind::MisplacedOrigin => {
                "move the ORG statement above every instruction and data directive"
            }
            AsmErrorKind::InvalidLabelStart => {
                "labels must start with a letter, like `loop,` instead of `1loop,`"
            }
            AsmErrorKind::DuplicateSymbol => {
                "the first definition wins; rename or remove this one"
            }
            AsmErrorKind::UnknownInstruction => {
                "check the list of mnemonics and directives in the documentation"
            }
            AsmErrorKind::MissingInstruction => "a label must be followed by an instruction",
            AsmErrorKind::MissingOperand => "this instruction expects a memory operand",
            AsmErrorKind::AddressOutOfRange => {
                "operand addresses are hex literals between 0 and 0FFF"
            }
            AsmErrorKind::InvalidLiteral(_) => {
                "values from -32,768 to 32,767 or magnitudes up to 65,535 are allowed"
            }
            AsmErrorKind::UndefinedSymbol => {
                "every symbolic operand needs a matching label somewhere in the program"
            }
            AsmErrorKind::MaxLinesExceeded => "the program does not fit in 4096 memory cells",
            AsmErrorKind::MaxAddressExceeded => "the address counter ran past 0FFF",
        }
    }

    fn label(self) -> &'static str {
        match self {
            AsmErrorKind::MisplacedOrigin => "misplaced directive",
            AsmErrorKind::InvalidLabelStart => "incorrect label",
            AsmErrorKind::DuplicateSymbol => "duplicate label",
            AsmErrorKind::UnknownInstruction => "unknown mnemonic",
            AsmErrorKind::MissingInstruction => "label without statement",
            AsmErrorKind::MissingOperand => "operand missing here",
            AsmErrorKind::AddressOutOfRange => "address out of range",
            AsmErrorKind::InvalidLiteral(_) => "incorrect literal",
            AsmErrorKind::UndefinedSymbol => "undefined operand",
            AsmErrorKind::MaxLinesExceeded => "program too large",
            AsmErrorKind::MaxAddressExceeded => "address counter overflow",
        }
    }
}

/// Build a rendered diagnostic for one assembler complaint, labelling the
/// offending line within the full source text.
pub fn asm_report(kind: AsmErrorKind, span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = kind.code(),
        help = kind.help(),
        labels = vec![LabeledSpan::at(span, kind.label())],
        "{kind}",
    )
    .with_source_code(src.to_string())
}
