// Assembling
mod assembler;
pub use assembler::{assemble, Assembly, CodeLine, HiField, LoField};
mod listing;
pub use listing::{listing, symbol_map};
mod program;
pub use program::{DecodeError, Program};

// Running
mod machine;
pub use machine::{MachineState, RunErrorKind, RunState, MEMORY_SIZE};
mod runtime;
pub use runtime::{Opcode, RunEnvironment};
mod output;
pub use output::{print_registers, DisplayMode};

// Shared pieces
mod error;
pub use error::AsmErrorKind;
mod radix;
pub use radix::Radix;
mod symbol;
pub use symbol::{DuplicateSymbol, Span, SymbolEntry, SymbolTable, UndefinedSymbol};

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 2;
