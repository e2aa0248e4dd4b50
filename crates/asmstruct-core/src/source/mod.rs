//! The instruction stream consumed by the graph builder.
//!
//! A listing is parsed line by line into [`Instruction`]s whose mnemonics
//! are classified by an [`OpcodeTable`]. Branch and jump operands are
//! resolved to instruction indices before the listing is handed on, so
//! nothing downstream deals with label text.

pub mod instruction;
pub mod opcodes;
pub mod parse;

pub use instruction::{InstKind, Instruction, Listing};
pub use opcodes::OpcodeTable;
pub use parse::parse_listing;
