//! Control flow graphs.
//!
//! Blocks live in a per-procedure arena ([`Procedure::nodes`]) and refer to
//! each other by [`NodeId`]. Every analysis result is an index into the same
//! arena, so passes mutate nodes freely without aliasing concerns.

pub mod builder;
pub mod node;
pub mod procedure;
pub mod shape;
pub mod structure;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::build_program;
pub use node::{BlockKind, Node, NodeId, Stamps, ELSE, THEN};
pub use procedure::Procedure;
pub use shape::{NodeShape, ProcedureShape};
pub use structure::{CondKind, Conditional, JumpKind, LoopInfo, LoopKind, Structure};

use crate::source::Listing;

/// A parsed listing together with the procedure graphs built from it.
#[derive(Debug, Clone)]
pub struct Program {
    pub listing: Listing,
    /// Procedures in listing order.
    pub procedures: Vec<Procedure>,
}

impl Program {
    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }
}
