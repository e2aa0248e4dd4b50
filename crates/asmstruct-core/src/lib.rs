//! Control-flow structuring for assembly listings.
//!
//! The crate turns a classified instruction stream into per-procedure
//! control flow graphs, recovers loops, conditionals and switches from
//! them, and emits structured pseudo-code (plus an optional graph
//! description for an external renderer).
//!
//! Data flows leaf-first through the modules:
//!
//! ```text
//! source (listing + opcode table)
//!   -> graph (blocks, edges, procedures, DFS numbering)
//!   -> analysis (post-dominators, conditionals, loops, jump classification)
//!   -> codegen (structured listing, graphviz)
//! ```
//!
//! [`pipeline::Session`] drives the whole sequence for one input.

pub mod analysis;
pub mod codegen;
pub mod entity;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod pipeline;
pub mod source;

pub use error::{CoreError, Result};
pub use graph::{NodeId, Procedure, Program};
pub use metrics::Metrics;
pub use pipeline::{LoopStrategy, OutputConfig, PipelineConfig, Session};
