//! Output generation from structured procedure graphs.
//!
//! Two backends exist: the structured listing ([`CodeBackend`], `.hll`)
//! and the graph description ([`GraphvizBackend`], `.dot`). The graph
//! backend shades blocks the code backend never reached, so when both run
//! the code backend goes first.

pub mod emit;
mod gotos;
pub mod graphviz;

pub use emit::{emit_procedure, emit_program, CodeListing};
pub use graphviz::emit_graph;

use crate::error::Result;
use crate::graph::Program;
use crate::metrics::Metrics;
use crate::pipeline::OutputConfig;

/// State shared by the backends of one run.
pub struct EmitContext<'a> {
    pub output: &'a OutputConfig,
    pub metrics: &'a mut Metrics,
    /// Set by the code backend: per procedure, which nodes got code.
    pub coverage: Option<Vec<Vec<bool>>>,
}

/// Backend trait: renders a structured program into one output artifact.
pub trait Backend {
    /// Name of this backend (e.g., "code", "graphviz").
    fn name(&self) -> &str;

    /// File extension of the artifact, without the dot.
    fn extension(&self) -> &str;

    fn emit(&self, program: &Program, ctx: &mut EmitContext<'_>) -> Result<String>;
}

pub struct CodeBackend;

impl Backend for CodeBackend {
    fn name(&self) -> &str {
        "code"
    }

    fn extension(&self) -> &str {
        "hll"
    }

    fn emit(&self, program: &Program, ctx: &mut EmitContext<'_>) -> Result<String> {
        let listing = emit_program(program, ctx.output, ctx.metrics);
        ctx.coverage = Some(listing.coverage);
        Ok(listing.text)
    }
}

pub struct GraphvizBackend;

impl Backend for GraphvizBackend {
    fn name(&self) -> &str {
        "graphviz"
    }

    fn extension(&self) -> &str {
        "dot"
    }

    fn emit(&self, program: &Program, ctx: &mut EmitContext<'_>) -> Result<String> {
        Ok(emit_graph(program, ctx.output, ctx.coverage.as_deref()))
    }
}

/// The backends `output` asks for, code first.
pub fn backends_for(output: &OutputConfig) -> Vec<Box<dyn Backend>> {
    let mut backends: Vec<Box<dyn Backend>> = Vec::new();
    if output.generate_code {
        backends.push(Box::new(CodeBackend));
    }
    if output.generate_graph {
        backends.push(Box::new(GraphvizBackend));
    }
    backends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_follow_flags() {
        let names = |flags: &str| -> Vec<String> {
            let output = OutputConfig::from_flags(flags).unwrap();
            backends_for(&output)
                .iter()
                .map(|b| b.extension().to_string())
                .collect()
        };
        assert!(names("").is_empty());
        assert_eq!(names("c"), ["hll"]);
        assert_eq!(names("s"), ["dot"]);
        assert_eq!(names("dc"), ["hll", "dot"]);
    }
}
