//! Per-run counters and timings.
//!
//! A [`Metrics`] value is created once per run and passed by `&mut` through
//! graph building, structuring and code generation. Nothing here is global.

use std::fmt::Write;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::pipeline::LoopStrategy;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub instructions: usize,
    pub unreachable_instructions: usize,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub gotos: usize,
    pub loops: usize,
    pub two_ways: usize,
    pub multi_ways: usize,
    pub continues_and_breaks: usize,
    /// Deepest indentation level reached while emitting code.
    pub max_indent: usize,
    pub intervals: usize,
    pub derived_graphs: usize,

    #[serde(serialize_with = "as_secs")]
    pub derived_sequence: Duration,
    #[serde(serialize_with = "as_secs")]
    pub structuring: Duration,
    #[serde(serialize_with = "as_secs")]
    pub code_generation: Duration,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl Metrics {
    /// Record that emission reached indentation `level`.
    pub fn reach_indent(&mut self, level: usize) {
        self.max_indent = self.max_indent.max(level);
    }

    /// The human-readable report printed by `--stats`. Interval counts only
    /// appear for the interval strategy, code counts only when code was
    /// generated.
    pub fn summary(&self, file: &str, strategy: LoopStrategy, code_generated: bool) -> String {
        let mut out = String::new();
        let algorithm = match strategy {
            LoopStrategy::Stamps => "loop stamps",
            LoopStrategy::Intervals => "derived sequence",
        };
        let _ = writeln!(out, "{file}: ({algorithm} algorithm)");
        let _ = writeln!(out, "\t# assembly instructions in input = {}", self.instructions);
        let _ = writeln!(out, "\t# unreachable instructions = {}", self.unreachable_instructions);
        let _ = writeln!(out, "\t# graph nodes = {}", self.graph_nodes);
        let _ = writeln!(out, "\t# graph edges = {}", self.graph_edges);
        if strategy == LoopStrategy::Intervals {
            let _ = writeln!(out, "\t# intervals = {}", self.intervals);
            let _ = writeln!(out, "\t# derived graphs = {}", self.derived_graphs);
            let _ = writeln!(
                out,
                "\ttime to build derived sequences = {:.6}s",
                self.derived_sequence.as_secs_f64()
            );
        }
        let _ = writeln!(out, "\ttime to structure graphs = {:.6}s", self.structuring.as_secs_f64());
        if code_generated {
            let _ = writeln!(
                out,
                "\ttime to generate code = {:.6}s",
                self.code_generation.as_secs_f64()
            );
            let _ = writeln!(out, "\tgotos generated = {}", self.gotos);
            let _ = writeln!(out, "\tloops generated = {}", self.loops);
            let _ = writeln!(out, "\tif-then-{{else}}s generated = {}", self.two_ways);
            let _ = writeln!(out, "\tswitches generated = {}", self.multi_ways);
            let _ = writeln!(
                out,
                "\tcontinue/break statements generated = {}",
                self.continues_and_breaks
            );
            let _ = writeln!(out, "\tmaximum indentation = {}", self.max_indent);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_sections_follow_strategy_and_codegen() {
        let metrics = Metrics {
            instructions: 12,
            gotos: 1,
            intervals: 3,
            ..Metrics::default()
        };
        let stamps = metrics.summary("a.s", LoopStrategy::Stamps, false);
        assert!(stamps.starts_with("a.s: (loop stamps algorithm)\n"));
        assert!(stamps.contains("# assembly instructions in input = 12"));
        assert!(!stamps.contains("# intervals"));
        assert!(!stamps.contains("gotos generated"));

        let intervals = metrics.summary("a.s", LoopStrategy::Intervals, true);
        assert!(intervals.contains("# intervals = 3"));
        assert!(intervals.contains("gotos generated = 1"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let metrics = Metrics {
            structuring: Duration::from_millis(1500),
            ..Metrics::default()
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["structuring"], 1.5);
        assert_eq!(json["gotos"], 0);
    }

    #[test]
    fn indent_keeps_maximum() {
        let mut metrics = Metrics::default();
        metrics.reach_indent(3);
        metrics.reach_indent(1);
        assert_eq!(metrics.max_indent, 3);
    }
}
