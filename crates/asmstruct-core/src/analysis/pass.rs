use crate::error::Result;
use crate::graph::{Procedure, ProcedureShape};
use crate::metrics::Metrics;
use crate::pipeline::{DebugConfig, LoopStrategy};

use super::conditionals::structure_conditionals;
use super::dominators::immediate_post_dominators;
use super::jumps::classify_jumps;
use super::loops::{detector_for, LoopDetector};

/// One structuring pass over a single procedure.
///
/// Passes run in a fixed order, each reading only the tags written by the
/// passes before it.
pub trait Pass {
    /// Name of this pass, as accepted by `--dump-after`.
    fn name(&self) -> &str;

    fn run(&self, proc: &mut Procedure, metrics: &mut Metrics) -> Result<()>;
}

/// Valid pass names for `--dump-after`, in pipeline order. The special
/// value `"build"` dumps the numbered graph before any pass runs.
pub const PASS_NAMES: &[&str] = &[
    "build",
    "post-dominators",
    "conditionals",
    "loops",
    "jump-classification",
];

pub struct PostDominators;

impl Pass for PostDominators {
    fn name(&self) -> &str {
        "post-dominators"
    }

    fn run(&self, proc: &mut Procedure, _metrics: &mut Metrics) -> Result<()> {
        immediate_post_dominators(proc)
    }
}

pub struct Conditionals;

impl Pass for Conditionals {
    fn name(&self) -> &str {
        "conditionals"
    }

    fn run(&self, proc: &mut Procedure, _metrics: &mut Metrics) -> Result<()> {
        structure_conditionals(proc)
    }
}

pub struct LoopStructuring {
    pub detector: Box<dyn LoopDetector>,
}

impl Pass for LoopStructuring {
    fn name(&self) -> &str {
        "loops"
    }

    fn run(&self, proc: &mut Procedure, metrics: &mut Metrics) -> Result<()> {
        self.detector.structure_loops(proc, metrics)
    }
}

pub struct JumpClassification;

impl Pass for JumpClassification {
    fn name(&self) -> &str {
        "jump-classification"
    }

    fn run(&self, proc: &mut Procedure, _metrics: &mut Metrics) -> Result<()> {
        classify_jumps(proc)
    }
}

/// An ordered sequence of passes.
pub struct PassPipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl PassPipeline {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn add(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// The full structuring sequence with the given loop strategy.
    pub fn for_strategy(strategy: LoopStrategy) -> Self {
        let mut pipeline = Self::new();
        pipeline.add(Box::new(PostDominators));
        pipeline.add(Box::new(Conditionals));
        pipeline.add(Box::new(LoopStructuring {
            detector: detector_for(strategy),
        }));
        pipeline.add(Box::new(JumpClassification));
        pipeline
    }

    pub fn names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, proc: &mut Procedure, metrics: &mut Metrics) -> Result<()> {
        self.run_with_debug(proc, metrics, &DebugConfig::default())
            .map(|_| ())
    }

    /// Run the passes, honouring `debug.dump_after`.
    ///
    /// When the named pass is reached (or is `"build"`), the procedure's
    /// shape is dumped to stderr if it passes the procedure filter, and the
    /// remaining passes are skipped. Returns whether the run stopped early.
    pub fn run_with_debug(
        &self,
        proc: &mut Procedure,
        metrics: &mut Metrics,
        debug: &DebugConfig,
    ) -> Result<bool> {
        let stop_after = debug.dump_after.as_deref();
        if stop_after == Some("build") {
            dump_shape(proc, debug);
            return Ok(true);
        }
        for pass in &self.passes {
            pass.run(proc, metrics)?;
            if stop_after == Some(pass.name()) {
                dump_shape(proc, debug);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn dump_shape(proc: &Procedure, debug: &DebugConfig) {
    if debug.should_dump(&proc.name) {
        eprintln!(
            "=== shape: {} ===\n{}=== end shape ===\n",
            proc.name,
            ProcedureShape::of(proc)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::graph::testing::{procedure, procedure_with, Shape};
    use crate::graph::{LoopKind, NodeId};

    fn nested() -> Vec<Shape> {
        vec![
            Shape::Fall,
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(2),
            Shape::Cond(1),
            Shape::Cond(7),
            Shape::Fall,
            Shape::Ret,
        ]
    }

    #[test]
    fn pass_names_are_listed_in_order() {
        let pipeline = PassPipeline::for_strategy(LoopStrategy::Stamps);
        assert_eq!(pipeline.names(), PASS_NAMES[1..].to_vec());
    }

    #[test]
    fn stops_after_named_pass() {
        let mut p = procedure(&nested());
        let debug = DebugConfig {
            dump_after: Some("conditionals".to_string()),
            procedure_filter: Some("no-such-procedure".to_string()),
        };
        let stopped = PassPipeline::for_strategy(LoopStrategy::Stamps)
            .run_with_debug(&mut p, &mut Metrics::default(), &debug)
            .unwrap();
        assert!(stopped);
        // Loops never ran.
        assert!(p.nodes.values().all(|n| n.loop_head.is_none()));
        assert!(p.node(NodeId::new(0)).ipdom.is_some());
    }

    #[test]
    fn build_dump_runs_nothing() {
        let mut p = procedure(&nested());
        let debug = DebugConfig {
            dump_after: Some("build".to_string()),
            procedure_filter: Some("no-such-procedure".to_string()),
        };
        let stopped = PassPipeline::for_strategy(LoopStrategy::Stamps)
            .run_with_debug(&mut p, &mut Metrics::default(), &debug)
            .unwrap();
        assert!(stopped);
        assert!(p.nodes.values().all(|n| n.ipdom.is_none()));
    }

    #[test]
    fn rerunning_after_reset_is_deterministic() {
        for strategy in [LoopStrategy::Stamps, LoopStrategy::Intervals] {
            let pipeline = PassPipeline::for_strategy(strategy);
            let mut p = procedure_with(&nested(), strategy);
            pipeline.run(&mut p, &mut Metrics::default()).unwrap();
            let first = ProcedureShape::of(&p);

            p.reset_analysis();
            pipeline.run(&mut p, &mut Metrics::default()).unwrap();
            assert_eq!(ProcedureShape::of(&p), first, "{strategy:?}");

            let mut fresh = procedure_with(&nested(), strategy);
            pipeline.run(&mut fresh, &mut Metrics::default()).unwrap();
            assert_eq!(ProcedureShape::of(&fresh), first, "{strategy:?}");
        }
    }

    #[test]
    fn both_strategies_agree_on_nested_loops() {
        let shape = |strategy| {
            let mut p = procedure_with(&nested(), strategy);
            PassPipeline::for_strategy(strategy)
                .run(&mut p, &mut Metrics::default())
                .unwrap();
            ProcedureShape::of(&p)
        };
        let stamps = shape(LoopStrategy::Stamps);
        let intervals = shape(LoopStrategy::Intervals);
        for ident in [2, 3] {
            let a = stamps.node(ident).unwrap();
            let b = intervals.node(ident).unwrap();
            assert_eq!(a.loop_kind, Some(LoopKind::PostTested));
            assert_eq!(a.loop_kind, b.loop_kind);
            assert_eq!(a.latch, b.latch);
            assert_eq!(a.loop_follow, b.loop_follow);
        }
    }
}
