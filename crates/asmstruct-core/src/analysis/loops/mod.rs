//! Loop detection and classification.
//!
//! Two interchangeable strategies find loop headers and their latches:
//!
//! - [`StampLoops`] walks the forward order from the outermost nodes
//!   inwards and decides membership with loop stamps (forward and mirrored);
//! - [`IntervalLoops`] walks the derived sequence from the innermost
//!   intervals outwards and takes membership from the intervals themselves.
//!
//! Both record the result on the header as [`Structure::Loop`] or, when the
//! header's own branch must still be emitted as a conditional,
//! [`Structure::LoopConditional`]. The strategy is chosen once per run.

mod intervals;
mod stamps;

pub use intervals::IntervalLoops;
pub use stamps::StampLoops;

use crate::analysis::conditionals::conditional_for;
use crate::entity::EntityRef;
use crate::error::Result;
use crate::graph::{LoopInfo, LoopKind, NodeId, Procedure, Structure};
use crate::metrics::Metrics;
use crate::pipeline::LoopStrategy;

pub trait LoopDetector {
    fn name(&self) -> &'static str;

    /// Tag loop headers, latches, members and follows of `proc`. Runs after
    /// conditional structuring.
    fn structure_loops(&self, proc: &mut Procedure, metrics: &mut Metrics) -> Result<()>;
}

pub fn detector_for(strategy: LoopStrategy) -> Box<dyn LoopDetector> {
    match strategy {
        LoopStrategy::Stamps => Box::new(StampLoops),
        LoopStrategy::Intervals => Box::new(IntervalLoops),
    }
}

/// A loop whose header and latch are known and whose members are tagged.
struct Loop {
    header: NodeId,
    latch: NodeId,
    /// Membership by node index.
    members: Vec<bool>,
}

impl Loop {
    fn contains(&self, id: NodeId) -> bool {
        self.members[id.index()]
    }

    /// The successor of `id` that leaves the loop, preferring slot 0.
    fn exit_succ(&self, proc: &Procedure, id: NodeId) -> NodeId {
        let first = proc.succ(id, 0);
        if self.contains(first) {
            proc.succ(id, 1)
        } else {
            first
        }
    }

    /// The latch successor that is not the header.
    fn post_tested_follow(&self, proc: &Procedure) -> NodeId {
        let first = proc.succ(self.latch, 0);
        if first == self.header {
            proc.succ(self.latch, 1)
        } else {
            first
        }
    }

    /// Record the finished loop on its header.
    fn install(
        &self,
        proc: &mut Procedure,
        kind: LoopKind,
        follow: Option<NodeId>,
        with_cond: bool,
    ) -> Result<()> {
        let info = LoopInfo {
            latch: self.latch,
            kind,
            follow,
        };
        let structure = if with_cond {
            Structure::LoopConditional(info, conditional_for(proc, self.header)?)
        } else {
            Structure::Loop(info)
        };
        proc.node_mut(self.header).structure = structure;
        Ok(())
    }
}
