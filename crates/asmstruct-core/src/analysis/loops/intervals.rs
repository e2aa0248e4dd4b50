//! Loop detection over the derived sequence.
//!
//! Intervals are processed from the first derived graph upwards, so inner
//! loops are found first. A header that reappears at a higher level with a
//! new latch gives up its old loop: the old members are untagged and the
//! old latch becomes a conditional again.

use std::time::Instant;

use log::debug;

use super::{Loop, LoopDetector};
use crate::analysis::conditionals::conditional_for;
use crate::analysis::intervals::DerivedSequence;
use crate::entity::EntityRef;
use crate::error::Result;
use crate::graph::{CondKind, LoopKind, NodeId, Procedure, Structure};
use crate::metrics::Metrics;

pub struct IntervalLoops;

impl LoopDetector for IntervalLoops {
    fn name(&self) -> &'static str {
        "intervals"
    }

    fn structure_loops(&self, proc: &mut Procedure, metrics: &mut Metrics) -> Result<()> {
        let started = Instant::now();
        let seq = DerivedSequence::build(proc);
        metrics.derived_sequence += started.elapsed();
        seq.record(metrics);
        debug!(
            "{}: {} derived graphs, {}",
            proc.name,
            seq.graphs.len(),
            if seq.is_reducible() { "reducible" } else { "irreducible" }
        );

        for level in 0..seq.graphs.len() {
            for j in 0..seq.graphs[level].intervals.len() {
                let header = seq.header_block(level, j);
                let mut in_interval = vec![false; proc.len()];
                for n in seq.member_blocks(level, j) {
                    in_interval[n.index()] = true;
                }
                if let Some(latch) = find_latch(proc, header, &in_interval) {
                    structure_loop(proc, header, latch, &in_interval)?;
                }
            }
        }
        Ok(())
    }
}

/// The lowest-ordered back-edge predecessor of `header` inside the interval.
fn find_latch(proc: &Procedure, header: NodeId, in_interval: &[bool]) -> Option<NodeId> {
    proc.node(header)
        .preds
        .iter()
        .copied()
        .filter(|&p| proc.has_back_edge_to(p, header) && in_interval[p.index()])
        .min_by_key(|&p| proc.order_of(p))
}

fn structure_loop(
    proc: &mut Procedure,
    header: NodeId,
    latch: NodeId,
    in_interval: &[bool],
) -> Result<()> {
    // A latch tagged by another loop already belongs to a nested loop.
    if proc.node(latch).loop_head.is_some() {
        return Ok(());
    }

    if let Some(old) = proc.latch_of(header) {
        if proc.node(old).is_two_way() {
            let cond = conditional_for(proc, old)?;
            proc.node_mut(old).structure = Structure::Conditional(cond);
        }
        for i in (proc.order_of(old)..proc.order_of(header)).rev() {
            let n = proc.at_order(i);
            if proc.node(n).loop_head == Some(header) {
                proc.node_mut(n).loop_head = None;
            }
        }
    }

    if latch != header {
        proc.node_mut(latch).structure = Structure::Sequential;
    }

    let mut members = vec![false; proc.len()];
    for i in (proc.order_of(latch)..proc.order_of(header)).rev() {
        let n = proc.at_order(i);
        if in_interval[n.index()] {
            members[n.index()] = true;
            if proc.node(n).loop_head.is_none() {
                proc.node_mut(n).loop_head = Some(header);
            }
        }
    }
    let body = Loop {
        header,
        latch,
        members,
    };

    let head = proc.node(header);
    let cond_follow = if head.is_two_way() {
        conditional_for(proc, header)?.follow
    } else {
        None
    };
    let (kind, with_cond) = if proc.node(latch).is_two_way() {
        (LoopKind::PostTested, head.is_two_way() && header != latch)
    } else if head.is_two_way() {
        if head.succs.iter().all(|&s| Some(s) != cond_follow) {
            (LoopKind::Endless, true)
        } else {
            (LoopKind::PreTested, false)
        }
    } else {
        (LoopKind::Endless, false)
    };

    let follow = match kind {
        LoopKind::PreTested => {
            let first = proc.succ(header, 0);
            Some(if Some(first) == cond_follow {
                first
            } else {
                proc.succ(header, 1)
            })
        }
        LoopKind::PostTested => Some(body.post_tested_follow(proc)),
        LoopKind::Endless => endless_follow(proc, &body),
    };
    body.install(proc, kind, follow, with_cond)?;
    debug!(
        "{}: loop at block {} ({}), latch {}",
        proc.name,
        proc.node(header).ident,
        kind.name(),
        proc.node(latch).ident
    );
    Ok(())
}

/// The exit branch with the highest order among the two-way conditionals of
/// the loop body.
fn endless_follow(proc: &Procedure, body: &Loop) -> Option<NodeId> {
    let latch_order = proc.order_of(body.latch);
    let mut follow: Option<NodeId> = None;
    for i in (latch_order + 1..proc.order_of(body.header)).rev() {
        let desc = proc.at_order(i);
        let node = proc.node(desc);
        let Structure::Conditional(cond) = node.structure else {
            continue;
        };
        if cond.kind == CondKind::Case || !body.contains(desc) {
            continue;
        }
        for &succ in &node.succs {
            if succ != body.header
                && !body.contains(succ)
                && follow.map_or(true, |f| proc.order_of(succ) > proc.order_of(f))
            {
                follow = Some(succ);
            }
        }
    }
    follow
}
