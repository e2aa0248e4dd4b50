//! Immediate post-dominators.
//!
//! An adaptation of the Hecht-Ullman iterative dominator algorithm to
//! post-dominance. Three sweeps:
//!
//! 1. bottom-up over the reverse-graph finish order, merging each successor
//!    that finished later in the reverse DFS;
//! 2. over the forward order, re-merging every successor of branching nodes;
//! 3. over the forward order again, where a back-edge successor whose own
//!    post-dominator sits lower in the graph contributes that instead.

use log::debug;

use crate::entity::EntityRef;
use crate::error::Result;
use crate::graph::{NodeId, Procedure};

/// Compute `ipdom` for every node of `proc`.
pub fn immediate_post_dominators(proc: &mut Procedure) -> Result<()> {
    let mut rev = Vec::with_capacity(proc.len());
    for id in proc.nodes.keys() {
        match proc.node(id).rev_order {
            Some(r) => rev.push(r),
            None => return Err(proc.structure_error(id, "block cannot reach the procedure exit")),
        }
    }

    for i in (0..proc.rev_order.len()).rev() {
        let cur = proc.rev_order[i];
        for slot in 0..proc.node(cur).succs.len() {
            let succ = proc.succ(cur, slot);
            if rev[succ.index()] > rev[cur.index()] {
                let merged = common_post_dominator(proc, &rev, proc.node(cur).ipdom, Some(succ));
                proc.node_mut(cur).ipdom = merged;
            }
        }
    }

    for i in 0..proc.len() {
        let cur = proc.at_order(i);
        if proc.node(cur).succs.len() < 2 {
            continue;
        }
        for slot in 0..proc.node(cur).succs.len() {
            let succ = proc.succ(cur, slot);
            let merged = common_post_dominator(proc, &rev, proc.node(cur).ipdom, Some(succ));
            proc.node_mut(cur).ipdom = merged;
        }
    }

    for i in 0..proc.len() {
        let cur = proc.at_order(i);
        if proc.node(cur).succs.len() < 2 {
            continue;
        }
        for slot in 0..proc.node(cur).succs.len() {
            let succ = proc.succ(cur, slot);
            let cur_pdom = proc.node(cur).ipdom;
            let succ_pdom = proc.node(succ).ipdom;
            let tighter = match (succ_pdom, cur_pdom) {
                (Some(s), Some(c)) => {
                    proc.has_back_edge_to(cur, succ) && proc.order_of(s) < proc.order_of(c)
                }
                _ => false,
            };
            let merged = if tighter {
                common_post_dominator(proc, &rev, succ_pdom, cur_pdom)
            } else {
                common_post_dominator(proc, &rev, cur_pdom, Some(succ))
            };
            proc.node_mut(cur).ipdom = merged;
        }
    }

    for id in proc.nodes.keys() {
        let node = proc.node(id);
        if node.ipdom.is_none() && !node.succs.is_empty() {
            return Err(proc.structure_error(id, "block has no immediate post-dominator"));
        }
    }
    debug!("{}: post-dominators computed", proc.name);
    Ok(())
}

/// Walk both post-dominator chains upwards, always advancing the one that
/// finished earlier in the reverse DFS, until they meet.
fn common_post_dominator(
    proc: &Procedure,
    rev: &[usize],
    a: Option<NodeId>,
    b: Option<NodeId>,
) -> Option<NodeId> {
    let (Some(mut cur), Some(mut succ)) = (a, b) else {
        return a.or(b);
    };
    while cur != succ {
        if rev[cur.index()] > rev[succ.index()] {
            match proc.node(succ).ipdom {
                Some(next) => succ = next,
                None => break,
            }
        } else {
            match proc.node(cur).ipdom {
                Some(next) => cur = next,
                None => return None,
            }
        }
    }
    Some(cur)
}
