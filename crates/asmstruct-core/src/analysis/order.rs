//! Depth-first numbering of a procedure graph.
//!
//! Three traversals, all iterative so deep graphs cannot exhaust the stack.
//! Each one visits nodes in the same order a recursive formulation would.
//!
//! 1. Forward DFS from the entry: loop stamps, finish order and the
//!    predecessor lists (edges are recorded as the DFS walks them).
//! 2. Mirrored DFS from the entry with children taken in reverse order:
//!    a second stamp pair for ancestor queries (stamp strategy only).
//! 3. DFS from the exit over predecessors: the reverse-graph finish order
//!    that drives post-dominator computation.

use crate::entity::EntityRef;
use crate::graph::{NodeId, Stamps};

/// Result of numbering one procedure graph. All vectors are indexed by
/// `NodeId::index()` unless noted.
#[derive(Debug, Clone)]
pub struct Numbering {
    /// Nodes in forward finish order.
    pub order: Vec<NodeId>,
    pub position: Vec<usize>,
    pub stamps: Vec<Stamps>,
    pub preds: Vec<Vec<NodeId>>,
    pub rev_stamps: Option<Vec<Stamps>>,
    /// Nodes in reverse-graph finish order.
    pub rev_order: Vec<NodeId>,
    pub rev_position: Vec<Option<usize>>,
}

/// Number the graph given by `succs`. Fails with the first node (by id)
/// that the forward DFS from `entry` does not reach.
pub fn number(
    succs: &[Vec<NodeId>],
    entry: NodeId,
    exit: NodeId,
    reverse_stamps: bool,
) -> Result<Numbering, NodeId> {
    let n = succs.len();
    let forward = stamp_dfs(succs, entry, false);

    if let Some(missing) = (0..n).find(|&i| forward.stamps[i].is_none()) {
        return Err(NodeId::new(missing));
    }

    let mut position = vec![0; n];
    for (i, node) in forward.finished.iter().enumerate() {
        position[node.index()] = i;
    }
    let stamps: Vec<Stamps> = forward.stamps.into_iter().flatten().collect();

    let rev_stamps = reverse_stamps.then(|| {
        stamp_dfs(succs, entry, true)
            .stamps
            .into_iter()
            .map(|s| s.unwrap_or(Stamps { enter: 0, exit: 0 }))
            .collect()
    });

    let rev_order = reverse_finish_order(&forward.preds, exit);
    let mut rev_position = vec![None; n];
    for (i, node) in rev_order.iter().enumerate() {
        rev_position[node.index()] = Some(i);
    }

    Ok(Numbering {
        order: forward.finished,
        position,
        stamps,
        preds: forward.preds,
        rev_stamps,
        rev_order,
        rev_position,
    })
}

struct StampWalk {
    stamps: Vec<Option<Stamps>>,
    finished: Vec<NodeId>,
    preds: Vec<Vec<NodeId>>,
}

/// Loop-stamp DFS. The clock starts at 1; entering a child and finishing a
/// node each advance it by one.
fn stamp_dfs(succs: &[Vec<NodeId>], entry: NodeId, mirrored: bool) -> StampWalk {
    let n = succs.len();
    let mut walk = StampWalk {
        stamps: vec![None; n],
        finished: Vec::with_capacity(n),
        preds: vec![Vec::new(); n],
    };
    let mut enter = vec![0u32; n];
    let mut visited = vec![false; n];
    let mut time = 1u32;

    visited[entry.index()] = true;
    enter[entry.index()] = time;
    // (node, number of children already examined)
    let mut stack: Vec<(NodeId, usize)> = vec![(entry, 0)];

    while let Some(frame) = stack.last_mut() {
        let (node, seen) = *frame;
        let children = &succs[node.index()];
        if seen < children.len() {
            frame.1 += 1;
            let child = if mirrored {
                children[children.len() - 1 - seen]
            } else {
                children[seen]
            };
            if !mirrored {
                walk.preds[child.index()].push(node);
            }
            if !visited[child.index()] {
                visited[child.index()] = true;
                time += 1;
                enter[child.index()] = time;
                stack.push((child, 0));
            }
        } else {
            time += 1;
            walk.stamps[node.index()] = Some(Stamps {
                enter: enter[node.index()],
                exit: time,
            });
            walk.finished.push(node);
            stack.pop();
        }
    }
    walk
}

fn reverse_finish_order(preds: &[Vec<NodeId>], exit: NodeId) -> Vec<NodeId> {
    let mut visited = vec![false; preds.len()];
    let mut finished = Vec::with_capacity(preds.len());
    let mut stack: Vec<(NodeId, usize)> = vec![(exit, 0)];
    visited[exit.index()] = true;

    while let Some(frame) = stack.last_mut() {
        let (node, seen) = *frame;
        let parents = &preds[node.index()];
        if seen < parents.len() {
            frame.1 += 1;
            let parent = parents[seen];
            if !visited[parent.index()] {
                visited[parent.index()] = true;
                stack.push((parent, 0));
            }
        } else {
            finished.push(node);
            stack.pop();
        }
    }
    finished
}
