//! Conditional structuring.
//!
//! Every branching node becomes a conditional header whose follow is its
//! immediate post-dominator. A two-way node that closes a cycle gets no
//! follow here; jump classification gives it one later. Switch headers
//! additionally tag the nodes of their body with a case head.

use log::debug;

use crate::entity::EntityRef;
use crate::error::Result;
use crate::graph::{CondKind, Conditional, JumpKind, NodeId, Procedure, Structure, ELSE, THEN};

pub fn structure_conditionals(proc: &mut Procedure) -> Result<()> {
    let mut switches = 0;
    for i in 0..proc.len() {
        let id = proc.at_order(i);
        if proc.node(id).succs.len() < 2 {
            continue;
        }
        let cond = conditional_for(proc, id)?;
        proc.node_mut(id).structure = Structure::Conditional(cond);
        if cond.kind == CondKind::Case {
            tag_case_body(proc, id, cond.follow);
            switches += 1;
        }
    }
    debug!("{}: conditionals structured, {switches} switches", proc.name);
    Ok(())
}

/// The conditional facts of the branching node `id`, derived from its
/// successors and post-dominator. Fails for a node with a single successor.
pub(crate) fn conditional_for(proc: &Procedure, id: NodeId) -> Result<Conditional> {
    let node = proc.node(id);
    if node.succs.len() < 2 {
        return Err(proc.structure_error(id, "conditional header has fewer than two successors"));
    }
    if node.is_two_way() && proc.has_any_back_edge(id) {
        return Ok(Conditional {
            kind: CondKind::IfThenElse,
            follow: None,
            jump: JumpKind::Structured,
        });
    }

    let follow = node.ipdom;
    let kind = if node.is_multi_way() {
        CondKind::Case
    } else if Some(node.succs[ELSE]) == follow {
        CondKind::IfThen
    } else if Some(node.succs[THEN]) == follow {
        CondKind::IfElse
    } else {
        CondKind::IfThenElse
    };
    Ok(Conditional {
        kind,
        follow,
        jump: JumpKind::Structured,
    })
}

/// Tag every node reachable from the switch `head` without crossing a back
/// edge or `follow`. Inner switches come first in order, so a node that
/// already has a case head belongs to one of them and is neither retagged
/// nor walked through. A nested switch header is tagged itself, then the
/// walk continues from its follow.
fn tag_case_body(proc: &mut Procedure, head: NodeId, follow: Option<NodeId>) {
    let mut visited = vec![false; proc.len()];
    let mut stack = vec![head];

    while let Some(n) = stack.pop() {
        if std::mem::replace(&mut visited[n.index()], true) {
            continue;
        }
        if n != head {
            if proc.node(n).case_head.is_some() {
                continue;
            }
            proc.node_mut(n).case_head = Some(head);
        }

        if n != head && proc.node(n).is_multi_way() {
            if let Some(inner) = proc.cond_follow_of(n) {
                if !visited[inner.index()] && Some(inner) != follow {
                    stack.push(inner);
                }
            }
            continue;
        }
        for &succ in proc.node(n).succs.iter().rev() {
            if !proc.has_back_edge_to(n, succ) && !visited[succ.index()] && Some(succ) != follow {
                stack.push(succ);
            }
        }
    }
}
