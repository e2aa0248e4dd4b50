//! Jump classification.
//!
//! Runs after loops and conditionals are structured. A two-way conditional
//! whose follow belongs to a different loop is really a jump into or out of
//! that loop, and one whose branches land in different switch bodies is a
//! jump into a case. Both are recorded on the conditional so the emitter
//! keeps the structured branch and turns the other into a goto.
//!
//! Two-way nodes left without a follow (sources of back edges that did not
//! become latches) get the non-back-edge branch as their follow here.

use log::debug;

use crate::error::Result;
use crate::graph::{CondKind, Conditional, JumpKind, NodeId, Procedure, ELSE, THEN};

pub fn classify_jumps(proc: &mut Procedure) -> Result<()> {
    let mut unstructured = 0;
    for i in 0..proc.len() {
        let id = proc.at_order(i);
        let node = proc.node(id);
        let Some(&original) = node.structure.conditional() else {
            continue;
        };
        let plain = node.structure.is_conditional();
        let mut cond = original;

        if let Some(follow) = cond.follow {
            if cond.kind != CondKind::Case {
                let own_head = if plain { node.loop_head } else { Some(id) };
                classify_loop_jump(proc, id, own_head, follow, &mut cond);
                classify_case_jump(proc, id, &mut cond);
            }
        }

        if plain
            && cond.follow.is_none()
            && cond.jump == JumpKind::Structured
            && cond.kind != CondKind::Case
        {
            if !proc.has_any_back_edge(id) {
                return Err(proc.structure_error(id, "conditional without a follow has no back edge"));
            }
            let node = proc.node(id);
            if proc.has_back_edge_to(id, node.succs[THEN]) {
                cond.kind = CondKind::IfThen;
                cond.follow = Some(node.succs[ELSE]);
            } else {
                cond.kind = CondKind::IfElse;
                cond.follow = Some(node.succs[THEN]);
            }
        }

        if cond != original {
            if cond.jump != JumpKind::Structured {
                unstructured += 1;
            }
            if let Some(slot) = proc.node_mut(id).structure.conditional_mut() {
                *slot = cond;
            }
        }
    }
    debug!("{}: {unstructured} unstructured conditionals", proc.name);
    Ok(())
}

/// Whether branch `slot` of `id` leads to `target`: it is the target or a
/// DFS ancestor of it.
fn branch_reaches(proc: &Procedure, id: NodeId, slot: usize, target: NodeId) -> bool {
    let succ = proc.succ(id, slot);
    succ == target || proc.is_ancestor_of(succ, target)
}

/// Mark `cond` as a jump in or out of a loop, keeping structured the branch
/// that runs on to `target`.
fn mark_toward(proc: &Procedure, id: NodeId, target: NodeId, cond: &mut Conditional) -> bool {
    if branch_reaches(proc, id, THEN, target) {
        cond.jump = JumpKind::JumpInOutLoop;
        cond.kind = CondKind::IfElse;
        true
    } else if branch_reaches(proc, id, ELSE, target) {
        cond.jump = JumpKind::JumpInOutLoop;
        cond.kind = CondKind::IfThen;
        true
    } else {
        false
    }
}

fn classify_loop_jump(
    proc: &Procedure,
    id: NodeId,
    own_head: Option<NodeId>,
    follow: NodeId,
    cond: &mut Conditional,
) {
    let follow_head = proc.node(follow).loop_head;
    if own_head == follow_head {
        return;
    }
    // Out of the enclosing loop: the branch toward its latch stays.
    if let Some(latch) = own_head.and_then(|h| proc.latch_of(h)) {
        if mark_toward(proc, id, latch, cond) {
            return;
        }
    }
    // Into the follow's loop: the branch toward its header stays.
    if let Some(head) = follow_head {
        mark_toward(proc, id, head, cond);
    }
}

fn classify_case_jump(proc: &Procedure, id: NodeId, cond: &mut Conditional) {
    if cond.jump != JumpKind::Structured {
        return;
    }
    let own = proc.node(id).case_head;
    let then_head = proc.node(proc.succ(id, THEN)).case_head;
    let else_head = proc.node(proc.succ(id, ELSE)).case_head;
    if then_head == own && else_head == own {
        return;
    }
    let switch_follow = own.and_then(|h| proc.cond_follow_of(h));
    let leaves_switch = |head: Option<NodeId>| own.is_some() && head == switch_follow;

    if then_head == own && !leaves_switch(else_head) {
        cond.jump = JumpKind::JumpIntoCase;
        cond.kind = CondKind::IfElse;
    } else if else_head == own && !leaves_switch(then_head) {
        cond.jump = JumpKind::JumpIntoCase;
        cond.kind = CondKind::IfThen;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::conditionals::structure_conditionals;
    use crate::analysis::dominators::immediate_post_dominators;
    use crate::analysis::loops::{LoopDetector, StampLoops};
    use crate::entity::EntityRef;
    use crate::graph::testing::{procedure, Shape};
    use crate::graph::Structure;
    use crate::metrics::Metrics;

    fn classified(shapes: &[Shape]) -> Procedure {
        let mut p = procedure(shapes);
        immediate_post_dominators(&mut p).unwrap();
        structure_conditionals(&mut p).unwrap();
        StampLoops
            .structure_loops(&mut p, &mut Metrics::default())
            .unwrap();
        classify_jumps(&mut p).unwrap();
        p
    }

    fn id(n: usize) -> NodeId {
        NodeId::new(n)
    }

    #[test]
    fn structured_diamond_is_untouched() {
        let p = classified(&[Shape::Cond(2), Shape::Jump(3), Shape::Fall, Shape::Ret]);
        let cond = p.conditional(id(0)).unwrap();
        assert_eq!(cond.jump, JumpKind::Structured);
        assert_eq!(cond.kind, CondKind::IfThenElse);
        assert_eq!(cond.follow, Some(id(3)));
    }

    #[test]
    fn exit_from_loop_body_jumps_out() {
        // 0 -> 1 (header); 1 -> 2; 2: if -> 5 else 3; 3 -> 4; 4 -> 1; 5 returns
        let p = classified(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(5),
            Shape::Fall,
            Shape::Jump(1),
            Shape::Ret,
        ]);
        assert_eq!(p.latch_of(id(1)), Some(id(4)));
        let cond = p.conditional(id(2)).unwrap();
        assert_eq!(cond.follow, Some(id(5)));
        assert_eq!(cond.jump, JumpKind::JumpInOutLoop);
        // The ELSE branch runs on to the latch and stays structured.
        assert_eq!(cond.kind, CondKind::IfThen);
    }

    #[test]
    fn branch_into_switch_arm_jumps_into_case() {
        // 0: if -> 3 else 1; 1: switch -> 2, 3; 2 -> 4; 3 -> 4; 4 returns
        let p = classified(&[
            Shape::Cond(3),
            Shape::Switch(vec![2, 3]),
            Shape::Jump(4),
            Shape::Fall,
            Shape::Ret,
        ]);
        assert_eq!(p.node(id(3)).case_head, Some(id(1)));
        let cond = p.conditional(id(0)).unwrap();
        assert_eq!(cond.jump, JumpKind::JumpIntoCase);
        assert_eq!(cond.kind, CondKind::IfThen);
    }

    #[test]
    fn back_edge_source_gets_the_other_branch_as_follow() {
        // Header 1 is latched by 4; block 2 also jumps back to 1.
        // 0 -> 1; 1 -> 2; 2: if -> 1 else 3; 3 -> 4; 4: if -> 1 else 5; 5 returns
        let p = classified(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(1),
            Shape::Fall,
            Shape::Cond(1),
            Shape::Ret,
        ]);
        assert_eq!(p.latch_of(id(1)), Some(id(4)));
        let cond = p.conditional(id(2)).unwrap();
        assert_eq!(cond.kind, CondKind::IfThen);
        assert_eq!(cond.follow, Some(id(3)));
        assert_eq!(cond.jump, JumpKind::Structured);
        assert_eq!(p.node(id(4)).structure, Structure::Sequential);
    }

    #[test]
    fn then_branch_into_switch_arm_keeps_else_structured() {
        // 0: if -> 2 else 1; 2: switch -> 3, 1; 1 -> 4; 3 -> 4; 4 returns
        let p = classified(&[
            Shape::Cond(2),
            Shape::Jump(4),
            Shape::Switch(vec![3, 1]),
            Shape::Fall,
            Shape::Ret,
        ]);
        assert_eq!(p.node(id(1)).case_head, Some(id(2)));
        assert_eq!(p.node(id(3)).case_head, Some(id(2)));
        let cond = p.conditional(id(0)).unwrap();
        assert_eq!(cond.jump, JumpKind::JumpIntoCase);
        assert_eq!(cond.kind, CondKind::IfElse);
    }

    #[test]
    fn outer_arm_branching_into_nested_switch() {
        // 0: switch -> 1, 3
        // 1: switch -> 2, 5; 2 -> 6; 5 -> 6
        // 3: if -> 2 else 4; 4 -> 6; 6 returns
        let p = classified(&[
            Shape::Switch(vec![1, 3]),
            Shape::Switch(vec![2, 5]),
            Shape::Jump(6),
            Shape::Cond(2),
            Shape::Jump(6),
            Shape::Fall,
            Shape::Ret,
        ]);
        assert_eq!(p.node(id(2)).case_head, Some(id(1)));
        assert_eq!(p.node(id(3)).case_head, Some(id(0)));
        assert_eq!(p.node(id(4)).case_head, Some(id(0)));
        let cond = p.conditional(id(3)).unwrap();
        assert_eq!(cond.jump, JumpKind::JumpIntoCase);
        // The ELSE branch stays inside the outer arm.
        assert_eq!(cond.kind, CondKind::IfThen);
    }
}
