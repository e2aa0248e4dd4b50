//! Loop detection with loop stamps.
//!
//! Nodes are visited from the highest forward order down, so an enclosing
//! loop is tagged before the loops nested in it; the inner loop then
//! overwrites the loop head of its own members.

use log::debug;

use super::{Loop, LoopDetector};
use crate::analysis::conditionals::conditional_for;
use crate::entity::EntityRef;
use crate::error::Result;
use crate::graph::{LoopKind, NodeId, Procedure, Structure};
use crate::metrics::Metrics;

pub struct StampLoops;

impl LoopDetector for StampLoops {
    fn name(&self) -> &'static str {
        "stamps"
    }

    fn structure_loops(&self, proc: &mut Procedure, _metrics: &mut Metrics) -> Result<()> {
        let mut found = 0;
        for i in (0..proc.len()).rev() {
            let header = proc.at_order(i);
            let Some(latch) = find_latch(proc, header) else {
                continue;
            };
            found += 1;

            if latch != header && proc.node(latch).structure.is_conditional() {
                proc.node_mut(latch).structure = Structure::Sequential;
            }
            let body = tag_members(proc, header, latch);
            let (kind, with_cond) = classify(proc, &body)?;
            let follow = match kind {
                LoopKind::PreTested => Some(body.exit_succ(proc, header)),
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
        }
        debug!("{}: {found} loops", proc.name);
        Ok(())
    }
}

/// The lowest-ordered predecessor that closes a cycle through `header` from
/// within the same loop and switch body, is not a switch itself, and does
/// not already latch the loop enclosing it.
fn find_latch(proc: &Procedure, header: NodeId) -> Option<NodeId> {
    let head = proc.node(header);
    let mut latch: Option<NodeId> = None;
    for &pred in &head.preds {
        let p = proc.node(pred);
        let eligible = p.case_head == head.case_head
            && p.loop_head == head.loop_head
            && !p.is_multi_way()
            && !proc.is_latch(pred)
            && proc.has_back_edge_to(pred, header);
        if eligible && latch.map_or(true, |l| proc.order_of(l) > proc.order_of(pred)) {
            latch = Some(pred);
        }
    }
    latch
}

/// Tag every node between header and latch that the stamps place inside
/// the loop.
fn tag_members(proc: &mut Procedure, header: NodeId, latch: NodeId) -> Loop {
    let mut members = vec![false; proc.len()];
    for i in (proc.order_of(latch)..proc.order_of(header)).rev() {
        let n = proc.at_order(i);
        if proc.in_loop(n, header, latch) {
            members[n.index()] = true;
            proc.node_mut(n).loop_head = Some(header);
        }
    }
    Loop {
        header,
        latch,
        members,
    }
}

/// Loop kind, and whether the header stays a conditional as well.
fn classify(proc: &Procedure, body: &Loop) -> Result<(LoopKind, bool)> {
    let header = proc.node(body.header);
    if proc.node(body.latch).is_two_way() {
        return Ok((
            LoopKind::PostTested,
            header.is_two_way() && body.header != body.latch,
        ));
    }
    if !header.is_two_way() {
        return Ok((LoopKind::Endless, false));
    }
    let kind = match conditional_for(proc, body.header)?.follow {
        Some(follow) if body.contains(follow) => (LoopKind::Endless, true),
        Some(_) => (LoopKind::PreTested, false),
        // The header also closes an outer cycle, so it has no follow of its
        // own: it tests at the top if either branch leaves the loop.
        None => {
            let leaves = header.succs.iter().any(|&s| !body.contains(s));
            if leaves {
                (LoopKind::PreTested, false)
            } else {
                (LoopKind::Endless, false)
            }
        }
    };
    Ok(kind)
}

/// Among the conditionals of the loop body whose follow lies outside the
/// loop, the exit branch with the highest order.
fn endless_follow(proc: &Procedure, body: &Loop) -> Option<NodeId> {
    let latch_order = proc.order_of(body.latch);
    let mut follow: Option<NodeId> = None;
    let mut i = proc.order_of(body.header);

    while i > latch_order + 1 {
        i -= 1;
        let desc = proc.at_order(i);
        let node = proc.node(desc);
        let Structure::Conditional(cond) = node.structure else {
            continue;
        };
        let Some(cond_follow) = cond.follow else {
            continue;
        };
        if node.loop_head != Some(body.header) {
            continue;
        }

        if body.contains(cond_follow) {
            // Skip to the follow; nothing between here and there can exit
            // further out. A follow above this node means every node below
            // is governed by a conditional inside the loop.
            if i > proc.order_of(cond_follow) {
                i = proc.order_of(cond_follow);
            } else {
                break;
            }
        } else {
            let exit = if !body.contains(node.succs[0]) {
                Some(node.succs[0])
            } else if !body.contains(node.succs[1]) {
                Some(node.succs[1])
            } else {
                None
            };
            if let Some(exit) = exit {
                if follow.map_or(true, |f| proc.order_of(exit) > proc.order_of(f)) {
                    follow = Some(exit);
                }
            }
        }
    }
    follow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::conditionals::structure_conditionals;
    use crate::analysis::dominators::immediate_post_dominators;
    use crate::graph::testing::{procedure, Shape};

    fn looped(shapes: &[Shape]) -> Procedure {
        let mut p = procedure(shapes);
        immediate_post_dominators(&mut p).unwrap();
        structure_conditionals(&mut p).unwrap();
        StampLoops
            .structure_loops(&mut p, &mut Metrics::default())
            .unwrap();
        p
    }

    fn id(n: usize) -> NodeId {
        NodeId::new(n)
    }

    #[test]
    fn post_tested_loop_with_conditional_latch() {
        // 0 -> 1 -> 2; 2: if -> 0 else 3
        let p = looped(&[Shape::Fall, Shape::Fall, Shape::Cond(0), Shape::Ret]);
        let info = p.loop_info(id(0)).unwrap();
        assert_eq!(info.kind, LoopKind::PostTested);
        assert_eq!(info.latch, id(2));
        assert_eq!(info.follow, Some(id(3)));
        assert_eq!(p.node(id(2)).structure, Structure::Sequential);
        assert_eq!(p.node(id(1)).loop_head, Some(id(0)));
        assert_eq!(p.node(id(2)).loop_head, Some(id(0)));
        assert_eq!(p.node(id(3)).loop_head, None);
    }

    #[test]
    fn pre_tested_loop_exits_from_header() {
        // 0 -> 1; 1: if -> 3 else 2; 2 -> 1; 3 returns
        let p = looped(&[Shape::Fall, Shape::Cond(3), Shape::Jump(1), Shape::Ret]);
        let info = p.loop_info(id(1)).unwrap();
        assert_eq!(info.kind, LoopKind::PreTested);
        assert_eq!(info.latch, id(2));
        assert_eq!(info.follow, Some(id(3)));
        assert!(matches!(p.node(id(1)).structure, Structure::Loop(_)));
    }

    #[test]
    fn endless_loop_follow_comes_from_inner_exit() {
        // The exit test sits in the middle of the body:
        // 0 -> 1 (header); 1 -> 2; 2: if -> 4 else 3; 3 -> 1; 4 returns
        let p = looped(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(4),
            Shape::Jump(1),
            Shape::Ret,
        ]);
        let info = p.loop_info(id(1)).unwrap();
        assert_eq!(info.kind, LoopKind::Endless);
        assert_eq!(info.latch, id(3));
        assert_eq!(info.follow, Some(id(4)));
    }

    #[test]
    fn self_loop_is_its_own_latch() {
        // 0 -> 1; 1: if -> 1 else 2; 2 returns
        let p = looped(&[Shape::Fall, Shape::Cond(1), Shape::Ret]);
        let info = p.loop_info(id(1)).unwrap();
        assert_eq!(info.latch, id(1));
        assert_eq!(info.kind, LoopKind::PostTested);
        assert_eq!(info.follow, Some(id(2)));
        assert!(matches!(p.node(id(1)).structure, Structure::Loop(_)));
    }

    #[test]
    fn lowest_ordered_back_edge_is_the_latch() {
        // Header 1 has two back edges, from 2 and from 4.
        // 0 -> 1; 1 -> 2; 2: if -> 1 else 3; 3 -> 4; 4: if -> 1 else 5; 5 returns
        let p = looped(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(1),
            Shape::Fall,
            Shape::Cond(1),
            Shape::Ret,
        ]);
        let info = p.loop_info(id(1)).unwrap();
        let candidates = [id(2), id(4)];
        let lowest = candidates
            .into_iter()
            .min_by_key(|&c| p.order_of(c))
            .unwrap();
        assert_eq!(info.latch, lowest);
        assert_eq!(info.latch, id(4));
    }

    #[test]
    fn membership_matches_stamp_containment() {
        // Nested loops: outer header 1 latched by 4, inner header 2 latched by 3.
        // 0 -> 1; 1 -> 2; 2 -> 3; 3: if -> 2 else 4; 4: if -> 1 else 5; 5 returns
        let p = looped(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(2),
            Shape::Cond(1),
            Shape::Ret,
        ]);
        assert_eq!(p.latch_of(id(1)), Some(id(4)));
        assert_eq!(p.latch_of(id(2)), Some(id(3)));

        for header in [id(1), id(2)] {
            let latch = p.latch_of(header).unwrap();
            for n in p.nodes.keys() {
                let innermost = p.node(n).loop_head == Some(header);
                if innermost {
                    assert!(p.in_loop(n, header, latch), "node {n} tagged but outside");
                }
            }
        }
        assert_eq!(p.node(id(3)).loop_head, Some(id(2)));
        assert_eq!(p.node(id(2)).loop_head, Some(id(1)));
        assert_eq!(p.node(id(4)).loop_head, Some(id(1)));
        assert_eq!(p.node(id(5)).loop_head, None);
    }

    /// Every loop a node belongs to, innermost first.
    fn enclosing_heads(p: &Procedure, n: NodeId) -> Vec<NodeId> {
        let mut heads = Vec::new();
        let mut cur = p.node(n).loop_head;
        while let Some(h) = cur {
            heads.push(h);
            cur = p.node(h).loop_head;
        }
        heads
    }

    /// The tagged members of each loop are exactly the nodes between latch
    /// and header that the stamps place inside it.
    fn assert_members_follow_stamps(p: &Procedure) {
        for header in p.nodes.keys() {
            let Some(latch) = p.latch_of(header) else {
                continue;
            };
            let range = p.order_of(latch)..p.order_of(header);
            for n in p.nodes.keys() {
                let expected = range.contains(&p.order_of(n)) && p.in_loop(n, header, latch);
                let tagged = enclosing_heads(p, n).contains(&header);
                assert_eq!(tagged, expected, "node {n} in loop {header}");
            }
        }
    }

    #[test]
    fn nested_membership_is_exactly_the_stamped_nodes() {
        let p = looped(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(2),
            Shape::Cond(1),
            Shape::Ret,
        ]);
        assert_members_follow_stamps(&p);
    }

    // 0 -> 1 (header); 1 -> 2; 2: if -> 8 else 3; 3: if -> 5 else 4; 4 -> 2;
    // 5: if -> 7 else 6; 6 -> 1; 7 -> 1 (latch); 8 returns
    fn endless_with_backward_inner_follow() -> Vec<Shape> {
        vec![
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(8),
            Shape::Cond(5),
            Shape::Jump(2),
            Shape::Cond(7),
            Shape::Jump(1),
            Shape::Jump(1),
            Shape::Ret,
        ]
    }

    #[test]
    fn off_path_nodes_are_not_members() {
        let p = looped(&endless_with_backward_inner_follow());
        assert_eq!(p.latch_of(id(1)), Some(id(7)));
        assert_members_follow_stamps(&p);
        for n in [2, 3, 5, 7] {
            assert_eq!(p.node(id(n)).loop_head, Some(id(1)), "node {n}");
        }
        assert_eq!(p.node(id(4)).loop_head, None);
        assert_eq!(p.node(id(6)).loop_head, None);
    }

    #[test]
    fn endless_scan_stops_at_a_backward_inner_follow() {
        // Block 3 is followed by block 2, above it in the loop. Block 5 lies
        // below and would offer block 6 as a higher exit.
        let p = looped(&endless_with_backward_inner_follow());
        assert_eq!(p.cond_follow_of(id(3)), Some(id(2)));
        assert!(p.order_of(id(6)) > p.order_of(id(8)));
        let info = p.loop_info(id(1)).unwrap();
        assert_eq!(info.kind, LoopKind::Endless);
        assert_eq!(info.follow, Some(id(8)));
    }

    #[test]
    fn switch_closing_a_cycle_is_not_a_latch() {
        // 0 -> 1; 1 -> 2; 2: switch -> 1, 3; 3 returns
        let p = looped(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Switch(vec![1, 3]),
            Shape::Ret,
        ]);
        assert!(p.has_back_edge_to(id(2), id(1)));
        assert!(p.loop_info(id(1)).is_none());
        assert_eq!(p.node(id(2)).loop_head, None);
    }

    #[test]
    fn back_edge_from_a_switch_arm_is_not_a_latch() {
        // 0 -> 1; 1: switch -> 2, 3; 2: if -> 1 else 3; 3 -> 4; 4 returns
        let p = looped(&[
            Shape::Fall,
            Shape::Switch(vec![2, 3]),
            Shape::Cond(1),
            Shape::Fall,
            Shape::Ret,
        ]);
        assert_eq!(p.node(id(2)).case_head, Some(id(1)));
        assert!(p.has_back_edge_to(id(2), id(1)));
        assert!(p.loop_info(id(1)).is_none());
    }

    #[test]
    fn back_edge_from_another_loop_is_not_a_latch() {
        // Overlapping cycles: 1 <- 2 and 2 <- 3. Block 2 joins the loop at 1
        // first, so block 3 sits in a different loop than header 2.
        // 0 -> 1; 1 -> 2; 2: if -> 1 else 3; 3: if -> 2 else 4; 4 returns
        let p = looped(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(1),
            Shape::Cond(2),
            Shape::Ret,
        ]);
        assert_eq!(p.latch_of(id(1)), Some(id(2)));
        assert!(p.has_back_edge_to(id(3), id(2)));
        assert_eq!(p.latch_of(id(2)), None);
    }
}
