use std::ops::Range;

use crate::analysis::order;
use crate::entity::{EntityRef, PrimaryMap};
use crate::error::{CoreError, Result};
use crate::graph::node::{BlockKind, Node, NodeId};
use crate::graph::structure::{Conditional, LoopInfo, Structure};

/// A block as produced by the graph builder, before numbering.
#[derive(Debug, Clone)]
pub(crate) struct BlockSpec {
    pub ident: u32,
    pub insts: Range<usize>,
    pub kind: BlockKind,
    pub cti: Option<usize>,
    pub succs: Vec<NodeId>,
}

/// One independently analyzed procedure graph.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
    pub nodes: PrimaryMap<NodeId, Node>,
    pub entry: NodeId,
    /// The unique return block.
    pub exit: NodeId,
    /// Nodes in forward DFS finish order; `order[i]` has `order == i`.
    pub order: Vec<NodeId>,
    /// Nodes in reverse-graph DFS finish order.
    pub rev_order: Vec<NodeId>,
}

impl Procedure {
    /// Number the blocks and assemble the procedure. `blocks[0]` is the
    /// entry; `reverse_stamps` selects whether the mirrored DFS runs.
    pub(crate) fn new(
        name: String,
        blocks: Vec<BlockSpec>,
        exit: NodeId,
        reverse_stamps: bool,
    ) -> Result<Self> {
        let entry = NodeId::new(0);
        let succs: Vec<Vec<NodeId>> = blocks.iter().map(|b| b.succs.clone()).collect();
        let numbering = order::number(&succs, entry, exit, reverse_stamps).map_err(|missing| {
            CoreError::Structure {
                procedure: name.clone(),
                block: blocks[missing.index()].ident,
                message: "block is not reachable from the procedure entry".to_string(),
            }
        })?;

        let mut preds = numbering.preds;
        let mut nodes = PrimaryMap::with_capacity(blocks.len());
        for (i, block) in blocks.into_iter().enumerate() {
            nodes.push(Node {
                ident: block.ident,
                insts: block.insts,
                kind: block.kind,
                cti: block.cti,
                succs: block.succs,
                preds: std::mem::take(&mut preds[i]),
                order: numbering.position[i],
                rev_order: numbering.rev_position[i],
                stamps: numbering.stamps[i],
                rev_stamps: numbering.rev_stamps.as_ref().map(|s| s[i]),
                ipdom: None,
                loop_head: None,
                case_head: None,
                structure: Structure::Sequential,
            });
        }

        Ok(Self {
            name,
            nodes,
            entry,
            exit,
            order: numbering.order,
            rev_order: numbering.rev_order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// The `slot`-th successor of `id`.
    pub fn succ(&self, id: NodeId, slot: usize) -> NodeId {
        self.nodes[id].succs[slot]
    }

    pub fn order_of(&self, id: NodeId) -> usize {
        self.nodes[id].order
    }

    /// The node at position `i` of the forward finish order.
    pub fn at_order(&self, i: usize) -> NodeId {
        self.order[i]
    }

    /// Clear all analysis results so the structuring passes can run again.
    pub fn reset_analysis(&mut self) {
        for node in self.nodes.values_mut() {
            node.reset_analysis();
        }
    }

    // ---------------------------------------------------------------------
    // Stamp queries
    // ---------------------------------------------------------------------

    /// Whether `a` is a proper DFS ancestor of `b` in either the forward or
    /// the mirrored traversal.
    pub fn is_ancestor_of(&self, a: NodeId, b: NodeId) -> bool {
        let (na, nb) = (&self.nodes[a], &self.nodes[b]);
        if na.stamps.encloses(nb.stamps) {
            return true;
        }
        match (na.rev_stamps, nb.rev_stamps) {
            (Some(ra), Some(rb)) => ra.encloses(rb),
            _ => false,
        }
    }

    /// Whether the edge `src -> dest` closes a cycle.
    pub fn has_back_edge_to(&self, src: NodeId, dest: NodeId) -> bool {
        src == dest || self.is_ancestor_of(dest, src)
    }

    pub fn has_any_back_edge(&self, id: NodeId) -> bool {
        self.nodes[id]
            .succs
            .iter()
            .any(|&s| self.has_back_edge_to(id, s))
    }

    /// Whether `id` lies in the loop closed by `latch -> header`: it is the
    /// latch, or it sits between header and latch in either DFS tree.
    pub fn in_loop(&self, id: NodeId, header: NodeId, latch: NodeId) -> bool {
        if id == latch {
            return true;
        }
        let (n, h, l) = (&self.nodes[id], &self.nodes[header], &self.nodes[latch]);
        if h.stamps.encloses(n.stamps) && n.stamps.encloses(l.stamps) {
            return true;
        }
        match (n.rev_stamps, h.rev_stamps, l.rev_stamps) {
            (Some(rn), Some(rh), Some(rl)) => rh.encloses(rn) && rn.encloses(rl),
            _ => false,
        }
    }

    // ---------------------------------------------------------------------
    // Structure queries
    // ---------------------------------------------------------------------

    pub fn loop_info(&self, id: NodeId) -> Option<&LoopInfo> {
        self.nodes[id].structure.loop_info()
    }

    pub fn conditional(&self, id: NodeId) -> Option<&Conditional> {
        self.nodes[id].structure.conditional()
    }

    pub fn latch_of(&self, header: NodeId) -> Option<NodeId> {
        self.loop_info(header).map(|info| info.latch)
    }

    pub fn loop_follow_of(&self, header: NodeId) -> Option<NodeId> {
        self.loop_info(header).and_then(|info| info.follow)
    }

    pub fn cond_follow_of(&self, id: NodeId) -> Option<NodeId> {
        self.conditional(id).and_then(|cond| cond.follow)
    }

    /// Whether `id` is the latch of its innermost enclosing loop.
    pub fn is_latch(&self, id: NodeId) -> bool {
        self.nodes[id]
            .loop_head
            .is_some_and(|head| self.latch_of(head) == Some(id))
    }

    /// A return block holding nothing but the return and its delay slots.
    pub fn is_bare_return(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.kind == BlockKind::Return && node.cti == Some(node.insts.start)
    }

    /// An unconditional jump straight to a bare return block.
    pub fn is_jump_to_return(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.kind == BlockKind::Jump && node.succs.first().is_some_and(|&s| self.is_bare_return(s))
    }

    /// Build an internal-consistency error naming `id`.
    pub fn structure_error(&self, id: NodeId, message: impl Into<String>) -> CoreError {
        CoreError::Structure {
            procedure: self.name.clone(),
            block: self.nodes[id].ident,
            message: message.into(),
        }
    }
}
