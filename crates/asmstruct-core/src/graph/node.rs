use std::ops::Range;

use serde::Serialize;

use super::structure::Structure;
use crate::define_entity;
use crate::source::InstKind;

define_entity!(NodeId);

/// Out-edge slot of the taken branch of a two-way block.
pub const THEN: usize = 0;
/// Out-edge slot of the fall-through branch of a two-way block.
pub const ELSE: usize = 1;

/// How control leaves a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockKind {
    Fall,
    Jump,
    TwoWay,
    MultiWay,
    Call,
    Return,
}

impl From<InstKind> for BlockKind {
    fn from(kind: InstKind) -> Self {
        match kind {
            InstKind::Plain => BlockKind::Fall,
            InstKind::Branch => BlockKind::TwoWay,
            InstKind::Jump => BlockKind::Jump,
            InstKind::MultiWay => BlockKind::MultiWay,
            InstKind::Call => BlockKind::Call,
            InstKind::Return => BlockKind::Return,
        }
    }
}

/// Entry and exit times of a DFS visit ("loop stamps").
///
/// One node is a DFS ancestor of another exactly when its interval strictly
/// encloses the other's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stamps {
    pub enter: u32,
    pub exit: u32,
}

impl Stamps {
    pub fn encloses(self, other: Stamps) -> bool {
        self.enter < other.enter && other.exit < self.exit
    }
}

/// A basic block together with everything the analyses learn about it.
#[derive(Debug, Clone)]
pub struct Node {
    /// Block number in listing order (starting at 1), stable across removal
    /// of unreachable blocks.
    pub ident: u32,
    /// Instruction indices in the listing.
    pub insts: Range<usize>,
    pub kind: BlockKind,
    /// Listing index of the control transfer that ends the block.
    pub cti: Option<usize>,
    pub succs: Vec<NodeId>,
    /// Predecessors in the order the forward DFS traversed their edges.
    pub preds: Vec<NodeId>,
    /// Position in the forward DFS finish order.
    pub order: usize,
    /// Position in the reverse-graph DFS finish order, if the node reaches
    /// the exit.
    pub rev_order: Option<usize>,
    pub stamps: Stamps,
    /// Stamps of the mirrored DFS (children in reverse order). Only
    /// computed for the stamp-based loop strategy.
    pub rev_stamps: Option<Stamps>,

    pub ipdom: Option<NodeId>,
    pub loop_head: Option<NodeId>,
    pub case_head: Option<NodeId>,
    pub structure: Structure,
}

impl Node {
    pub fn is_two_way(&self) -> bool {
        self.kind == BlockKind::TwoWay
    }

    pub fn is_multi_way(&self) -> bool {
        self.kind == BlockKind::MultiWay
    }

    /// Clear every analysis result, keeping the graph and its numbering.
    pub fn reset_analysis(&mut self) {
        self.ipdom = None;
        self.loop_head = None;
        self.case_head = None;
        self.structure = Structure::Sequential;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_enclose_strictly() {
        let outer = Stamps { enter: 1, exit: 10 };
        let inner = Stamps { enter: 2, exit: 5 };
        assert!(outer.encloses(inner));
        assert!(!inner.encloses(outer));
        assert!(!outer.encloses(outer));
    }

    #[test]
    fn block_kind_from_inst_kind() {
        assert_eq!(BlockKind::from(InstKind::Branch), BlockKind::TwoWay);
        assert_eq!(BlockKind::from(InstKind::Plain), BlockKind::Fall);
        assert_eq!(BlockKind::from(InstKind::MultiWay), BlockKind::MultiWay);
    }
}
