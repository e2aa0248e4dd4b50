//! A flat, serializable summary of a structured procedure.
//!
//! Nodes are named by their block identity so the summary reads the same
//! regardless of arena layout. Used for `--dump-shape` and for the
//! per-pass debug dumps.

use std::fmt;

use serde::Serialize;

use super::node::{BlockKind, NodeId};
use super::procedure::Procedure;
use super::structure::{CondKind, JumpKind, LoopKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeShape {
    pub ident: u32,
    pub kind: BlockKind,
    pub order: usize,
    pub rev_order: Option<usize>,
    pub succs: Vec<u32>,
    pub structure: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_kind: Option<LoopKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_follow: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cond_kind: Option<CondKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cond_follow: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump: Option<JumpKind>,
    pub ipdom: Option<u32>,
    pub loop_head: Option<u32>,
    pub case_head: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureShape {
    pub name: String,
    pub entry: u32,
    pub exit: u32,
    /// Nodes in forward finish order.
    pub nodes: Vec<NodeShape>,
}

impl ProcedureShape {
    pub fn of(proc: &Procedure) -> Self {
        let ident = |id: NodeId| proc.node(id).ident;
        let nodes = proc
            .order
            .iter()
            .map(|&id| {
                let node = proc.node(id);
                let info = node.structure.loop_info();
                let cond = node.structure.conditional();
                NodeShape {
                    ident: node.ident,
                    kind: node.kind,
                    order: node.order,
                    rev_order: node.rev_order,
                    succs: node.succs.iter().map(|&s| ident(s)).collect(),
                    structure: node.structure.name(),
                    loop_kind: info.map(|i| i.kind),
                    latch: info.map(|i| ident(i.latch)),
                    loop_follow: info.and_then(|i| i.follow).map(ident),
                    cond_kind: cond.map(|c| c.kind),
                    cond_follow: cond.and_then(|c| c.follow).map(ident),
                    jump: cond.map(|c| c.jump),
                    ipdom: node.ipdom.map(ident),
                    loop_head: node.loop_head.map(ident),
                    case_head: node.case_head.map(ident),
                }
            })
            .collect();
        Self {
            name: proc.name.clone(),
            entry: ident(proc.entry),
            exit: ident(proc.exit),
            nodes,
        }
    }

    pub fn node(&self, ident: u32) -> Option<&NodeShape> {
        self.nodes.iter().find(|n| n.ident == ident)
    }
}

fn opt(v: Option<u32>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl fmt::Display for ProcedureShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "procedure {} (entry {}, exit {})", self.name, self.entry, self.exit)?;
        writeln!(f, "  blk ord  rev  ipdom lh   ch   structure")?;
        for n in &self.nodes {
            write!(
                f,
                "  {:<3} {:<4} {:<4} {:<5} {:<4} {:<4} {}",
                n.ident,
                n.order,
                n.rev_order.map_or_else(|| "-".to_string(), |r| r.to_string()),
                opt(n.ipdom),
                opt(n.loop_head),
                opt(n.case_head),
                n.structure,
            )?;
            if let Some(kind) = n.loop_kind {
                write!(
                    f,
                    " {} latch={} follow={}",
                    kind.name(),
                    opt(n.latch),
                    opt(n.loop_follow)
                )?;
            }
            if let Some(kind) = n.cond_kind {
                write!(f, " {} follow={}", kind.name(), opt(n.cond_follow))?;
                if let Some(jump) = n.jump.filter(|j| *j != JumpKind::Structured) {
                    write!(f, " {jump:?}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{procedure, Shape};

    #[test]
    fn shape_names_nodes_by_block_identity() {
        let p = procedure(&[Shape::Cond(2), Shape::Fall, Shape::Ret]);
        let shape = ProcedureShape::of(&p);
        assert_eq!(shape.name, "main");
        assert_eq!(shape.entry, 1);
        assert_eq!(shape.exit, 3);
        assert_eq!(shape.node(1).map(|n| n.succs.clone()), Some(vec![3, 2]));
        // Forward finish order: the exit finishes first.
        assert_eq!(shape.nodes[0].ident, 3);
    }

    #[test]
    fn display_lists_every_node() {
        let p = procedure(&[Shape::Fall, Shape::Ret]);
        let text = ProcedureShape::of(&p).to_string();
        assert!(text.starts_with("procedure main (entry 1, exit 2)"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn serializes_without_empty_structure_fields() {
        let p = procedure(&[Shape::Fall, Shape::Ret]);
        let json = serde_json::to_value(ProcedureShape::of(&p)).unwrap();
        let node = &json["nodes"][0];
        assert_eq!(node["structure"], "seq");
        assert!(node.get("loop_kind").is_none());
    }
}
