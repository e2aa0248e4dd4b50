//! Graph description output for an external renderer.
//!
//! One diamond per procedure pointing at its entry block, one box per
//! block labelled with its order and whatever annotations the output
//! configuration asks for. THEN edges are bold; jumps to a bare return
//! block are dashed.

use std::fmt::Write;

use unicode_ident::{is_xid_continue, is_xid_start};

use crate::entity::EntityRef;
use crate::graph::{BlockKind, NodeId, Procedure, Program, Structure, THEN};
use crate::pipeline::OutputConfig;

/// Render the graph description of `program`. `coverage` marks the blocks
/// code generation reached; unreached blocks are shaded.
pub fn emit_graph(program: &Program, config: &OutputConfig, coverage: Option<&[Vec<bool>]>) -> String {
    let mut out = String::from("digraph ast {\n");
    for (i, proc) in program.procedures.iter().enumerate() {
        let generated = coverage.and_then(|c| c.get(i)).map(Vec::as_slice);
        write_procedure(&mut out, proc, config, generated);
    }
    out.push_str("}\n");
    out
}

/// A graphviz ID for a procedure name: bare when it is an identifier,
/// quoted otherwise.
fn dot_id(name: &str) -> String {
    let mut chars = name.chars();
    let bare = chars
        .next()
        .is_some_and(|c| c == '_' || is_xid_start(c))
        && chars.all(is_xid_continue);
    if bare {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn write_procedure(out: &mut String, proc: &Procedure, config: &OutputConfig, generated: Option<&[bool]>) {
    let name = dot_id(&proc.name);
    let _ = writeln!(out, "\t{name} [shape=diamond];");

    for (id, node) in proc.nodes.iter() {
        let _ = write!(out, "\t{} [shape=box", node.ident);
        if generated.is_some_and(|g| !g[id.index()]) {
            out.push_str(",style=filled");
        }
        let _ = write!(out, ",label=\"{}", node.order + 1);
        if config.show_reverse_order {
            let rev = node.rev_order.map_or_else(|| "-".to_string(), |r| (r + 1).to_string());
            let _ = write!(out, "({rev})");
        }
        if config.show_structure_info {
            out.push(':');
            out.push_str(&structure_label(proc, &node.structure));
        }
        if config.show_heads {
            if let Some(head) = node.loop_head {
                let _ = write!(out, "\\nLH:{}", proc.order_of(head) + 1);
            }
            if let Some(head) = node.case_head {
                let _ = write!(out, "\\nCH:{}", proc.order_of(head) + 1);
            }
        }
        if config.show_post_dominators {
            match node.ipdom {
                Some(p) => {
                    let _ = write!(out, "\\nImmPDom:{}", proc.order_of(p) + 1);
                }
                None => out.push_str("\\nImmPDom: -"),
            }
        }
        out.push_str("\"];\n");
    }

    let _ = writeln!(out, "\t{name} -> {};", proc.node(proc.entry).ident);
    for (id, node) in proc.nodes.iter() {
        for (slot, &succ) in node.succs.iter().enumerate() {
            let _ = write!(out, "\t{} -> {}", node.ident, proc.node(succ).ident);
            if proc.is_jump_to_return(id) {
                out.push_str(" [style=dashed];\n");
            } else if node.kind == BlockKind::TwoWay && slot == THEN {
                out.push_str(" [style=bold];\n");
            } else {
                out.push_str(";\n");
            }
        }
    }
}

fn structure_label(proc: &Procedure, structure: &Structure) -> String {
    let order = |n: Option<NodeId>| n.map_or_else(|| "(null)".to_string(), |n| (proc.order_of(n) + 1).to_string());
    match structure {
        Structure::Sequential => structure.name().to_string(),
        Structure::Conditional(cond) => format!("{}\\nCF:{}", cond.kind.name(), order(cond.follow)),
        Structure::Loop(info) => format!(
            "{}\\nLT:{}\\nLF:{}",
            info.kind.name(),
            order(Some(info.latch)),
            order(info.follow)
        ),
        Structure::LoopConditional(info, cond) => format!(
            "{}\\nLT:{}\\nLF:{}\\nCF:{}",
            info.kind.name(),
            order(Some(info.latch)),
            order(info.follow),
            order(cond.follow)
        ),
    }
}
