//! Listing fixtures for unit tests.
//!
//! A graph is described block by block as a list of [`Shape`]s. Block `i`
//! gets the label `.B{i}` (block 0 is also the procedure `main`), so the
//! `NodeId` of a reachable block equals its position in the list.

use crate::graph::{build_program, Procedure, Program};
use crate::metrics::Metrics;
use crate::pipeline::LoopStrategy;
use crate::source::{parse_listing, OpcodeTable};

#[derive(Debug, Clone)]
pub(crate) enum Shape {
    /// A single plain instruction falling into the next block.
    Fall,
    /// A call, then fall into the next block.
    Call,
    /// `ba .B{t}`.
    Jump(usize),
    /// `bne .B{t}`: THEN is block `t`, ELSE the next block.
    Cond(usize),
    /// `jmp` through a table of blocks.
    Switch(Vec<usize>),
    /// A bare `ret`.
    Ret,
}

pub(crate) fn listing_for(shapes: &[Shape]) -> String {
    let mut body = String::new();
    let mut count = 0;
    for (i, shape) in shapes.iter().enumerate() {
        if i == 0 {
            body.push_str("main:\n");
        }
        body.push_str(&format!(".B{i}:\n"));
        let lines: Vec<String> = match shape {
            Shape::Fall => vec![format!("add %o0, {i}, %o0")],
            Shape::Call => vec![format!("call helper{i}"), "nop".to_string()],
            Shape::Jump(t) => vec![format!("ba .B{t}"), "nop".to_string()],
            Shape::Cond(t) => vec![
                format!("cmp %o0, {i}"),
                format!("bne .B{t}"),
                "nop".to_string(),
            ],
            Shape::Switch(targets) => {
                let labels: Vec<String> = targets.iter().map(|t| format!(".B{t}")).collect();
                vec![format!("jmp {}", labels.join(" ")), "nop".to_string()]
            }
            Shape::Ret => vec!["ret".to_string(), "restore".to_string()],
        };
        for line in lines {
            body.push('\t');
            body.push_str(&line);
            body.push('\n');
            count += 1;
        }
    }
    format!("{count}\n{}\n80\n{body}", shapes.len() + 1)
}

/// Build the single procedure described by `shapes` for the stamp strategy.
pub(crate) fn procedure(shapes: &[Shape]) -> Procedure {
    procedure_with(shapes, LoopStrategy::Stamps)
}

pub(crate) fn procedure_with(shapes: &[Shape], strategy: LoopStrategy) -> Procedure {
    program_with(shapes, strategy).procedures.remove(0)
}

pub(crate) fn program_with(shapes: &[Shape], strategy: LoopStrategy) -> Program {
    let listing = parse_listing(&listing_for(shapes), "test.s", &OpcodeTable::sparc())
        .expect("fixture listing parses");
    build_program(listing, strategy, &mut Metrics::default()).expect("fixture listing builds")
}
