//! Basic-block partitioning and procedure segmentation.
//!
//! The listing is cut into blocks after every control transfer (plus its
//! delay slots) and before every labelled instruction. Edges come from the
//! resolved branch targets; blocks that no procedure entry reaches are
//! dropped, and the survivors are grouped into procedures in listing order.

use std::collections::HashMap;

use log::debug;

use super::node::{BlockKind, NodeId};
use super::procedure::{BlockSpec, Procedure};
use super::Program;
use crate::entity::EntityRef;
use crate::error::{CoreError, Result};
use crate::metrics::Metrics;
use crate::pipeline::LoopStrategy;
use crate::source::Listing;

/// A block before reachability and segmentation. Successors are indices
/// into the listing-wide block list.
#[derive(Debug, Clone)]
struct RawBlock {
    start: usize,
    end: usize,
    kind: BlockKind,
    cti: Option<usize>,
    succs: Vec<usize>,
    /// Control runs past the last instruction of the listing.
    falls_off: bool,
}

impl RawBlock {
    fn ident(index: usize) -> u32 {
        (index + 1) as u32
    }
}

/// Build every procedure graph of `listing`.
pub fn build_program(
    listing: Listing,
    strategy: LoopStrategy,
    metrics: &mut Metrics,
) -> Result<Program> {
    metrics.instructions += listing.declared_instructions;

    let mut blocks = partition(&listing);
    link(&listing, &mut blocks);

    let reached = reachable(&listing, &blocks);
    for (i, block) in blocks.iter().enumerate() {
        if reached[i] {
            if block.falls_off {
                return Err(CoreError::FallsOffEnd {
                    block: RawBlock::ident(i),
                });
            }
            metrics.graph_nodes += 1;
            metrics.graph_edges += block.succs.len();
        } else {
            debug!(
                "block {} (lines {}..) is unreachable, dropping {} instructions",
                RawBlock::ident(i),
                listing.instructions[block.start].line,
                block.end - block.start
            );
            metrics.unreachable_instructions += block.end - block.start;
        }
    }

    let mut procedures = Vec::new();
    for (name, members) in segment(&listing, &blocks, &reached)? {
        procedures.push(assemble(name, &members, &blocks, strategy)?);
    }
    debug!(
        "{}: {} procedures, {} blocks",
        listing.file,
        procedures.len(),
        metrics.graph_nodes
    );

    Ok(Program {
        listing,
        procedures,
    })
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

fn partition(listing: &Listing) -> Vec<RawBlock> {
    let insts = &listing.instructions;
    let mut blocks = Vec::new();
    let mut start = 0;

    while start < insts.len() {
        let mut i = start;
        let mut cti = None;
        while i < insts.len() {
            if i > start && insts[i].is_labelled() {
                break;
            }
            if insts[i].kind.ends_block() {
                cti = Some(i);
                i += 1;
                // Delay slots belong to the transfer, up to the next label.
                let mut slots = 0;
                while slots < listing.delay_slots && i < insts.len() && !insts[i].is_labelled() {
                    i += 1;
                    slots += 1;
                }
                break;
            }
            i += 1;
        }

        let kind = cti.map_or(BlockKind::Fall, |c| BlockKind::from(insts[c].kind));
        blocks.push(RawBlock {
            start,
            end: i,
            kind,
            cti,
            succs: Vec::new(),
            falls_off: false,
        });
        start = i;
    }
    blocks
}

fn link(listing: &Listing, blocks: &mut [RawBlock]) {
    let block_at: HashMap<usize, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.start, i))
        .collect();
    let count = blocks.len();

    for (i, block) in blocks.iter_mut().enumerate() {
        let next = (i + 1 < count).then_some(i + 1);
        let cti = block.cti.map(|c| &listing.instructions[c]);
        // Branch targets are labelled instructions, so they always start a block.
        let target = cti
            .and_then(|inst| inst.branch_target)
            .and_then(|t| block_at.get(&t).copied());

        match block.kind {
            BlockKind::TwoWay => {
                let (Some(then), Some(other)) = (target, next) else {
                    block.falls_off = true;
                    continue;
                };
                if then == other {
                    block.kind = BlockKind::Fall;
                    block.succs = vec![then];
                } else {
                    block.succs = vec![then, other];
                }
            }
            BlockKind::MultiWay => {
                if let Some(inst) = cti {
                    block.succs = inst
                        .jump_targets
                        .iter()
                        .filter_map(|t| block_at.get(t).copied())
                        .collect();
                }
            }
            BlockKind::Jump => block.succs = target.into_iter().collect(),
            BlockKind::Fall | BlockKind::Call => match next {
                Some(n) => block.succs = vec![n],
                None => block.falls_off = true,
            },
            BlockKind::Return => {}
        }
    }
}

/// Blocks reachable from any procedure entry.
fn reachable(listing: &Listing, blocks: &[RawBlock]) -> Vec<bool> {
    let mut seen = vec![false; blocks.len()];
    let mut stack: Vec<usize> = blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| listing.instructions[b.start].proc_label.is_some())
        .map(|(i, _)| i)
        .collect();

    while let Some(b) = stack.pop() {
        if std::mem::replace(&mut seen[b], true) {
            continue;
        }
        stack.extend(blocks[b].succs.iter().filter(|&&s| !seen[s]));
    }
    seen
}

// ---------------------------------------------------------------------------
// Segmentation
// ---------------------------------------------------------------------------

/// Group reachable blocks under the procedure label that precedes them.
fn segment(
    listing: &Listing,
    blocks: &[RawBlock],
    reached: &[bool],
) -> Result<Vec<(String, Vec<usize>)>> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        if !reached[i] {
            continue;
        }
        let first = &listing.instructions[block.start];
        if let Some(name) = &first.proc_label {
            groups.push((name.clone(), Vec::new()));
        }
        match groups.last_mut() {
            Some((_, members)) => members.push(i),
            None => return Err(CoreError::NoProcedure { line: first.line }),
        }
    }
    Ok(groups)
}

fn assemble(
    name: String,
    members: &[usize],
    blocks: &[RawBlock],
    strategy: LoopStrategy,
) -> Result<Procedure> {
    let local: HashMap<usize, NodeId> = members
        .iter()
        .enumerate()
        .map(|(n, &b)| (b, NodeId::new(n)))
        .collect();

    let mut exit: Option<NodeId> = None;
    let mut specs = Vec::with_capacity(members.len());
    for (n, &b) in members.iter().enumerate() {
        let block = &blocks[b];
        if block.kind == BlockKind::Return {
            if let Some(first) = exit {
                return Err(CoreError::MultipleReturns {
                    procedure: name,
                    first: RawBlock::ident(members[first.index()]),
                    second: RawBlock::ident(b),
                });
            }
            exit = Some(NodeId::new(n));
        }

        let mut succs = Vec::with_capacity(block.succs.len());
        for s in &block.succs {
            let Some(&id) = local.get(s) else {
                return Err(CoreError::CrossProcedureEdge {
                    procedure: name,
                    from: RawBlock::ident(b),
                    to: RawBlock::ident(*s),
                });
            };
            succs.push(id);
        }

        specs.push(BlockSpec {
            ident: RawBlock::ident(b),
            insts: block.start..block.end,
            kind: block.kind,
            cti: block.cti,
            succs,
        });
    }

    let Some(exit) = exit else {
        return Err(CoreError::MissingReturn { procedure: name });
    };
    debug!("procedure '{name}': {} blocks", specs.len());
    Procedure::new(name, specs, exit, strategy.uses_stamps())
}
