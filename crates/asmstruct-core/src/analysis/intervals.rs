//! Intervals and the derived sequence of graphs.
//!
//! An interval is a maximal single-entry subgraph in which every member
//! other than the header has all of its predecessors inside the interval.
//! Collapsing each interval to one node yields the next derived graph; the
//! sequence ends when a graph has a single node (the procedure is
//! reducible) or when partitioning no longer shrinks the graph.

use std::collections::VecDeque;
use std::fmt::Write;

use crate::entity::EntityRef;
use crate::graph::{NodeId, Procedure};
use crate::metrics::Metrics;

/// One interval of a derived graph. `members` index the nodes of the graph
/// it was built from: blocks at level 0, intervals of the previous level
/// above that. The header is always `members[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// Numbered across the whole sequence.
    pub ident: usize,
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedGraph {
    pub node_count: usize,
    pub intervals: Vec<Interval>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedSequence {
    pub graphs: Vec<DerivedGraph>,
}

/// Adjacency of one graph in the sequence.
struct Level {
    head: usize,
    succs: Vec<Vec<usize>>,
    preds: Vec<Vec<usize>>,
}

impl Level {
    fn of(proc: &Procedure) -> Self {
        let indices = |v: &Vec<NodeId>| v.iter().map(|n| n.index()).collect::<Vec<_>>();
        Self {
            head: proc.entry.index(),
            succs: proc.nodes.values().map(|n| indices(&n.succs)).collect(),
            preds: proc.nodes.values().map(|n| indices(&n.preds)).collect(),
        }
    }

    fn len(&self) -> usize {
        self.succs.len()
    }

    fn intervals(&self) -> (Vec<Vec<usize>>, Vec<usize>) {
        let mut interval_of: Vec<Option<usize>> = vec![None; self.len()];
        let mut been_header = vec![false; self.len()];
        let mut headers = VecDeque::from([self.head]);
        been_header[self.head] = true;
        let mut intervals: Vec<Vec<usize>> = Vec::new();

        while let Some(header) = headers.pop_front() {
            if interval_of[header].is_some() {
                // Absorbed by an interval after it was queued.
                continue;
            }
            let idx = intervals.len();
            let mut members = vec![header];
            interval_of[header] = Some(idx);

            let mut i = 0;
            while i < members.len() {
                for &succ in &self.succs[members[i]] {
                    if interval_of[succ].is_some() {
                        continue;
                    }
                    if self.preds[succ].iter().all(|&p| interval_of[p] == Some(idx)) {
                        members.push(succ);
                        interval_of[succ] = Some(idx);
                    } else if !been_header[succ] {
                        been_header[succ] = true;
                        headers.push_back(succ);
                    }
                }
                i += 1;
            }
            intervals.push(members);
        }

        let interval_of = interval_of.into_iter().map(|i| i.unwrap_or(0)).collect();
        (intervals, interval_of)
    }

    /// Collapse each interval into one node.
    fn derived(&self, intervals: &[Vec<usize>], interval_of: &[usize]) -> Self {
        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); intervals.len()];
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); intervals.len()];
        for (i, members) in intervals.iter().enumerate() {
            for &m in members {
                for &child in &self.succs[m] {
                    let j = interval_of[child];
                    if j != i && !succs[i].contains(&j) {
                        succs[i].push(j);
                        preds[j].push(i);
                    }
                }
            }
        }
        Self {
            head: 0,
            succs,
            preds,
        }
    }
}

impl DerivedSequence {
    pub fn build(proc: &Procedure) -> Self {
        let mut graphs = Vec::new();
        let mut level = Level::of(proc);
        let mut next_ident = 0;

        loop {
            let (intervals, interval_of) = level.intervals();
            let node_count = level.len();
            let stop = node_count == 1 || intervals.len() == node_count;
            let next = (!stop).then(|| level.derived(&intervals, &interval_of));

            graphs.push(DerivedGraph {
                node_count,
                intervals: intervals
                    .into_iter()
                    .map(|members| {
                        next_ident += 1;
                        Interval {
                            ident: next_ident - 1,
                            members,
                        }
                    })
                    .collect(),
            });
            match next {
                Some(next) => level = next,
                None => break,
            }
        }
        Self { graphs }
    }

    /// Add the interval and derived-graph counts to `metrics`. Only graphs
    /// that were reduced further are counted.
    pub fn record(&self, metrics: &mut Metrics) {
        for graph in &self.graphs {
            if graph.node_count != 1 && graph.intervals.len() != graph.node_count {
                metrics.derived_graphs += 1;
                metrics.intervals += graph.intervals.len();
            }
        }
    }

    /// Whether the sequence collapsed to a single node.
    pub fn is_reducible(&self) -> bool {
        self.graphs.last().is_some_and(|g| g.node_count == 1)
    }

    /// The block heading interval `j` of derived graph `level`.
    pub fn header_block(&self, level: usize, j: usize) -> NodeId {
        let mut node = self.graphs[level].intervals[j].members[0];
        for l in (0..level).rev() {
            node = self.graphs[l].intervals[node].members[0];
        }
        NodeId::new(node)
    }

    /// Every block collapsed into interval `j` of derived graph `level`.
    pub fn member_blocks(&self, level: usize, j: usize) -> Vec<NodeId> {
        let mut nodes = self.graphs[level].intervals[j].members.clone();
        for l in (0..level).rev() {
            nodes = nodes
                .iter()
                .flat_map(|&i| self.graphs[l].intervals[i].members.iter().copied())
                .collect();
        }
        nodes.into_iter().map(NodeId::new).collect()
    }

    /// Human-readable listing of every derived graph's intervals.
    pub fn report(&self, proc: &Procedure) -> String {
        let mut out = format!("Derived sequence intervals for procedure {}\n", proc.name);
        for (level, graph) in self.graphs.iter().enumerate() {
            let _ = writeln!(out, "\nDerived graph #{level}:");
            for interval in &graph.intervals {
                let _ = writeln!(out, "   Interval #{}:", interval.ident);
                for &m in &interval.members {
                    if level == 0 {
                        let _ = writeln!(out, "      BB node #{}", proc.order_of(NodeId::new(m)));
                    } else {
                        let ident = self.graphs[level - 1].intervals[m].ident;
                        let _ = writeln!(out, "      IntNode #{ident}");
                    }
                }
            }
        }
        out.push_str(if self.is_reducible() {
            "The graph is reducible.\n"
        } else {
            "The graph is not reducible.\n"
        });
        out
    }
}

impl Procedure {
    pub fn derived_sequence(&self) -> DerivedSequence {
        DerivedSequence::build(self)
    }
}
