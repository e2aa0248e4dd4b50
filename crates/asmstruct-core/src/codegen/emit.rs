//! Structured listing emission.
//!
//! Code is generated by recursive descent from each procedure's entry. The
//! walk carries the indentation level, the innermost active loop, a stack
//! of follows (nodes an enclosing construct will emit itself) and a stack
//! of goto targets (nodes that jumps into or out of a loop must reach by
//! an explicit goto). Output is collected as [`Chunk`]s so labels can be
//! back-patched when a later goto targets an earlier block.

use std::fmt::Write;

use log::{debug, warn};

use super::gotos::remove_redundant_gotos;
use crate::entity::EntityRef;
use crate::graph::{
    BlockKind, CondKind, Conditional, JumpKind, LoopInfo, LoopKind, NodeId, Procedure, Program,
    Structure, ELSE, THEN,
};
use crate::metrics::Metrics;
use crate::pipeline::OutputConfig;
use crate::source::Listing;

/// One piece of generated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Chunk {
    /// The label slot reserved in front of every emitted block.
    Label { order: usize, shown: bool },
    Goto { indent: usize, target: usize },
    /// A closing brace. Only braces closing a conditional let control fall
    /// straight through to what follows.
    Close { indent: usize, conditional: bool },
    Text(String),
}

impl Chunk {
    fn render(&self, out: &mut String) {
        match self {
            Chunk::Label { order, shown: true } => {
                let _ = writeln!(out, "L{order}:");
            }
            Chunk::Label { shown: false, .. } => {}
            Chunk::Goto { indent, target } => {
                let _ = writeln!(out, "{}goto L{target};", tabs(*indent));
            }
            Chunk::Close { indent, .. } => {
                let _ = writeln!(out, "{}}}", tabs(*indent));
            }
            Chunk::Text(text) => out.push_str(text),
        }
    }
}

fn tabs(indent: usize) -> String {
    "\t".repeat(indent)
}

/// The generated listing plus which blocks the walk reached.
#[derive(Debug, Clone, Default)]
pub struct CodeListing {
    pub text: String,
    /// Per procedure, indexed by node: whether code was generated for it.
    pub coverage: Vec<Vec<bool>>,
}

/// Generate the structured listing for every procedure of `program`.
pub fn emit_program(program: &Program, config: &OutputConfig, metrics: &mut Metrics) -> CodeListing {
    let mut listing = CodeListing::default();
    for proc in &program.procedures {
        let (text, generated) = emit_procedure(proc, &program.listing, config, metrics);
        listing.text.push_str(&text);
        listing.coverage.push(generated);
    }
    listing
}

/// Generate one procedure: `\nname()\n{\n` ... `}\n`.
pub fn emit_procedure(
    proc: &Procedure,
    listing: &Listing,
    config: &OutputConfig,
    metrics: &mut Metrics,
) -> (String, Vec<bool>) {
    let mut emitter = Emitter::new(proc, listing, config, metrics);
    emitter.write(proc.entry, 1, None);

    for (id, node) in proc.nodes.iter() {
        if !emitter.generated[id.index()] && node.kind != BlockKind::Return {
            warn!(
                "{}: no code was generated for block {} (order {})",
                proc.name, node.ident, node.order
            );
        }
    }

    let (mut chunks, generated) = emitter.finish();
    if config.remove_gotos {
        let removed = remove_redundant_gotos(&mut chunks);
        metrics.gotos -= removed.min(metrics.gotos);
        debug!("{}: removed {removed} gotos", proc.name);
    }

    let mut out = format!("\n{}()\n{{\n", proc.name);
    for chunk in &chunks {
        chunk.render(&mut out);
    }
    out.push_str("}\n");
    (out, generated)
}

/// The loop whose body is being emitted.
#[derive(Debug, Clone, Copy)]
struct ActiveLoop {
    header: NodeId,
    latch: NodeId,
}

struct Emitter<'a> {
    proc: &'a Procedure,
    listing: &'a Listing,
    config: &'a OutputConfig,
    metrics: &'a mut Metrics,
    chunks: Vec<Chunk>,
    generated: Vec<bool>,
    /// A goto targets the node, so its label must be shown.
    labelled: Vec<bool>,
    label_slot: Vec<Option<usize>>,
    /// Indentation the node's body was last written at.
    indent_at: Vec<usize>,
    follows: Vec<NodeId>,
    gotos: Vec<NodeId>,
}

impl<'a> Emitter<'a> {
    fn new(
        proc: &'a Procedure,
        listing: &'a Listing,
        config: &'a OutputConfig,
        metrics: &'a mut Metrics,
    ) -> Self {
        let n = proc.len();
        Self {
            proc,
            listing,
            config,
            metrics,
            chunks: Vec::new(),
            generated: vec![false; n],
            labelled: vec![false; n],
            label_slot: vec![None; n],
            indent_at: vec![0; n],
            follows: Vec::new(),
            gotos: Vec::new(),
        }
    }

    fn finish(self) -> (Vec<Chunk>, Vec<bool>) {
        (self.chunks, self.generated)
    }

    fn is_generated(&self, id: NodeId) -> bool {
        self.generated[id.index()]
    }

    /// Whether every forward predecessor of `id` has been emitted.
    fn all_parents_generated(&self, id: NodeId) -> bool {
        self.proc
            .node(id)
            .preds
            .iter()
            .all(|&p| self.proc.has_back_edge_to(p, id) || self.is_generated(p))
    }

    fn text(&mut self, text: String) {
        self.chunks.push(Chunk::Text(text));
    }

    /// Emit `id` and, through the structure it heads, everything it owns.
    fn write(&mut self, id: NodeId, indent: usize, active: Option<ActiveLoop>) {
        let proc = self.proc;

        if self.gotos.contains(&id)
            && !proc.is_latch(id)
            && (active.is_some_and(|a| proc.loop_follow_of(a.header) == Some(id))
                || !self.all_parents_generated(id))
        {
            self.emit_goto(id, id, indent);
            return;
        }
        if self.follows.contains(&id) {
            if self.follows.last() != Some(&id) {
                self.emit_goto(id, id, indent);
            }
            return;
        }
        if self.is_generated(id) {
            debug!(
                "{}: block {} reached again after it was emitted",
                proc.name,
                proc.node(id).ident
            );
            return;
        }
        self.generated[id.index()] = true;

        if proc.is_latch(id) {
            let head = active
                .map(|a| a.header)
                .or(proc.node(id).loop_head)
                .unwrap_or(id);
            let pre_tested = proc
                .loop_info(head)
                .is_some_and(|info| info.kind == LoopKind::PreTested);
            if indent == self.indent_at[head.index()] + usize::from(pre_tested) {
                self.write_block(id, indent);
            } else {
                self.generated[id.index()] = false;
                self.emit_goto(id, id, indent);
            }
            return;
        }

        match proc.node(id).structure {
            Structure::Loop(info) => self.write_loop(id, indent, active, info, None),
            Structure::LoopConditional(info, cond) => {
                self.write_loop(id, indent, active, info, Some(cond))
            }
            Structure::Conditional(cond) => self.write_conditional(id, indent, active, cond, false),
            Structure::Sequential => self.write_sequential(id, indent, active),
        }
    }

    fn write_loop(
        &mut self,
        id: NodeId,
        indent: usize,
        active: Option<ActiveLoop>,
        info: LoopInfo,
        cond: Option<Conditional>,
    ) {
        let proc = self.proc;
        if let Some(follow) = info.follow {
            self.follows.push(follow);
        }
        let inner = Some(ActiveLoop {
            header: id,
            latch: info.latch,
        });
        self.metrics.loops += 1;
        let pad = tabs(indent);

        match info.kind {
            LoopKind::PreTested => {
                self.write_block(id, indent);
                let negate = if Some(proc.succ(id, THEN)) == info.follow { "!" } else { "" };
                let op = self.condition(id);
                self.text(format!("{pad}while ({negate}{op})\n{pad}{{\n"));

                let body = if Some(proc.succ(id, ELSE)) == info.follow {
                    proc.succ(id, THEN)
                } else {
                    proc.succ(id, ELSE)
                };
                self.write(body, indent + 1, inner);
                self.finish_latch(info.latch, indent + 1);

                // The test is repeated at the bottom of the body.
                self.labelled[id.index()] = false;
                self.write_block(id, indent + 1);
                self.chunks.push(Chunk::Close {
                    indent,
                    conditional: false,
                });
            }
            LoopKind::PostTested | LoopKind::Endless => {
                if info.kind == LoopKind::Endless {
                    self.text(format!("{pad}for (;;) {{\n"));
                } else {
                    self.text(format!("{pad}do {{\n"));
                }

                match cond {
                    Some(cond) => self.write_conditional(id, indent + 1, inner, cond, true),
                    None => {
                        self.write_block(id, indent + 1);
                        self.write(proc.succ(id, 0), indent + 1, inner);
                    }
                }
                self.finish_latch(info.latch, indent + 1);

                if info.kind == LoopKind::PostTested {
                    let op = self.condition(info.latch);
                    self.text(format!("{pad}}} while ({op});\n"));
                } else {
                    self.chunks.push(Chunk::Close {
                        indent,
                        conditional: false,
                    });
                }
            }
        }

        if let Some(follow) = info.follow {
            self.follows.pop();
            if self.is_generated(follow) {
                self.emit_goto(id, follow, indent);
            } else {
                self.write(follow, indent, active);
            }
        }
    }

    /// Emit the latch body at the bottom of its loop if the walk never
    /// reached it.
    fn finish_latch(&mut self, latch: NodeId, indent: usize) {
        if !self.is_generated(latch) {
            self.generated[latch.index()] = true;
            self.write_block(latch, indent);
        }
    }

    fn write_conditional(
        &mut self,
        id: NodeId,
        indent: usize,
        active: Option<ActiveLoop>,
        cond: Conditional,
        loop_header: bool,
    ) {
        let proc = self.proc;
        let node = proc.node(id);
        let mut branch_follow: Option<NodeId> = None;
        let mut pushed_gotos = 0;

        if cond.kind == CondKind::Case {
            if let Some(follow) = cond.follow {
                self.follows.push(follow);
            }
        } else if let Some(follow) = cond.follow {
            match cond.jump {
                JumpKind::Structured => self.follows.push(follow),
                jump => {
                    if jump == JumpKind::JumpInOutLoop {
                        let own_head = if loop_header { Some(id) } else { node.loop_head };
                        self.gotos.push(follow);
                        pushed_gotos += 1;
                        if let Some(a) = active {
                            self.gotos.push(a.latch);
                            pushed_gotos += 1;
                        }
                        if let Some(head) = proc.node(follow).loop_head {
                            if Some(head) != own_head {
                                self.gotos.push(head);
                                pushed_gotos += 1;
                            }
                        }
                    }
                    let next = if cond.kind == CondKind::IfThen {
                        proc.succ(id, ELSE)
                    } else {
                        proc.succ(id, THEN)
                    };
                    branch_follow = Some(next);
                    if jump == JumpKind::JumpIntoCase {
                        self.follows.push(next);
                    }
                }
            }
        }

        self.write_block(id, indent);
        let pad = tabs(indent);

        if cond.kind == CondKind::Case {
            self.text(format!("{pad}switch (Reg0) {{\n"));
            self.metrics.multi_ways += 1;
            for (i, &succ) in node.succs.iter().enumerate() {
                self.text(format!("{pad}case cond_{i}:\n"));
                self.write_branch(id, succ, indent + 1, active);
                self.text(format!("{pad}\tbreak;\n"));
            }
        } else {
            let negate = if cond.kind == CondKind::IfElse { "!" } else { "" };
            let op = self.condition(id);
            self.text(format!("{pad}if ({negate}{op}) {{\n"));
            self.metrics.two_ways += 1;

            let first = proc.succ(id, if cond.kind == CondKind::IfElse { ELSE } else { THEN });
            let leaves_loop = node
                .loop_head
                .is_some_and(|h| proc.loop_follow_of(h) == Some(first));
            if leaves_loop {
                self.emit_goto(id, first, indent + 1);
            } else {
                self.write_branch(id, first, indent + 1, active);
            }

            if cond.kind == CondKind::IfThenElse {
                self.text(format!("{pad}}} else\n{pad}{{\n"));
                self.write_branch(id, proc.succ(id, ELSE), indent + 1, active);
            }
        }
        self.chunks.push(Chunk::Close {
            indent,
            conditional: true,
        });

        if let Some(follow) = cond.follow {
            match cond.jump {
                JumpKind::Structured | JumpKind::JumpIntoCase => {
                    self.follows.pop();
                }
                JumpKind::JumpInOutLoop => {
                    let keep = self.gotos.len() - pushed_gotos;
                    self.gotos.truncate(keep);
                }
            }
            let next = branch_follow.unwrap_or(follow);
            self.write_branch(id, next, indent, active);
        }
    }

    /// Emit `succ`, or a goto to it if it was already emitted.
    fn write_branch(&mut self, from: NodeId, succ: NodeId, indent: usize, active: Option<ActiveLoop>) {
        if self.is_generated(succ) {
            self.emit_goto(from, succ, indent);
        } else {
            self.write(succ, indent, active);
        }
    }

    fn write_sequential(&mut self, id: NodeId, indent: usize, active: Option<ActiveLoop>) {
        let proc = self.proc;
        self.write_block(id, indent);

        let node = proc.node(id);
        if node.kind == BlockKind::Return {
            self.text(format!("{}return;\n", tabs(indent)));
            return;
        }

        let child = proc.succ(id, 0);
        let next = proc.node(child);
        let other_scope = next.loop_head != node.loop_head
            && (!self.all_parents_generated(child) || self.follows.contains(&child));
        let is_loop_follow = active.is_some_and(|a| proc.loop_follow_of(a.header) == Some(child));
        let same_case = node.case_head == next.case_head
            || node
                .case_head
                .is_some_and(|h| proc.cond_follow_of(h) == Some(child));

        if self.is_generated(child) || other_scope || is_loop_follow || !same_case {
            self.emit_goto(id, child, indent);
        } else {
            self.write(child, indent, active);
        }
    }

    /// Write the label slot and the instructions of `id`, without the
    /// control transfer that ends it (calls are kept).
    fn write_block(&mut self, id: NodeId, indent: usize) {
        let (proc, listing) = (self.proc, self.listing);
        let node = proc.node(id);
        self.label_slot[id.index()] = Some(self.chunks.len());
        self.chunks.push(Chunk::Label {
            order: node.order,
            shown: self.labelled[id.index()],
        });
        self.metrics.reach_indent(indent);
        self.indent_at[id.index()] = indent;

        let pad = tabs(indent);
        let mut body = String::new();
        if self.config.blocks_only {
            let _ = writeln!(body, "{pad}BB{};", node.order);
        } else {
            for i in node.insts.clone() {
                if Some(i) == node.cti && node.kind != BlockKind::Call {
                    continue;
                }
                let _ = writeln!(body, "{pad}{}", listing.instructions[i].text);
            }
        }
        self.text(body);
    }

    /// Emit a jump from `from` to `dest`: a return for a bare return block,
    /// `continue`/`break` for the header or follow of the enclosing loop,
    /// otherwise a goto whose label is shown at (or back-patched into) the
    /// destination.
    fn emit_goto(&mut self, from: NodeId, dest: NodeId, indent: usize) {
        let proc = self.proc;
        let pad = tabs(indent);

        if proc.is_bare_return(dest) {
            let node = proc.node(dest);
            let listing = self.listing;
            let mut text = String::new();
            if !self.config.blocks_only {
                for i in node.insts.clone().skip(1) {
                    let _ = writeln!(text, "{pad}{}", listing.instructions[i].text);
                }
            }
            let _ = writeln!(text, "{pad}return;");
            self.text(text);
            return;
        }

        if let Some(head) = proc.node(from).loop_head {
            if head == dest || proc.loop_follow_of(head) == Some(dest) {
                let stmt = if head == dest { "continue;" } else { "break;" };
                self.text(format!("{pad}{stmt}\n"));
                self.metrics.continues_and_breaks += 1;
                return;
            }
        }

        self.chunks.push(Chunk::Goto {
            indent,
            target: proc.order_of(dest),
        });
        if !self.labelled[dest.index()] && self.is_generated(dest) {
            if let Some(slot) = self.label_slot[dest.index()] {
                if let Chunk::Label { shown, .. } = &mut self.chunks[slot] {
                    *shown = true;
                }
            }
        }
        self.labelled[dest.index()] = true;
        self.metrics.gotos += 1;
    }

    /// The mnemonic of the branch ending `id`.
    fn condition(&self, id: NodeId) -> &'a str {
        let listing = self.listing;
        self.proc
            .node(id)
            .cti
            .map_or("?", |c| listing.instructions[c].mnemonic.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PassPipeline;
    use crate::graph::testing::{program_with, Shape};
    use crate::pipeline::LoopStrategy;

    fn generate(shapes: &[Shape], config: &OutputConfig) -> (String, Metrics) {
        let mut program = program_with(shapes, LoopStrategy::Stamps);
        let mut metrics = Metrics::default();
        let pipeline = PassPipeline::for_strategy(LoopStrategy::Stamps);
        for proc in &mut program.procedures {
            pipeline.run(proc, &mut metrics).unwrap();
        }
        let code = emit_program(&program, config, &mut metrics);
        (code.text, metrics)
    }

    fn code(shapes: &[Shape]) -> (String, Metrics) {
        generate(shapes, &OutputConfig::default())
    }

    #[test]
    fn straight_line_has_no_gotos() {
        let (text, metrics) = code(&[Shape::Fall, Shape::Fall, Shape::Ret]);
        assert_eq!(
            text,
            "\nmain()\n{\n\tadd %o0, 0, %o0\n\tadd %o0, 1, %o0\n\trestore\n\treturn;\n}\n"
        );
        assert_eq!(metrics.gotos, 0);
        assert_eq!(metrics.max_indent, 1);
    }

    #[test]
    fn converging_branch_emits_join_once() {
        let (text, metrics) = code(&[Shape::Cond(2), Shape::Fall, Shape::Ret]);
        assert_eq!(
            text,
            "\nmain()\n{\n\tcmp %o0, 0\n\tnop\n\tif (!bne) {\n\t\tadd %o0, 1, %o0\n\t}\n\trestore\n\treturn;\n}\n"
        );
        assert_eq!(metrics.gotos, 0);
        assert_eq!(metrics.two_ways, 1);
    }

    #[test]
    fn back_edge_from_branch_is_do_while() {
        let (text, metrics) = code(&[Shape::Fall, Shape::Fall, Shape::Cond(0), Shape::Ret]);
        assert_eq!(
            text,
            "\nmain()\n{\n\tdo {\n\t\tadd %o0, 0, %o0\n\t\tadd %o0, 1, %o0\n\t\tcmp %o0, 2\n\t\tnop\n\t} while (bne);\n\trestore\n\treturn;\n}\n"
        );
        assert_eq!(metrics.loops, 1);
        assert_eq!(metrics.gotos, 0);
    }

    #[test]
    fn header_test_is_while_loop() {
        let (text, metrics) = code(&[Shape::Fall, Shape::Cond(3), Shape::Jump(1), Shape::Ret]);
        assert_eq!(
            text,
            "\nmain()\n{\n\tadd %o0, 0, %o0\n\tcmp %o0, 1\n\tnop\n\twhile (!bne)\n\t{\n\t\tnop\n\t\tcmp %o0, 1\n\t\tnop\n\t}\n\trestore\n\treturn;\n}\n"
        );
        assert_eq!(metrics.loops, 1);
        assert_eq!(metrics.max_indent, 2);
    }

    #[test]
    fn switch_arms_break_to_single_follow() {
        let (text, metrics) = code(&[
            Shape::Switch(vec![1, 2, 3]),
            Shape::Jump(4),
            Shape::Jump(4),
            Shape::Fall,
            Shape::Ret,
        ]);
        assert!(text.contains("\tswitch (Reg0) {\n"));
        assert_eq!(text.matches("case cond_").count(), 3);
        assert_eq!(text.matches("\t\tbreak;\n").count(), 3);
        assert_eq!(text.matches("restore").count(), 1);
        assert!(text.ends_with("\t}\n\trestore\n\treturn;\n}\n"));
        assert_eq!(metrics.multi_ways, 1);
        assert_eq!(metrics.gotos, 0);
    }

    #[test]
    fn exit_from_loop_body_is_break() {
        // 0 -> 1 (header); 2: if -> 5 else 3; 3 -> 4 -> 1; 5 -> 6 returns
        let (text, metrics) = code(&[
            Shape::Fall,
            Shape::Fall,
            Shape::Cond(5),
            Shape::Fall,
            Shape::Jump(1),
            Shape::Fall,
            Shape::Ret,
        ]);
        assert!(text.contains("\tfor (;;) {\n"));
        assert!(text.contains("\t\tif (bne) {\n\t\t\tbreak;\n\t\t}\n"));
        assert_eq!(metrics.continues_and_breaks, 1);
        assert_eq!(metrics.gotos, 0);
        // The loop follow comes after the loop, once.
        assert!(text.ends_with("\t}\n\tadd %o0, 5, %o0\n\trestore\n\treturn;\n}\n"));
    }

    #[test]
    fn jump_into_switch_arm_uses_back_patched_label() {
        // 0: if -> 3 else 1; 1: switch -> 2, 3; 2 -> 4; 3 -> 4; 4 returns
        let (text, metrics) = code(&[
            Shape::Cond(3),
            Shape::Switch(vec![2, 3]),
            Shape::Jump(4),
            Shape::Fall,
            Shape::Ret,
        ]);
        assert_eq!(metrics.gotos, 1);
        assert!(text.contains("L1:\n\t\tadd %o0, 3, %o0\n"));
        assert!(text.contains("\t\tgoto L1;\n"));
        let label = text.find("L1:").unwrap();
        let jump = text.find("goto L1;").unwrap();
        assert!(label < jump);
    }

    #[test]
    fn blocks_only_prints_block_orders() {
        let config = OutputConfig {
            blocks_only: true,
            ..OutputConfig::default()
        };
        let (text, _) = generate(&[Shape::Fall, Shape::Ret], &config);
        assert_eq!(text, "\nmain()\n{\n\tBB1;\n\tBB0;\n\treturn;\n}\n");
    }

    #[test]
    fn every_block_is_covered_in_structured_graphs() {
        let mut program = program_with(
            &[Shape::Fall, Shape::Cond(3), Shape::Jump(1), Shape::Ret],
            LoopStrategy::Stamps,
        );
        let mut metrics = Metrics::default();
        PassPipeline::for_strategy(LoopStrategy::Stamps)
            .run(&mut program.procedures[0], &mut metrics)
            .unwrap();
        let code = emit_program(&program, &OutputConfig::default(), &mut metrics);
        assert!(code.coverage[0].iter().all(|&g| g));
    }
}
