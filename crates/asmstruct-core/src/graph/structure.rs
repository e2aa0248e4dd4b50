//! Structural classification of a node.
//!
//! Each variant carries exactly the facts that are valid for it, so a loop
//! kind cannot be read from a plain conditional and a conditional follow
//! cannot be read from a sequential block.

use serde::Serialize;

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopKind {
    /// `while (cond) { .. }`: the header tests, the latch jumps back.
    PreTested,
    /// `do { .. } while (cond)`: the latch tests.
    PostTested,
    /// `for (;;) { .. }`: exits, if any, are jumps out of the body.
    Endless,
}

impl LoopKind {
    pub fn name(self) -> &'static str {
        match self {
            LoopKind::PreTested => "preTest",
            LoopKind::PostTested => "postTest",
            LoopKind::Endless => "endless",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CondKind {
    /// Only the THEN branch is emitted; ELSE is the follow.
    IfThen,
    IfThenElse,
    /// Only the ELSE branch is emitted (with a negated test); THEN is the follow.
    IfElse,
    Case,
}

impl CondKind {
    pub fn name(self) -> &'static str {
        match self {
            CondKind::IfThen => "if-then",
            CondKind::IfThenElse => "if-then-else",
            CondKind::IfElse => "if-else",
            CondKind::Case => "case",
        }
    }
}

/// How a two-way conditional relates to the loop and switch bodies around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum JumpKind {
    #[default]
    Structured,
    JumpInOutLoop,
    JumpIntoCase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopInfo {
    pub latch: NodeId,
    pub kind: LoopKind,
    pub follow: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conditional {
    pub kind: CondKind,
    pub follow: Option<NodeId>,
    pub jump: JumpKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Structure {
    #[default]
    Sequential,
    Conditional(Conditional),
    Loop(LoopInfo),
    /// A loop header whose own branch is also emitted as a conditional.
    LoopConditional(LoopInfo, Conditional),
}

impl Structure {
    pub fn loop_info(&self) -> Option<&LoopInfo> {
        match self {
            Structure::Loop(info) | Structure::LoopConditional(info, _) => Some(info),
            _ => None,
        }
    }

    pub fn conditional(&self) -> Option<&Conditional> {
        match self {
            Structure::Conditional(cond) | Structure::LoopConditional(_, cond) => Some(cond),
            _ => None,
        }
    }

    pub fn conditional_mut(&mut self) -> Option<&mut Conditional> {
        match self {
            Structure::Conditional(cond) | Structure::LoopConditional(_, cond) => Some(cond),
            _ => None,
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Structure::Conditional(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Structure::Sequential => "seq",
            Structure::Conditional(_) => "cond",
            Structure::Loop(_) => "loop",
            Structure::LoopConditional(..) => "loopCond",
        }
    }
}
