use serde::{Deserialize, Serialize};

/// Control-transfer category of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstKind {
    /// Not a control transfer.
    Plain,
    /// Two-way conditional branch.
    Branch,
    /// Unconditional jump to a single label.
    Jump,
    /// Indirect jump through a table of labels (switch dispatch).
    MultiWay,
    /// Procedure call; control resumes at the next instruction.
    Call,
    /// Procedure return.
    Return,
}

impl InstKind {
    /// Whether an instruction of this kind terminates its basic block.
    pub fn ends_block(self) -> bool {
        !matches!(self, InstKind::Plain)
    }

    /// Whether the operand is a single branch label.
    pub fn has_branch_target(self) -> bool {
        matches!(self, InstKind::Branch | InstKind::Jump)
    }
}

/// One classified instruction of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Instruction text with leading whitespace removed.
    pub text: String,
    pub mnemonic: String,
    pub kind: InstKind,
    /// 1-based source line.
    pub line: usize,
    /// Procedure-entry label at this instruction, if any.
    pub proc_label: Option<String>,
    /// Local (non-procedure) labels at this instruction.
    pub labels: Vec<String>,
    /// Resolved target of a branch or jump.
    pub branch_target: Option<usize>,
    /// Resolved targets of a multi-way jump, in operand order, deduplicated.
    pub jump_targets: Vec<usize>,
}

impl Instruction {
    /// Whether a block must start at this instruction.
    pub fn is_labelled(&self) -> bool {
        self.proc_label.is_some() || !self.labels.is_empty()
    }
}

/// The parsed instruction stream for one input file.
#[derive(Debug, Clone)]
pub struct Listing {
    pub file: String,
    pub instructions: Vec<Instruction>,
    /// Instruction count declared by the header, which is what statistics
    /// report even when the body disagrees.
    pub declared_instructions: usize,
    /// Number of delay-slot instructions that follow every control transfer.
    pub delay_slots: usize,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
