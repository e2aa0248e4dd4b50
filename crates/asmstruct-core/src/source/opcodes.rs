//! Mnemonic classification.
//!
//! The table maps mnemonics to [`InstKind`]s and records how many delay-slot
//! instructions follow a control transfer. A custom table is a JSON file:
//!
//! ```json
//! {
//!   "delay_slots": 1,
//!   "kinds": { "bne": "branch", "ba": "jump", "jmp": "multi-way",
//!              "call": "call", "ret": "return" }
//! }
//! ```
//!
//! Mnemonics not in the table are [`InstKind::Plain`]. A mnemonic with a
//! comma suffix (`bne,a`) falls back to its base (`bne`) when the full form
//! is not listed.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::InstKind;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcodeTable {
    #[serde(default)]
    pub delay_slots: usize,
    pub kinds: BTreeMap<String, InstKind>,
}

/// SPARC integer and floating-point conditional branches.
const SPARC_BRANCHES: &[&str] = &[
    "bne", "be", "bg", "ble", "bge", "bl", "bgu", "bleu", "bcc", "bcs", "bpos", "bneg", "bvc",
    "bvs", "bnz", "bz", "bgeu", "blu", "fbu", "fbg", "fbug", "fbl", "fbul", "fblg", "fbne", "fbe",
    "fbue", "fbge", "fbuge", "fble", "fbule", "fbo",
];

impl OpcodeTable {
    /// The built-in table for SPARC V8 listings produced by `gcc -S`.
    pub fn sparc() -> Self {
        let mut kinds = BTreeMap::new();
        for m in SPARC_BRANCHES {
            kinds.insert((*m).to_string(), InstKind::Branch);
        }
        for m in ["ba", "b", "fba"] {
            kinds.insert(m.to_string(), InstKind::Jump);
        }
        kinds.insert("jmp".to_string(), InstKind::MultiWay);
        kinds.insert("call".to_string(), InstKind::Call);
        for m in ["ret", "retl"] {
            kinds.insert(m.to_string(), InstKind::Return);
        }
        Self {
            delay_slots: 1,
            kinds,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::Config {
            message: format!("opcode table: {e}"),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn classify(&self, mnemonic: &str) -> InstKind {
        if let Some(kind) = self.kinds.get(mnemonic) {
            return *kind;
        }
        match mnemonic.split_once(',') {
            Some((base, _)) => self.kinds.get(base).copied().unwrap_or(InstKind::Plain),
            None => InstKind::Plain,
        }
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::sparc()
    }
}
