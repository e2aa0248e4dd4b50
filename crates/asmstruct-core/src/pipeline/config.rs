use std::path::PathBuf;

use crate::error::{CoreError, Result};

/// Which artifacts are produced and what the graph output annotates.
///
/// Everything is off by default. Use [`OutputConfig::from_flags`] to read
/// the single-letter flag string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Write the structured listing (`.hll`).
    pub generate_code: bool,
    /// Write the graph description (`.dot`).
    pub generate_graph: bool,
    /// Annotate graph nodes with structure, loop and conditional kinds and
    /// their follows.
    pub show_structure_info: bool,
    pub show_post_dominators: bool,
    /// Annotate graph nodes with their loop head and case head.
    pub show_heads: bool,
    pub show_reverse_order: bool,
    /// Emit block identifiers and control constructs only, no instructions.
    pub blocks_only: bool,
    /// Delete gotos that only jump over closing braces, then drop unused
    /// labels.
    pub remove_gotos: bool,
}

impl OutputConfig {
    /// Parse a flag string such as `"cdsp"`:
    ///
    /// - `c`: generate code
    /// - `d`: generate graph
    /// - `s`, `p`, `h`, `r`: graph annotations (each implies `d`)
    /// - `b`: blocks only (implies `c`)
    /// - `g`: remove gotos (implies `c`)
    ///
    /// A leading `-` is ignored.
    pub fn from_flags(flags: &str) -> Result<Self> {
        let mut config = Self::default();
        for flag in flags.trim_start_matches('-').chars() {
            match flag {
                'c' => config.generate_code = true,
                'd' => config.generate_graph = true,
                's' => config.show_structure_info = true,
                'p' => config.show_post_dominators = true,
                'h' => config.show_heads = true,
                'r' => config.show_reverse_order = true,
                'b' => config.blocks_only = true,
                'g' => config.remove_gotos = true,
                other => {
                    return Err(CoreError::Config {
                        message: format!("unknown flag '{other}' (expected one of cdsphrbg)"),
                    })
                }
            }
        }
        Ok(config.normalized())
    }

    /// Apply the implications between flags.
    pub fn normalized(mut self) -> Self {
        if self.show_structure_info
            || self.show_post_dominators
            || self.show_heads
            || self.show_reverse_order
        {
            self.generate_graph = true;
        }
        if self.blocks_only || self.remove_gotos {
            self.generate_code = true;
        }
        self
    }
}

/// How loops are found. Chosen once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopStrategy {
    /// Loop stamps from two depth-first traversals.
    #[default]
    Stamps,
    /// Intervals of the derived sequence.
    Intervals,
}

impl LoopStrategy {
    /// Whether the mirrored traversal is needed for ancestor queries.
    pub fn uses_stamps(self) -> bool {
        self == LoopStrategy::Stamps
    }

    pub fn name(self) -> &'static str {
        match self {
            LoopStrategy::Stamps => "stamps",
            LoopStrategy::Intervals => "intervals",
        }
    }
}

/// Configuration for debug dumps during structuring.
///
/// When `dump_after` is set, each procedure's shape is dumped to stderr
/// after the named pass, and structuring stops there.
#[derive(Debug, Clone, Default)]
pub struct DebugConfig {
    /// Stop after the named pass and dump the procedure shape. See
    /// [`crate::analysis::PASS_NAMES`] for the accepted values.
    pub dump_after: Option<String>,
    /// Restrict dumps to procedures whose name contains this string,
    /// ignoring case.
    pub procedure_filter: Option<String>,
}

impl DebugConfig {
    /// Whether procedure `name` passes the filter. Everything passes when
    /// no filter is set.
    pub fn should_dump(&self, name: &str) -> bool {
        self.procedure_filter
            .as_deref()
            .map_or(true, |filter| name.to_lowercase().contains(&filter.to_lowercase()))
    }
}

/// Everything a [`crate::pipeline::Session`] needs besides the input.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub output: OutputConfig,
    pub strategy: LoopStrategy,
    /// Opcode table to load instead of the built-in SPARC table.
    pub opcodes: Option<PathBuf>,
    pub debug: DebugConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_produces_nothing() {
        let config = OutputConfig::default();
        assert!(!config.generate_code);
        assert!(!config.generate_graph);
        assert!(!config.remove_gotos);
    }

    #[test]
    fn annotations_imply_graph() {
        for flag in ["s", "p", "h", "r"] {
            let config = OutputConfig::from_flags(flag).unwrap();
            assert!(config.generate_graph, "{flag}");
            assert!(!config.generate_code, "{flag}");
        }
    }

    #[test]
    fn blocks_only_implies_code() {
        let config = OutputConfig::from_flags("-b").unwrap();
        assert!(config.blocks_only);
        assert!(config.generate_code);
        assert!(!config.generate_graph);
    }

    #[test]
    fn all_flags() {
        let config = OutputConfig::from_flags("cdsphrbg").unwrap();
        assert_eq!(
            config,
            OutputConfig {
                generate_code: true,
                generate_graph: true,
                show_structure_info: true,
                show_post_dominators: true,
                show_heads: true,
                show_reverse_order: true,
                blocks_only: true,
                remove_gotos: true,
            }
        );
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = OutputConfig::from_flags("cx").unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn strategy_defaults_to_stamps() {
        assert_eq!(LoopStrategy::default(), LoopStrategy::Stamps);
        assert!(LoopStrategy::Stamps.uses_stamps());
        assert!(!LoopStrategy::Intervals.uses_stamps());
    }

    fn filtered(filter: &str) -> DebugConfig {
        DebugConfig {
            dump_after: None,
            procedure_filter: Some(filter.to_string()),
        }
    }

    #[test]
    fn should_dump_without_filter() {
        assert!(DebugConfig::default().should_dump("anything"));
    }

    #[test]
    fn should_dump_substring_and_case() {
        assert!(filtered("sort").should_dump("qsort_inner"));
        assert!(filtered("SORT").should_dump("qsort_inner"));
        assert!(!filtered("merge").should_dump("qsort_inner"));
    }
}
