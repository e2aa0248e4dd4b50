//! One run over one listing: parse, build, structure, emit.

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};

use super::config::PipelineConfig;
use crate::analysis::PassPipeline;
use crate::codegen::{backends_for, EmitContext};
use crate::error::{CoreError, Result};
use crate::graph::{build_program, ProcedureShape, Program};
use crate::metrics::Metrics;
use crate::source::{parse_listing, OpcodeTable};

/// A rendered output file, before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File extension without the dot (`hll` or `dot`).
    pub extension: String,
    pub text: String,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutput {
    pub program: Program,
    /// Rendered outputs, code first. Empty when structuring stopped early.
    pub artifacts: Vec<Artifact>,
    pub metrics: Metrics,
    /// Structuring stopped at `--dump-after`; nothing was emitted.
    pub stopped_early: bool,
}

impl RunOutput {
    pub fn artifact(&self, extension: &str) -> Option<&str> {
        self.artifacts
            .iter()
            .find(|a| a.extension == extension)
            .map(|a| a.text.as_str())
    }

    pub fn code(&self) -> Option<&str> {
        self.artifact("hll")
    }

    pub fn graph(&self) -> Option<&str> {
        self.artifact("dot")
    }

    pub fn shapes(&self) -> Vec<ProcedureShape> {
        self.program.procedures.iter().map(ProcedureShape::of).collect()
    }

    /// Write every artifact to `<stem>.<extension>`, returning the paths.
    pub fn write(&self, stem: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for artifact in &self.artifacts {
            let path = stem.with_extension(&artifact.extension);
            std::fs::write(&path, &artifact.text).map_err(|source| CoreError::Io {
                path: path.clone(),
                source,
            })?;
            info!("wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// Drives the pipeline for a fixed configuration.
pub struct Session {
    config: PipelineConfig,
    opcodes: OpcodeTable,
}

impl Session {
    /// Create a session, loading the opcode table named by the
    /// configuration (or the built-in SPARC table).
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let opcodes = match &config.opcodes {
            Some(path) => OpcodeTable::load(path)?,
            None => OpcodeTable::sparc(),
        };
        Ok(Self { config, opcodes })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run_file(&self, path: &Path) -> Result<RunOutput> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.run_source(&text, &path.display().to_string())
    }

    /// Run the whole pipeline over listing text. `file` is only used in
    /// diagnostics.
    pub fn run_source(&self, text: &str, file: &str) -> Result<RunOutput> {
        let mut metrics = Metrics::default();
        let strategy = self.config.strategy;

        let listing = parse_listing(text, file, &self.opcodes)?;
        let mut program = build_program(listing, strategy, &mut metrics)?;
        debug!(
            "{file}: {} procedures, {} nodes, {} edges",
            program.procedures.len(),
            metrics.graph_nodes,
            metrics.graph_edges
        );

        let pipeline = PassPipeline::for_strategy(strategy);
        let started = Instant::now();
        let mut stopped_early = false;
        for proc in &mut program.procedures {
            debug!("structuring {}", proc.name);
            stopped_early |= pipeline.run_with_debug(proc, &mut metrics, &self.config.debug)?;
        }
        metrics.structuring += started.elapsed();

        let mut artifacts = Vec::new();
        if !stopped_early {
            let mut ctx = EmitContext {
                output: &self.config.output,
                metrics: &mut metrics,
                coverage: None,
            };
            for backend in backends_for(&self.config.output) {
                let started = Instant::now();
                let text = backend.emit(&program, &mut ctx)?;
                if backend.extension() == "hll" {
                    ctx.metrics.code_generation += started.elapsed();
                }
                debug!("{}: {} bytes", backend.name(), text.len());
                artifacts.push(Artifact {
                    extension: backend.extension().to_string(),
                    text,
                });
            }
        }

        info!(
            "{file}: {} procedures structured ({} strategy), {} gotos",
            program.procedures.len(),
            strategy.name(),
            metrics.gotos
        );
        Ok(RunOutput {
            program,
            artifacts,
            metrics,
            stopped_early,
        })
    }
}
