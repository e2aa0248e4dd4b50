use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading a listing, building its graphs, or
/// structuring them.
///
/// Input problems (`Io`, `Parse`, `UnresolvedLabel`, ...) point at the
/// offending line. Broken graph invariants are reported as `Structure`
/// with the procedure and block identity instead of aborting.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("line {line}: label '{label}' was not found")]
    UnresolvedLabel { label: String, line: usize },

    #[error("instruction at line {line} is not inside any procedure")]
    NoProcedure { line: usize },

    #[error("procedure '{procedure}' has no return block")]
    MissingReturn { procedure: String },

    #[error("procedure '{procedure}' has more than one return block (blocks {first} and {second})")]
    MultipleReturns {
        procedure: String,
        first: u32,
        second: u32,
    },

    #[error("block {block} falls through past the end of the listing")]
    FallsOffEnd { block: u32 },

    #[error("block {from} in '{procedure}' transfers control to block {to} of another procedure")]
    CrossProcedureEdge {
        procedure: String,
        from: u32,
        to: u32,
    },

    #[error("procedure '{procedure}', block {block}: {message}")]
    Structure {
        procedure: String,
        block: u32,
        message: String,
    },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
