pub mod config;
pub mod session;

pub use config::{DebugConfig, LoopStrategy, OutputConfig, PipelineConfig};
pub use session::{Artifact, RunOutput, Session};
