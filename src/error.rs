//! Error taxonomy for the harness.
//!
//! Invocation and parse failures are normally recorded inline on a result
//! rather than returned; the variants still give them one canonical message.
//! Only [`HarnessError::EngineNotFound`] and [`HarnessError::EmptyCorpus`]
//! are fatal to a whole run.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors produced while measuring the engine.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("engine executable not found: {}", .0.display())]
    EngineNotFound(PathBuf),

    #[error("no test repositories found in {}", .0.display())]
    EmptyCorpus(PathBuf),

    #[error("{op} timed out after {}s", .timeout.as_secs_f64())]
    InvocationTimeout { op: String, timeout: Duration },

    #[error("{op} failed: {output}")]
    InvocationFailure { op: String, output: String },

    #[error("could not recover {expected} from engine output")]
    ParseFailure { expected: String },

    #[error("restoration of {} incomplete: {reason}", .path.display())]
    RestorationFailure { path: PathBuf, reason: String },

    #[error("invalid workload descriptor {}: {reason}", .path.display())]
    Workload { path: PathBuf, reason: String },

    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Whether this error must terminate the run before any report is written.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EngineNotFound(_) | Self::EmptyCorpus(_))
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
