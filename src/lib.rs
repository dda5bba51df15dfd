pub mod annotation;
pub mod bio;
pub mod cli;
pub mod core;
pub mod tools;
pub mod utils;

pub use crate::annotation::{AnnotationMapping, GoTerm};
pub use crate::core::orchestrator::{Orchestrator, RunReport, RunStatus};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MashtError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Malformed annotation source {path:?}: {reason}")]
    MalformedAnnotation { path: PathBuf, reason: String },

    #[error("Failed to write partition '{partition}': {reason}")]
    Aggregation { partition: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("External tool error: {0}")]
    Tool(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MashtError>;

impl From<serde_json::Error> for MashtError {
    fn from(err: serde_json::Error) -> Self {
        MashtError::Parse(err.to_string())
    }
}
