//! Sandbox infrastructure errors.
//!
//! These describe failures of the machinery around user code (scratch
//! directories, spawning, waiting). Executors convert them into `ERROR`
//! outcomes; they never cross the executor boundary.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to create workspace {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workspace path: {0}")]
    InvalidPath(String),

    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for child process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to serialize input: {0}")]
    Input(#[from] serde_json::Error),
}
