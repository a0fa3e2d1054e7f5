//! Error types for the substrate host.
//!
//! [`HostError`] wraps every failure the runtime manager and the headless
//! driver can hit. None of them arise inside a tick.

use std::path::PathBuf;

/// Top-level error for the host library and the `substrate-headless` binary.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: substrate_core::config::ConfigError,
    },

    /// Loading a tape machine or building a tape stepper failed.
    #[error("tape error: {source}")]
    Tape {
        /// The underlying tape error.
        #[from]
        source: substrate_tape::TapeError,
    },

    /// The run file is not valid YAML for a headless run.
    #[error("failed to parse run file: {source}")]
    RunFile {
        /// The underlying YAML error.
        source: serde_yml::Error,
    },

    /// A genome preset key matched nothing.
    #[error("unknown genome preset: {name}")]
    UnknownPreset {
        /// The requested key.
        name: String,
    },

    /// A snapshot or record could not be serialized.
    #[error("serialization error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl From<serde_yml::Error> for HostError {
    fn from(source: serde_yml::Error) -> Self {
        Self::RunFile { source }
    }
}
