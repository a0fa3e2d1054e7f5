//! Error types for the substrate-tape crate.
//!
//! Errors only arise at the edges: compiling a machine description,
//! registering it, and resolving a machine id when a stepper is built. The
//! tick path itself never fails; a missing transition halts the machine.

use std::path::PathBuf;

/// Errors that can occur while loading machines or building tape steppers.
#[derive(Debug, thiserror::Error)]
pub enum TapeError {
    /// The description has an empty `id`.
    #[error("machine description has an empty id")]
    EmptyId,

    /// The description has an empty `initial_state`.
    #[error("machine {id} has an empty initial state")]
    EmptyInitialState {
        /// Machine id.
        id: String,
    },

    /// Two transitions share the same `(state, read)` pair.
    #[error("machine {id} defines more than one transition for state {state:?} reading {read}")]
    DuplicateTransition {
        /// Machine id.
        id: String,
        /// Source state of the duplicated pair.
        state: String,
        /// Read symbol of the duplicated pair.
        read: u8,
    },

    /// A machine with this id is already registered and `overwrite` was not
    /// requested.
    #[error("machine {id} is already registered")]
    AlreadyRegistered {
        /// Machine id.
        id: String,
    },

    /// No machine is registered under this id.
    #[error("unknown machine: {id}")]
    UnknownMachine {
        /// Requested machine id.
        id: String,
    },

    /// A machine description file could not be read.
    #[error("failed to read machine file {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A machine description is not valid JSON for the expected shape.
    #[error("invalid machine description: {0}")]
    Json(#[from] serde_json::Error),
}
