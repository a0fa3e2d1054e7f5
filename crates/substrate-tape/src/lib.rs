//! Tape machine stepper for the TC substrate.
//!
//! Machines are declared in JSON, compiled into transition tables and kept
//! in a [`MachineRegistry`]. A [`TapeStepper`] runs one registered machine
//! over a chunked tape, one transition per tick.
//!
//! # Modules
//!
//! - [`error`] -- [`TapeError`].
//! - [`machine`] -- descriptions, moves and compiled [`Machine`]s.
//! - [`registry`] -- the machine registry and bundled machines.
//! - [`stepper`] -- [`TapeStepper`].

pub mod error;
pub mod machine;
pub mod registry;
pub mod stepper;

pub use error::TapeError;
pub use machine::{Machine, MachineDescription, Move, TransitionSpec};
pub use registry::{MachineRegistry, RegisterOptions};
pub use stepper::{TapeOptions, TapeSnapshot, TapeState, TapeStepper};
