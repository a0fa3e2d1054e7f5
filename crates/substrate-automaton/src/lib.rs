//! Rule 110 cellular automaton for the TC substrate.
//!
//! # Modules
//!
//! - [`initializers`] -- `ether`, `glider` and `random` starting rows with
//!   provenance.
//! - [`stepper`] -- [`Rule110Stepper`], the double-buffered stepper.
//!
//! [`Rule110Stepper`]: stepper::Rule110Stepper

pub mod initializers;
pub mod stepper;

pub use initializers::{InitOptions, Initializer, Seeded};
pub use stepper::{Rule110Options, Rule110Snapshot, Rule110Stepper};
