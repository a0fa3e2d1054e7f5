//! Genome bytecode VM for the TC substrate.
//!
//! A genome is a short program over five opcodes that reads an agent's
//! hunger and chi and stages interpretation biases for it.
//!
//! # Modules
//!
//! - [`opcode`] -- the opcode set and normalized [`Instruction`]s.
//! - [`program`] -- raw descriptors and their normalization into a
//!   [`Program`].
//! - [`initializers`] -- `empty` and seeded `random` programs.
//! - [`presets`] -- hand-authored programs selectable by key.
//! - [`stepper`] -- [`GenomeStepper`], the three-phase interpreter.

pub mod initializers;
pub mod opcode;
pub mod presets;
pub mod program;
pub mod stepper;

pub use initializers::{ProgramInitializer, RandomOptions};
pub use opcode::{Instruction, Opcode};
pub use presets::{PRESET_KEYS, preset};
pub use program::{Program, ProgramDescriptor, ProgramLimits, RawInstruction, normalize, normalize_value};
pub use stepper::{GenomeOptions, GenomeSnapshot, GenomeState, GenomeStepper};
