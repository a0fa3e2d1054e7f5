//! Host-side drivers for the TC substrate.
//!
//! # Modules
//!
//! - [`error`] -- [`HostError`], the error type for everything in this crate.
//! - [`runtime`] -- [`RuntimeManager`], which keeps a Rule 110 stepper in
//!   line with [`SubstrateConfig`] and drives one tick per host frame.
//! - [`headless`] -- [`HeadlessRun`], the fixed-length golden-hash driver
//!   behind the `substrate-headless` binary.
//!
//! [`HostError`]: error::HostError
//! [`RuntimeManager`]: runtime::RuntimeManager
//! [`HeadlessRun`]: headless::HeadlessRun
//! [`SubstrateConfig`]: substrate_core::config::SubstrateConfig

pub mod error;
pub mod headless;
pub mod runtime;

pub use error::HostError;
pub use headless::{HashRecord, HeadlessRun, StepperKind, write_ndjson};
pub use runtime::{Rule110Spec, RuntimeManager};
