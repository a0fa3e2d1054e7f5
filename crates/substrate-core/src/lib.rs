//! Deterministic, phase-ordered simulation kernel for the TC substrate.
//!
//! Given a fixed seed and a fixed sequence of per-tick inputs, every stepper
//! driven through this crate produces bit-for-bit reproducible state
//! transitions that can be verified with content hashes.
//!
//! # Modules
//!
//! - [`seed`] -- 32-bit seed mixer deriving independent subsystem seeds.
//! - [`rng`] -- Mulberry32 generator used by seeded initializers.
//! - [`storage`] -- [`ChunkStore`], the keyed store of lazily-materialized
//!   chunks.
//! - [`context`] -- [`TickContext`], the per-tick context with typed
//!   per-stepper slots.
//! - [`scheduler`] -- [`Scheduler`], the hook registry and three-phase tick
//!   dispatch.
//! - [`stepper`] -- [`Stepper`], the capture/compute/commit contract.
//! - [`snapshot`] -- Snapshot provenance and callback types.
//! - [`hash`] -- SHA-256 content hashes for golden records.
//! - [`config`] -- Configuration loading from `substrate-config.yaml`.
//!
//! [`ChunkStore`]: storage::ChunkStore
//! [`TickContext`]: context::TickContext
//! [`Scheduler`]: scheduler::Scheduler
//! [`Stepper`]: stepper::Stepper

pub mod config;
pub mod context;
pub mod hash;
pub mod rng;
pub mod scheduler;
pub mod seed;
pub mod snapshot;
pub mod stepper;
pub mod storage;

pub use context::{AgentRecord, InterpretationBias, StepperSlot, TickContext, TickInput, TickParts};
pub use rng::Mulberry32;
pub use scheduler::{FnHooks, HookId, Phase, Registration, Scheduler, SchedulerConfig, TickHooks, TickReport};
pub use seed::mix_seed;
pub use snapshot::{Callbacks, Metadata, Provenance, Snapshot, SnapshotCallback, SnapshotEvent};
pub use stepper::Stepper;
pub use storage::{ChunkOptions, ChunkStore};
