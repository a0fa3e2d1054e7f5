//! The capture/compute/commit contract every pluggable module implements.
//!
//! - `capture` resets the stepper's staging buffer and may emit a pre-step
//!   snapshot through its capture callback.
//! - `compute` derives the next state into the buffer as a pure function of
//!   current state and context. It never mutates current state and is
//!   idempotent within a tick.
//! - `commit` publishes the buffer into current state. It is the only phase
//!   allowed to touch externally owned records, and only behind the
//!   record's mutation gate.

use crate::context::TickContext;
use crate::snapshot::Snapshot;
use crate::storage::ChunkStore;

/// A pluggable deterministic state machine driven by the scheduler.
pub trait Stepper {
    /// Snapshot record this stepper produces.
    type Snapshot: Snapshot;

    /// Identity of this stepper instance (its state chunk key). Used to key
    /// the stepper's scratch slot in the tick context.
    fn id(&self) -> &str;

    /// Reset staging and optionally report the pre-step state.
    fn capture(&mut self, ctx: &mut TickContext<'_>);

    /// Stage the next state.
    fn compute(&mut self, ctx: &mut TickContext<'_>);

    /// Publish the staged state.
    fn commit(&mut self, ctx: &mut TickContext<'_>);

    /// Describe the stepper's state as of `tick`.
    fn build_snapshot(&self, store: &ChunkStore, tick: u64) -> Self::Snapshot;
}
