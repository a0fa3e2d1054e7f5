//! Per-tick context shared by every hook during one tick.
//!
//! A [`TickContext`] is built fresh by [`Scheduler::begin_tick`] and consumed
//! by [`Scheduler::end_tick`]. It borrows the chunk store and the optional
//! external agent record for exactly one tick, so the borrow checker
//! guarantees no stepper retains a context past the tick that created it.
//!
//! Each stepper gets a statically-typed scratch slot ([`StepperSlot`]) keyed
//! by its identity (its state chunk key). Slots die with the context.
//!
//! [`Scheduler::begin_tick`]: crate::scheduler::Scheduler::begin_tick
//! [`Scheduler::end_tick`]: crate::scheduler::Scheduler::end_tick

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scheduler::Phase;
use crate::storage::ChunkStore;

/// The two scalar bias fields on an agent record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InterpretationBias {
    /// Exploration noise bias, in `[0, 1]`.
    #[serde(default)]
    pub distress: f64,
    /// Conflict bias derived from the bond threshold, in `[0, 1]`.
    #[serde(default)]
    pub bond: f64,
}

/// Externally owned agent record consumed by the genome stepper.
///
/// The core only reads `alive`, `hunger`, and `chi`, and only writes
/// `interpretation_bias` during a genome commit with the mutation gate open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Liveness flag; a dead agent's record is never mutated.
    #[serde(default = "default_alive")]
    pub alive: bool,
    /// Hunger level; read clamped to `[0, 1]`.
    #[serde(default)]
    pub hunger: f64,
    /// Resource quantity; read clamped to `[0, MAX]`.
    #[serde(default)]
    pub chi: f64,
    /// Bias map written by genome commits.
    #[serde(default)]
    pub interpretation_bias: InterpretationBias,
}

impl Default for AgentRecord {
    fn default() -> Self {
        Self {
            alive: true,
            hunger: 0.0,
            chi: 0.0,
            interpretation_bias: InterpretationBias::default(),
        }
    }
}

const fn default_alive() -> bool {
    true
}

/// Externally supplied input for one tick.
#[derive(Debug, Default)]
pub struct TickInput<'a> {
    /// Tick index.
    pub tick: u64,
    /// Delta time for this tick.
    pub dt: f64,
    /// Optional agent record, borrowed for the duration of the tick.
    pub agent: Option<&'a mut AgentRecord>,
}

impl<'a> TickInput<'a> {
    /// Input for tick `tick` with `dt = 1` and no agent.
    pub const fn new(tick: u64) -> Self {
        Self {
            tick,
            dt: 1.0,
            agent: None,
        }
    }

    /// Attach an agent record to this input.
    #[must_use]
    pub const fn with_agent(mut self, agent: &'a mut AgentRecord) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Override the delta time.
    #[must_use]
    pub const fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }
}

/// Typed per-stepper scratch area, composed of optional fields.
///
/// Each stepper fills in the fields it needs; everything starts as `None`
/// on a fresh context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepperSlot {
    /// Last phase this stepper completed in the current tick.
    pub phase: Option<Phase>,
    /// Mutation gate captured at compute time (genome steppers).
    pub mutation_gate: Option<bool>,
}

impl StepperSlot {
    /// Whether this stepper finished `compute` during the current tick.
    pub fn computed(&self) -> bool {
        self.phase == Some(Phase::Compute)
    }
}

/// Disjoint mutable views into a context, handed to one stepper phase.
#[derive(Debug)]
pub struct TickParts<'c> {
    /// Tick index.
    pub tick: u64,
    /// Delta time.
    pub dt: f64,
    /// The shared chunk store.
    pub store: &'c mut ChunkStore,
    /// The agent record, if one was supplied.
    pub agent: Option<&'c mut AgentRecord>,
    /// This stepper's scratch slot.
    pub slot: &'c mut StepperSlot,
}

/// Context shared by every hook for a single tick.
#[derive(Debug)]
pub struct TickContext<'a> {
    tick: u64,
    dt: f64,
    agent: Option<&'a mut AgentRecord>,
    store: &'a mut ChunkStore,
    slots: BTreeMap<String, StepperSlot>,
    phases: Vec<Phase>,
}

impl<'a> TickContext<'a> {
    /// Build a fresh context over `store` for `input`.
    pub fn new(input: TickInput<'a>, store: &'a mut ChunkStore) -> Self {
        Self {
            tick: input.tick,
            dt: input.dt,
            agent: input.agent,
            store,
            slots: BTreeMap::new(),
            phases: Vec::with_capacity(3),
        }
    }

    /// Tick index.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Delta time.
    pub const fn dt(&self) -> f64 {
        self.dt
    }

    /// Read access to the agent record, if any.
    pub fn agent(&self) -> Option<&AgentRecord> {
        self.agent.as_deref()
    }

    /// Mutable access to the agent record, if any.
    pub fn agent_mut(&mut self) -> Option<&mut AgentRecord> {
        self.agent.as_deref_mut()
    }

    /// Read access to the chunk store.
    pub fn store(&self) -> &ChunkStore {
        self.store
    }

    /// Mutable access to the chunk store.
    pub fn store_mut(&mut self) -> &mut ChunkStore {
        self.store
    }

    /// The scratch slot owned by `owner`, created on first access.
    pub fn slot(&mut self, owner: &str) -> &mut StepperSlot {
        self.slots.entry(owner.to_owned()).or_default()
    }

    /// The scratch slot owned by `owner`, if it was ever touched this tick.
    pub fn peek_slot(&self, owner: &str) -> Option<&StepperSlot> {
        self.slots.get(owner)
    }

    /// Number of steppers that touched their slot this tick.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Phases dispatched against this context so far, in order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub(crate) fn record_phase(&mut self, phase: Phase) {
        self.phases.push(phase);
    }

    /// Split the context into disjoint views for the stepper `owner`.
    pub fn parts(&mut self, owner: &str) -> TickParts<'_> {
        let slot = self.slots.entry(owner.to_owned()).or_default();
        TickParts {
            tick: self.tick,
            dt: self.dt,
            store: self.store,
            agent: self.agent.as_deref_mut(),
            slot,
        }
    }
}
