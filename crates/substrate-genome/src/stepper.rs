//! The Genome VM stepper.
//!
//! State, staging buffer and normalized program live in three chunks. One
//! instruction executes per tick:
//!
//! - `capture` resets the buffer from the current state.
//! - `compute` executes the instruction under the ip against the agent
//!   record and stages next-ip, halted and bias updates. It never touches
//!   the state chunk or the agent.
//! - `commit` publishes the staged ip and halted flag and, only if the
//!   mutation gate recorded at compute time is open, copies each staged bias
//!   into the agent record.

use serde::Serialize;
use serde_json::{Value, json};
use substrate_core::context::TickContext;
use substrate_core::scheduler::{Phase, Registration, Scheduler};
use substrate_core::snapshot::{Callbacks, Metadata, Provenance, Snapshot};
use substrate_core::stepper::Stepper;
use substrate_core::storage::{ChunkOptions, ChunkStore};
use tracing::{debug, warn};

use crate::opcode::Instruction;
use crate::program::{Program, ProgramDescriptor, ProgramLimits, RawInstruction, clamp, clamp01, normalize};

/// Snapshot type tag.
pub const SNAPSHOT_KIND: &str = "tc.genome.snapshot";

/// Default chunk key of the VM state.
pub const DEFAULT_STATE_KEY: &str = "tc.genome.state";

/// Default chunk key of the staging buffer.
pub const DEFAULT_BUFFER_KEY: &str = "tc.genome.buffer";

/// Default chunk key of the normalized program.
pub const DEFAULT_PROGRAM_KEY: &str = "tc.genome.program";

/// Persistent VM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenomeState {
    /// Instruction pointer; a valid index whenever the program is non-empty.
    pub ip: usize,
    /// Terminal flag.
    pub halted: bool,
    /// Last tick whose commit was applied.
    pub last_tick: Option<u64>,
}

impl Default for GenomeState {
    fn default() -> Self {
        Self {
            ip: 0,
            halted: true,
            last_tick: None,
        }
    }
}

/// The instruction executed during a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Executed {
    /// Position of the instruction.
    pub index: usize,
    /// Opcode name.
    pub op: &'static str,
    /// Normalized arguments.
    pub args: Vec<Value>,
}

/// Sparse bias updates staged for the agent record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BiasUpdates {
    /// Staged exploration bias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distress: Option<f64>,
    /// Staged conflict bias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bond: Option<f64>,
}

impl BiasUpdates {
    /// Whether nothing is staged.
    pub const fn is_empty(&self) -> bool {
        self.distress.is_none() && self.bond.is_none()
    }
}

/// Staged next state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenomeBuffer {
    /// The ip the staged step started from.
    pub ip_current: usize,
    /// Staged ip. May be one past the end, in which case `halted` is set.
    pub next_ip: usize,
    /// Staged halted flag.
    pub halted: bool,
    /// Instruction executed this tick.
    pub executed: Option<Executed>,
    /// Staged bias updates.
    pub bias_updates: BiasUpdates,
}

impl GenomeBuffer {
    fn reset(&mut self, state: &GenomeState) {
        *self = Self {
            ip_current: state.ip,
            next_ip: state.ip,
            halted: state.halted,
            ..Self::default()
        };
    }
}

/// Genome snapshot record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenomeSnapshot {
    /// Always [`SNAPSHOT_KIND`].
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Tick described.
    pub tick: u64,
    /// Current ip.
    pub ip: usize,
    /// Staged ip.
    pub next_ip: usize,
    /// Halted in either the state or the buffer.
    pub halted: bool,
    /// Normalized program.
    pub program: Program,
    /// Instruction executed this tick, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed: Option<Executed>,
    /// Staged bias updates, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bias_updates: Option<BiasUpdates>,
    /// Origin tag of the loaded program.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Manifest key of the loaded preset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_key: Option<String>,
    /// Descriptive metadata, omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Snapshot for GenomeSnapshot {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    fn manifest_key(&self) -> Option<&str> {
        self.manifest_key.as_deref()
    }

    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    fn summary(&self) -> Value {
        json!({
            "ip": self.ip,
            "halted": self.halted,
            "length": self.program.len(),
            "op": self.executed.as_ref().map(|executed| executed.op),
        })
    }
}

/// Construction options.
#[derive(Debug)]
pub struct GenomeOptions {
    /// Chunk key of the VM state.
    pub state_key: String,
    /// Chunk key of the staging buffer.
    pub buffer_key: String,
    /// Chunk key of the normalized program.
    pub program_key: String,
    /// Program loaded at construction.
    pub source: Option<ProgramDescriptor>,
    /// Normalization ranges; also bounds the chi read from the agent.
    pub limits: ProgramLimits,
    /// Initial provenance, merged with the source's.
    pub provenance: Provenance,
    /// Whether to load `source` at construction. When `false` the stepper
    /// adopts whatever chunks are already stored.
    pub initialize: bool,
    /// Observability callbacks.
    pub callbacks: Callbacks<GenomeSnapshot>,
}

impl Default for GenomeOptions {
    fn default() -> Self {
        Self {
            state_key: DEFAULT_STATE_KEY.to_owned(),
            buffer_key: DEFAULT_BUFFER_KEY.to_owned(),
            program_key: DEFAULT_PROGRAM_KEY.to_owned(),
            source: None,
            limits: ProgramLimits::default(),
            provenance: Provenance::default(),
            initialize: true,
            callbacks: Callbacks::default(),
        }
    }
}

impl GenomeOptions {
    /// Options loading `source`, everything else defaulted.
    pub fn with_source(source: ProgramDescriptor) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// Namespace the chunk keys under `prefix`.
    #[must_use]
    pub fn keyed(mut self, prefix: &str) -> Self {
        self.state_key = format!("{prefix}.state");
        self.buffer_key = format!("{prefix}.buffer");
        self.program_key = format!("{prefix}.program");
        self
    }
}

/// The Genome VM stepper.
#[derive(Debug)]
pub struct GenomeStepper {
    state_key: String,
    buffer_key: String,
    program_key: String,
    limits: ProgramLimits,
    provenance: Provenance,
    callbacks: Callbacks<GenomeSnapshot>,
}

impl GenomeStepper {
    /// Create a stepper over `store`, materializing its chunks and loading
    /// `options.source` unless `options.initialize` is false.
    pub fn new(options: GenomeOptions, store: &mut ChunkStore) -> Self {
        let mut stepper = Self {
            state_key: options.state_key,
            buffer_key: options.buffer_key,
            program_key: options.program_key,
            limits: options.limits,
            provenance: options.provenance,
            callbacks: options.callbacks,
        };
        stepper.ensure(store);
        if options.initialize
            && let Some(source) = options.source
        {
            stepper.apply_descriptor(store, source);
        }
        stepper
    }

    /// Create a stepper and register it with `scheduler`.
    pub fn register(
        scheduler: &mut Scheduler,
        store: &mut ChunkStore,
        options: GenomeOptions,
    ) -> Registration<Self> {
        scheduler.register_stepper(Self::new(options, store))
    }

    fn ensure(&self, store: &mut ChunkStore) {
        let state = *store.ensure_chunk(&self.state_key, |_| GenomeState::default());
        store.ensure_chunk(&self.buffer_key, |_| {
            let mut buffer = GenomeBuffer::default();
            buffer.reset(&state);
            buffer
        });
        store.ensure_chunk(&self.program_key, |_| Program::empty());
    }

    /// Normalize and load `raw`, resetting the VM to ip 0. Returns the
    /// normalized program.
    pub fn set_program(
        &mut self,
        store: &mut ChunkStore,
        raw: &[RawInstruction],
        provenance: Option<Provenance>,
    ) -> Program {
        let program = normalize(raw, self.limits);
        debug!(
            key = %self.program_key,
            supplied = raw.len(),
            kept = program.len(),
            "loading genome program"
        );
        let state = GenomeState {
            ip: 0,
            halted: program.is_empty(),
            last_tick: None,
        };
        store.set_chunk(self.program_key.clone(), program.clone(), ChunkOptions::clean());
        store.set_chunk(self.state_key.clone(), state, ChunkOptions::dirty());
        let mut buffer = GenomeBuffer::default();
        buffer.reset(&state);
        store.set_chunk(self.buffer_key.clone(), buffer, ChunkOptions::clean());
        if let Some(provenance) = provenance {
            self.provenance.merge(provenance);
        }
        program
    }

    /// Load a descriptor produced by an initializer or preset, adopting its
    /// provenance.
    pub fn apply_descriptor(&mut self, store: &mut ChunkStore, descriptor: ProgramDescriptor) -> Program {
        let ProgramDescriptor { program, provenance } = descriptor;
        self.set_program(store, &program, Some(provenance))
    }

    /// Chunk key of the VM state; also the stepper's identity.
    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// Current VM state (the halted default if never stored).
    pub fn state(&self, store: &ChunkStore) -> GenomeState {
        store.get_chunk::<GenomeState>(&self.state_key).copied().unwrap_or_default()
    }

    /// The loaded program.
    pub fn program(&self, store: &ChunkStore) -> Program {
        store
            .get_chunk::<Program>(&self.program_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Origin tag of the loaded program.
    pub fn origin(&self) -> Option<&str> {
        self.provenance.origin.as_deref()
    }

    /// Manifest key of the loaded preset.
    pub fn manifest_key(&self) -> Option<&str> {
        self.provenance.manifest_key.as_deref()
    }

    /// Metadata of the loaded program.
    pub fn metadata(&self) -> &Metadata {
        &self.provenance.metadata
    }

    fn snapshot_of(
        &self,
        tick: u64,
        state: &GenomeState,
        buffer: &GenomeBuffer,
        program: Program,
    ) -> GenomeSnapshot {
        GenomeSnapshot {
            kind: SNAPSHOT_KIND,
            tick,
            ip: state.ip,
            next_ip: buffer.next_ip,
            halted: state.halted || buffer.halted,
            program,
            executed: buffer.executed.clone(),
            bias_updates: (!buffer.bias_updates.is_empty()).then_some(buffer.bias_updates),
            origin: self.provenance.origin.clone(),
            manifest_key: self.provenance.manifest_key.clone(),
            metadata: (!self.provenance.metadata.is_empty()).then(|| self.provenance.metadata.clone()),
        }
    }

    fn stored_snapshot(&self, store: &ChunkStore, tick: u64) -> GenomeSnapshot {
        let state = self.state(store);
        let buffer = store
            .get_chunk::<GenomeBuffer>(&self.buffer_key)
            .cloned()
            .unwrap_or_else(|| {
                let mut buffer = GenomeBuffer::default();
                buffer.reset(&state);
                buffer
            });
        self.snapshot_of(tick, &state, &buffer, self.program(store))
    }
}

/// Execute the instruction at `state.ip` into `buffer`.
fn execute(
    state: &GenomeState,
    buffer: &mut GenomeBuffer,
    program: &Program,
    hunger: f64,
    chi: f64,
) {
    let Some(instruction) = program.instruction(state.ip).copied() else {
        buffer.halted = true;
        buffer.next_ip = state.ip;
        return;
    };
    if state.halted {
        buffer.halted = true;
        buffer.next_ip = state.ip;
        return;
    }

    buffer.ip_current = state.ip;
    buffer.executed = Some(Executed {
        index: state.ip,
        op: instruction.opcode().name(),
        args: instruction.args(),
    });
    let mut next_ip = state.ip.saturating_add(1);
    match instruction {
        Instruction::IfHungerGt { threshold, target } => {
            if hunger > threshold {
                next_ip = target;
            }
        }
        Instruction::IfChiLt { threshold, target } => {
            if chi < threshold {
                next_ip = target;
            }
        }
        Instruction::SetExplore { intensity } => {
            buffer.bias_updates.distress = Some(clamp01(intensity));
        }
        Instruction::SetBondThreshold { threshold } => {
            buffer.bias_updates.bond = Some(clamp01(1.0 - threshold));
        }
        Instruction::Goto { target } => next_ip = target,
    }

    buffer.next_ip = next_ip;
    buffer.halted = program.instruction(next_ip).is_none();
}

impl Stepper for GenomeStepper {
    type Snapshot = GenomeSnapshot;

    fn id(&self) -> &str {
        &self.state_key
    }

    fn capture(&mut self, ctx: &mut TickContext<'_>) {
        self.ensure(ctx.store_mut());
        let tick = ctx.tick();
        let parts = ctx.parts(&self.state_key);
        let Some((state, buffer)) = parts
            .store
            .chunk_pair_mut::<GenomeState, GenomeBuffer>(&self.state_key, &self.buffer_key)
        else {
            warn!(key = %self.state_key, "state and buffer share a key, skipping capture");
            return;
        };
        buffer.reset(state);
        let pre_step = self.callbacks.wants_capture().then(|| (*state, buffer.clone()));
        parts.store.mark_dirty(&self.buffer_key, false);
        parts.slot.phase = Some(Phase::Capture);
        if let Some((state, buffer)) = pre_step {
            let program = self.program(parts.store);
            let snapshot = self.snapshot_of(tick, &state, &buffer, program);
            self.callbacks.emit_capture(tick, &snapshot);
        }
    }

    fn compute(&mut self, ctx: &mut TickContext<'_>) {
        self.ensure(ctx.store_mut());
        let program = self.program(ctx.store());
        let max_chi = self.limits.max_chi_threshold;
        let parts = ctx.parts(&self.state_key);
        let Some((state, buffer)) = parts
            .store
            .chunk_pair_mut::<GenomeState, GenomeBuffer>(&self.state_key, &self.buffer_key)
        else {
            warn!(key = %self.state_key, "state and buffer share a key, skipping compute");
            return;
        };
        if state.last_tick == Some(parts.tick) {
            debug!(key = %self.state_key, tick = parts.tick, "tick already applied, compute skipped");
            return;
        }

        let agent = parts.agent.as_deref();
        let hunger = agent.map_or(0.0, |agent| clamp01(agent.hunger));
        let chi = agent.map_or(0.0, |agent| clamp(agent.chi, 0.0, max_chi));
        execute(state, buffer, &program, hunger, chi);

        parts.slot.mutation_gate = Some(agent.is_some_and(|agent| agent.alive));
        parts.store.mark_dirty(&self.buffer_key, true);
        parts.slot.phase = Some(Phase::Compute);
    }

    fn commit(&mut self, ctx: &mut TickContext<'_>) {
        let tick = ctx.tick();
        let parts = ctx.parts(&self.state_key);
        if !parts.slot.computed() {
            debug!(key = %self.state_key, tick, "nothing computed this tick, commit skipped");
            return;
        }
        let Some((state, buffer)) = parts
            .store
            .chunk_pair_mut::<GenomeState, GenomeBuffer>(&self.state_key, &self.buffer_key)
        else {
            return;
        };
        if !buffer.halted {
            state.ip = buffer.next_ip;
        }
        state.halted = buffer.halted;
        state.last_tick = Some(tick);

        let gate_open = parts.slot.mutation_gate == Some(true);
        if gate_open && let Some(agent) = parts.agent {
            let bias = &mut agent.interpretation_bias;
            if let Some(distress) = buffer.bias_updates.distress {
                bias.distress = clamp01(distress);
            }
            if let Some(bond) = buffer.bias_updates.bond {
                bias.bond = clamp01(bond);
            }
        } else if !buffer.bias_updates.is_empty() {
            debug!(key = %self.state_key, tick, "mutation gate closed, bias updates discarded");
        }

        let post_step = self.callbacks.wants_commit().then(|| (*state, buffer.clone()));
        parts.store.mark_dirty(&self.state_key, true);
        parts.store.mark_dirty(&self.buffer_key, false);
        parts.slot.mutation_gate = None;
        parts.slot.phase = Some(Phase::Commit);
        if let Some((state, buffer)) = post_step {
            let program = self.program(parts.store);
            let snapshot = self.snapshot_of(tick, &state, &buffer, program);
            self.callbacks.emit_commit(tick, &snapshot);
        }
    }

    fn build_snapshot(&self, store: &ChunkStore, tick: u64) -> GenomeSnapshot {
        self.stored_snapshot(store, tick)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;
    use substrate_core::context::{AgentRecord, InterpretationBias, TickInput};
    use substrate_core::hash::hash_serialized;

    use super::*;
    use crate::initializers::{RandomOptions, random};
    use crate::presets::preset;
    use crate::program::normalize_value;

    fn raw(value: Value) -> Vec<RawInstruction> {
        serde_json::from_value(value).unwrap()
    }

    fn stepper_with(program: Value, store: &mut ChunkStore, scheduler: &mut Scheduler) -> Registration<GenomeStepper> {
        GenomeStepper::register(
            scheduler,
            store,
            GenomeOptions::with_source(ProgramDescriptor::from_raw(raw(program))),
        )
    }

    #[test]
    fn empty_program_is_halted_from_the_start() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = stepper_with(json!([]), &mut store, &mut scheduler);
        assert!(registration.stepper.borrow().state(&store).halted);
        scheduler.run_tick(TickInput::new(0), &mut store);
        let state = registration.stepper.borrow().state(&store);
        assert!(state.halted);
        assert_eq!(state.ip, 0);
    }

    #[test]
    fn hunger_branch_jumps_when_hungry() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = stepper_with(
            json!([["IF_HUNGER_GT", 0.5, 2], "SET_EXPLORE", ["SET_BOND_THRESHOLD", 0.25]]),
            &mut store,
            &mut scheduler,
        );
        let mut agent = AgentRecord {
            hunger: 0.9,
            ..AgentRecord::default()
        };
        scheduler.run_tick(TickInput::new(0).with_agent(&mut agent), &mut store);
        assert_eq!(registration.stepper.borrow().state(&store).ip, 2);

        scheduler.run_tick(TickInput::new(1).with_agent(&mut agent), &mut store);
        assert!((agent.interpretation_bias.bond - 0.75).abs() < 1e-12);
        assert!(agent.interpretation_bias.distress.abs() < f64::EPSILON);
        let state = registration.stepper.borrow().state(&store);
        assert!(state.halted);
        assert_eq!(state.ip, 2);
    }

    #[test]
    fn chi_is_clamped_before_comparing() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = stepper_with(
            json!([["IF_CHI_LT", 60, 1], ["GOTO", 0]]),
            &mut store,
            &mut scheduler,
        );
        let mut agent = AgentRecord {
            chi: 1.0e9,
            ..AgentRecord::default()
        };
        scheduler.run_tick(TickInput::new(0).with_agent(&mut agent), &mut store);
        // Clamped chi equals the ceiling, which is not below 60.
        let state = registration.stepper.borrow().state(&store);
        assert_eq!(state.ip, 1);
        assert!(!state.halted);
    }

    #[test]
    fn dead_agents_are_never_mutated() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = stepper_with(
            json!([["SET_EXPLORE", 0.9], ["SET_BOND_THRESHOLD", 0.1], ["GOTO", 0]]),
            &mut store,
            &mut scheduler,
        );
        let original = InterpretationBias {
            distress: 0.3,
            bond: 0.4,
        };
        let mut agent = AgentRecord {
            alive: false,
            interpretation_bias: original,
            ..AgentRecord::default()
        };
        let staged = Rc::new(RefCell::new(0_usize));
        let counter = Rc::clone(&staged);
        scheduler.register_hooks(substrate_core::scheduler::FnHooks::new().on_commit({
            let stepper = Rc::clone(&registration.stepper);
            move |ctx| {
                let buffer = ctx.store().get_chunk::<GenomeBuffer>(&stepper.borrow().buffer_key).cloned();
                if buffer.is_some_and(|buffer| !buffer.bias_updates.is_empty()) {
                    *counter.borrow_mut() += 1;
                }
            }
        }));
        for tick in 0..9 {
            scheduler.run_tick(TickInput::new(tick).with_agent(&mut agent), &mut store);
        }
        assert_eq!(agent.interpretation_bias, original);
        // Both SET_* instructions staged updates in every cycle.
        assert_eq!(*staged.borrow(), 6);
    }

    #[test]
    fn live_agents_receive_only_staged_keys() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        stepper_with(json!([["SET_EXPLORE", 0.7]]), &mut store, &mut scheduler);
        let mut agent = AgentRecord {
            interpretation_bias: InterpretationBias {
                distress: 0.0,
                bond: 0.33,
            },
            ..AgentRecord::default()
        };
        scheduler.run_tick(TickInput::new(0).with_agent(&mut agent), &mut store);
        assert!((agent.interpretation_bias.distress - 0.7).abs() < 1e-12);
        assert!((agent.interpretation_bias.bond - 0.33).abs() < 1e-12);
    }

    #[test]
    fn compute_is_idempotent_within_a_tick() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = stepper_with(json!(["SET_EXPLORE", "SET_EXPLORE", "SET_EXPLORE"]), &mut store, &mut scheduler);
        scheduler.run_tick(TickInput::new(4), &mut store);
        // Replaying the same tick index is a no-op.
        scheduler.run_tick(TickInput::new(4), &mut store);
        assert_eq!(registration.stepper.borrow().state(&store).ip, 1);

        let mut ctx = TickContext::new(TickInput::new(5), &mut store);
        let mut stepper = registration.stepper.borrow_mut();
        stepper.capture(&mut ctx);
        stepper.compute(&mut ctx);
        stepper.compute(&mut ctx);
        stepper.commit(&mut ctx);
        drop(ctx);
        assert_eq!(stepper.state(&store).ip, 2);
    }

    #[test]
    fn goto_1000_never_leaves_the_program() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = stepper_with(json!([["GOTO", 1000]]), &mut store, &mut scheduler);
        for tick in 0..16 {
            scheduler.run_tick(TickInput::new(tick), &mut store);
            let state = registration.stepper.borrow().state(&store);
            assert_eq!(state.ip, 0);
            assert!(!state.halted);
        }
    }

    #[test]
    fn running_off_the_end_halts_in_place() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = stepper_with(json!(["SET_EXPLORE", "SET_EXPLORE"]), &mut store, &mut scheduler);
        for tick in 0..4 {
            scheduler.run_tick(TickInput::new(tick), &mut store);
        }
        let stepper = registration.stepper.borrow();
        let state = stepper.state(&store);
        assert_eq!((state.ip, state.halted), (1, true));
        let snapshot = stepper.build_snapshot(&store, 4);
        assert!(snapshot.halted);
        assert!(snapshot.ip < snapshot.program.len());
    }

    #[test]
    fn snapshot_after_commit_matches_a_fresh_read() {
        let captured = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&captured);
        let options = GenomeOptions {
            callbacks: Callbacks::<GenomeSnapshot>::default()
                .with_commit(move |event| sink.borrow_mut().push(event.snapshot.clone())),
            ..GenomeOptions::with_source(preset("hunger-loop").unwrap())
        };
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = GenomeStepper::register(&mut scheduler, &mut store, options);
        let mut agent = AgentRecord {
            hunger: 0.8,
            ..AgentRecord::default()
        };
        for tick in 0..6 {
            scheduler.run_tick(TickInput::new(tick).with_agent(&mut agent), &mut store);
            let stepper = registration.stepper.borrow();
            let fresh = stepper.build_snapshot(&store, tick);
            let state = stepper.state(&store);
            assert_eq!(fresh.ip, state.ip);
            assert_eq!(fresh.halted, state.halted);
            assert_eq!(fresh.program, stepper.program(&store));
            assert_eq!(captured.borrow().last(), Some(&fresh));
        }
    }

    #[test]
    fn snapshot_shape() {
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = GenomeStepper::register(
            &mut scheduler,
            &mut store,
            GenomeOptions::with_source(preset("chi-branch").unwrap()),
        );
        scheduler.run_tick(TickInput::new(0), &mut store);
        let snapshot = registration.stepper.borrow().build_snapshot(&store, 0);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["type"], SNAPSHOT_KIND);
        assert_eq!(value["ip"], 1);
        assert_eq!(value["nextIp"], 1);
        assert_eq!(value["halted"], false);
        assert_eq!(value["program"][0], json!({"op": "SET_EXPLORE", "args": [0.8]}));
        assert_eq!(value["executed"], json!({"index": 0, "op": "SET_EXPLORE", "args": [0.8]}));
        assert_eq!(value["biasUpdates"], json!({"distress": 0.8}));
        assert_eq!(value["manifestKey"], "preset:chi-branch");
        assert_eq!(value["origin"], "preset.chi-branch");
        assert!(value["metadata"]["description"].is_string());
    }

    #[test]
    fn random_programs_run_deterministically() {
        let run = || {
            let mut store = ChunkStore::new();
            let mut scheduler = Scheduler::new();
            let source = random(
                &RandomOptions {
                    seed: 2024,
                    ..RandomOptions::default()
                },
                ProgramLimits::default(),
            );
            let registration = GenomeStepper::register(&mut scheduler, &mut store, GenomeOptions::with_source(source));
            let mut agent = AgentRecord {
                hunger: 0.4,
                chi: 12.0,
                ..AgentRecord::default()
            };
            (0..24)
                .map(|tick| {
                    agent.hunger = (agent.hunger + 0.1) % 1.0;
                    scheduler.run_tick(TickInput::new(tick).with_agent(&mut agent), &mut store);
                    hash_serialized(&registration.stepper.borrow().build_snapshot(&store, tick)).unwrap()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn adopting_stored_chunks_without_initializing() {
        let mut store = ChunkStore::new();
        let mut first = GenomeStepper::new(GenomeOptions::default(), &mut store);
        first.set_program(&mut store, &raw(json!(["GOTO"])), None);
        let adopted = GenomeStepper::new(
            GenomeOptions {
                initialize: false,
                ..GenomeOptions::with_source(preset("hunger-loop").unwrap())
            },
            &mut store,
        );
        assert_eq!(adopted.program(&store), normalize_value(&json!(["GOTO"]), ProgramLimits::default()));
    }
}
