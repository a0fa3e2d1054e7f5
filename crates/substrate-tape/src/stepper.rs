//! Tape machine stepper over a chunked, conceptually unbounded tape.
//!
//! Cell `p` lives in chunk `p.div_euclid(chunk_size)` at offset
//! `p.rem_euclid(chunk_size)`, stored under `<tape_prefix><chunk>`. Chunks
//! are materialized lazily; reading a cell in an absent chunk yields the
//! machine's blank symbol. After every commit the window of chunks within
//! `window_radius` of the head's chunk is materialized.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use substrate_core::context::TickContext;
use substrate_core::scheduler::{Phase, Registration, Scheduler};
use substrate_core::snapshot::{Callbacks, Metadata, Provenance, Snapshot};
use substrate_core::stepper::Stepper;
use substrate_core::storage::{ChunkOptions, ChunkStore};
use tracing::{debug, warn};

use crate::error::TapeError;
use crate::machine::{Machine, Move};
use crate::registry::MachineRegistry;

/// Snapshot type tag.
pub const SNAPSHOT_KIND: &str = "tc.tape.snapshot";

/// Default chunk key of the head/state record.
pub const DEFAULT_STATE_KEY: &str = "tc.tape.state";

/// Default chunk key of the staging buffer.
pub const DEFAULT_BUFFER_KEY: &str = "tc.tape.buffer";

/// Default prefix of tape chunk keys.
pub const DEFAULT_TAPE_PREFIX: &str = "tc.tape.chunk.";

/// Default cells per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Default number of chunks kept on each side of the head's chunk.
pub const DEFAULT_WINDOW_RADIUS: u32 = 2;

/// Inclusive range of chunk indices around the head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkWindow {
    /// First chunk index.
    pub first_chunk: i64,
    /// Last chunk index.
    pub last_chunk: i64,
}

impl ChunkWindow {
    /// Window of `radius` chunks on each side of `center`.
    pub fn around(center: i64, radius: u32) -> Self {
        Self {
            first_chunk: center.saturating_sub(i64::from(radius)),
            last_chunk: center.saturating_add(i64::from(radius)),
        }
    }

    /// Chunk indices in the window, ascending.
    pub fn chunks(self) -> impl Iterator<Item = i64> {
        self.first_chunk..=self.last_chunk
    }
}

/// Persistent machine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TapeState {
    /// Head position.
    pub head: i64,
    /// Current machine state.
    pub state: String,
    /// Terminal flag.
    pub halted: bool,
    /// Transitions applied so far.
    pub steps: u64,
    /// Last tick whose commit was applied.
    pub last_tick: Option<u64>,
    /// Materialized window around the head.
    pub window: ChunkWindow,
}

/// Staged transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapeBuffer {
    /// Staged halted flag.
    pub halted: bool,
    /// Symbol to write under the head, if a transition fired.
    pub write: Option<u8>,
    /// Staged head movement.
    pub movement: Move,
    /// Staged next state, if a transition fired.
    pub next_state: Option<String>,
}

/// Window contents reported in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowView {
    /// First chunk index.
    pub first_chunk: i64,
    /// Last chunk index.
    pub last_chunk: i64,
    /// Cells of every chunk in the window, concatenated.
    pub cells: Vec<u8>,
}

/// Tape snapshot record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TapeSnapshot {
    /// Always [`SNAPSHOT_KIND`].
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Tick described.
    pub tick: u64,
    /// Machine id.
    pub machine_id: String,
    /// Head position.
    pub head: i64,
    /// Machine state.
    pub state: String,
    /// Terminal flag.
    pub halted: bool,
    /// Transitions applied so far.
    pub steps: u64,
    /// Cells per chunk.
    pub chunk_size: usize,
    /// Window contents.
    pub window: WindowView,
    /// Origin tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Descriptive metadata.
    pub metadata: Metadata,
}

impl Snapshot for TapeSnapshot {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.metadata)
    }

    fn summary(&self) -> Value {
        json!({
            "machineId": self.machine_id,
            "head": self.head,
            "state": self.state,
            "steps": self.steps,
            "halted": self.halted,
        })
    }
}

/// Construction options.
#[derive(Debug)]
pub struct TapeOptions {
    /// Registry id of the machine to run.
    pub machine_id: String,
    /// Cells per chunk; raised to 1 if zero.
    pub chunk_size: usize,
    /// Chunks kept on each side of the head's chunk.
    pub window_radius: u32,
    /// Chunk key of the head/state record.
    pub state_key: String,
    /// Chunk key of the staging buffer.
    pub buffer_key: String,
    /// Prefix of tape chunk keys.
    pub tape_prefix: String,
    /// Symbols written from position 0 at initialization.
    pub initial_tape: Vec<u8>,
    /// Whether to reset head, state and tape at construction. When `false`
    /// the stepper adopts whatever is already stored.
    pub initialize: bool,
    /// Initial provenance, merged over the machine's.
    pub provenance: Provenance,
    /// Observability callbacks.
    pub callbacks: Callbacks<TapeSnapshot>,
}

impl TapeOptions {
    /// Options running `machine_id` with everything else defaulted.
    pub fn for_machine(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            window_radius: DEFAULT_WINDOW_RADIUS,
            state_key: DEFAULT_STATE_KEY.to_owned(),
            buffer_key: DEFAULT_BUFFER_KEY.to_owned(),
            tape_prefix: DEFAULT_TAPE_PREFIX.to_owned(),
            initial_tape: Vec::new(),
            initialize: true,
            provenance: Provenance::default(),
            callbacks: Callbacks::default(),
        }
    }

    /// Namespace the chunk keys under `prefix`.
    #[must_use]
    pub fn keyed(mut self, prefix: &str) -> Self {
        self.state_key = format!("{prefix}.state");
        self.buffer_key = format!("{prefix}.buffer");
        self.tape_prefix = format!("{prefix}.chunk.");
        self
    }
}

/// The tape machine stepper.
#[derive(Debug)]
pub struct TapeStepper {
    machine: Arc<Machine>,
    chunk_size: usize,
    window_radius: u32,
    state_key: String,
    buffer_key: String,
    tape_prefix: String,
    provenance: Provenance,
    callbacks: Callbacks<TapeSnapshot>,
}

impl TapeStepper {
    /// Create a stepper for a registered machine.
    pub fn new(options: TapeOptions, registry: &MachineRegistry, store: &mut ChunkStore) -> Result<Self, TapeError> {
        let machine = registry.resolve(&options.machine_id)?;
        let mut provenance = Provenance {
            origin: Some(format!("machine.{}", machine.id())),
            metadata: machine.metadata(),
            ..Provenance::default()
        };
        provenance.merge(options.provenance);
        let stepper = Self {
            machine,
            chunk_size: options.chunk_size.max(1),
            window_radius: options.window_radius,
            state_key: options.state_key,
            buffer_key: options.buffer_key,
            tape_prefix: options.tape_prefix,
            provenance,
            callbacks: options.callbacks,
        };
        if options.initialize {
            stepper.reset(store, &options.initial_tape);
        } else {
            stepper.ensure(store);
        }
        Ok(stepper)
    }

    /// Create a stepper and register it with `scheduler`.
    pub fn register(
        scheduler: &mut Scheduler,
        store: &mut ChunkStore,
        registry: &MachineRegistry,
        options: TapeOptions,
    ) -> Result<Registration<Self>, TapeError> {
        Ok(scheduler.register_stepper(Self::new(options, registry, store)?))
    }

    /// Put the head at 0 in the initial state, clear the tape and write
    /// `initial_tape` from position 0.
    pub fn reset(&self, store: &mut ChunkStore, initial_tape: &[u8]) {
        let stale: Vec<String> = store.keys_with_prefix(&self.tape_prefix).map(str::to_owned).collect();
        for key in stale {
            store.remove(&key);
        }
        let mut position = 0_i64;
        for symbol in initial_tape {
            self.write_cell(store, position, *symbol);
            position = position.saturating_add(1);
        }
        let state = self.default_state();
        self.materialize(store, state.window);
        store.set_chunk(self.state_key.clone(), state, ChunkOptions::dirty());
        store.set_chunk(self.buffer_key.clone(), TapeBuffer::default(), ChunkOptions::clean());
        debug!(
            machine = self.machine.id(),
            cells = initial_tape.len(),
            "tape initialized"
        );
    }

    fn default_state(&self) -> TapeState {
        TapeState {
            head: 0,
            state: self.machine.initial_state().to_owned(),
            halted: self.machine.is_halt(self.machine.initial_state()),
            steps: 0,
            last_tick: None,
            window: ChunkWindow::around(0, self.window_radius),
        }
    }

    fn ensure(&self, store: &mut ChunkStore) {
        let fallback = self.default_state();
        store.ensure_chunk(&self.state_key, |_| fallback);
        store.ensure_chunk(&self.buffer_key, |_| TapeBuffer::default());
    }

    /// The machine being run.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Chunk key of the head/state record.
    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// Cells per chunk.
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Current head/state record.
    pub fn state(&self, store: &ChunkStore) -> TapeState {
        store
            .get_chunk::<TapeState>(&self.state_key)
            .cloned()
            .unwrap_or_else(|| self.default_state())
    }

    /// Origin tag.
    pub fn origin(&self) -> Option<&str> {
        self.provenance.origin.as_deref()
    }

    /// Metadata of the registered machine.
    pub const fn metadata(&self) -> &Metadata {
        &self.provenance.metadata
    }

    /// Chunk key of chunk `index`.
    pub fn chunk_key(&self, index: i64) -> String {
        format!("{}{index}", self.tape_prefix)
    }

    fn locate(&self, position: i64) -> (i64, usize) {
        let size = i64::try_from(self.chunk_size).unwrap_or(i64::MAX);
        let offset = usize::try_from(position.rem_euclid(size)).unwrap_or(0);
        (position.div_euclid(size), offset)
    }

    /// Symbol at `position`; blank when its chunk was never materialized.
    pub fn read_cell(&self, store: &ChunkStore, position: i64) -> u8 {
        let (chunk, offset) = self.locate(position);
        store
            .get_chunk::<Vec<u8>>(&self.chunk_key(chunk))
            .and_then(|cells| cells.get(offset))
            .copied()
            .unwrap_or_else(|| self.machine.blank())
    }

    fn ensure_tape_chunk<'s>(&self, store: &'s mut ChunkStore, index: i64) -> &'s mut Vec<u8> {
        let size = self.chunk_size;
        let blank = self.machine.blank();
        let cells = store.ensure_chunk(&self.chunk_key(index), |_| vec![blank; size]);
        if cells.len() != size {
            warn!(chunk = index, from = cells.len(), to = size, "resizing tape chunk");
            cells.resize(size, blank);
        }
        cells
    }

    fn write_cell(&self, store: &mut ChunkStore, position: i64, symbol: u8) {
        let (chunk, offset) = self.locate(position);
        if let Some(cell) = self.ensure_tape_chunk(store, chunk).get_mut(offset) {
            *cell = symbol;
        }
        store.mark_dirty(&self.chunk_key(chunk), true);
    }

    fn materialize(&self, store: &mut ChunkStore, window: ChunkWindow) {
        for index in window.chunks() {
            self.ensure_tape_chunk(store, index);
        }
    }

    fn window_view(&self, store: &ChunkStore, window: ChunkWindow) -> WindowView {
        let blank = self.machine.blank();
        let mut cells = Vec::new();
        for index in window.chunks() {
            match store.get_chunk::<Vec<u8>>(&self.chunk_key(index)) {
                Some(chunk) if chunk.len() == self.chunk_size => cells.extend_from_slice(chunk),
                _ => cells.extend(std::iter::repeat_n(blank, self.chunk_size)),
            }
        }
        WindowView {
            first_chunk: window.first_chunk,
            last_chunk: window.last_chunk,
            cells,
        }
    }

    fn snapshot_of(&self, store: &ChunkStore, tick: u64, state: &TapeState) -> TapeSnapshot {
        TapeSnapshot {
            kind: SNAPSHOT_KIND,
            tick,
            machine_id: self.machine.id().to_owned(),
            head: state.head,
            state: state.state.clone(),
            halted: state.halted,
            steps: state.steps,
            chunk_size: self.chunk_size,
            window: self.window_view(store, state.window),
            origin: self.provenance.origin.clone(),
            metadata: self.provenance.metadata.clone(),
        }
    }
}

impl Stepper for TapeStepper {
    type Snapshot = TapeSnapshot;

    fn id(&self) -> &str {
        &self.state_key
    }

    fn capture(&mut self, ctx: &mut TickContext<'_>) {
        self.ensure(ctx.store_mut());
        let tick = ctx.tick();
        let parts = ctx.parts(&self.state_key);
        if let Some(buffer) = parts.store.get_chunk_mut::<TapeBuffer>(&self.buffer_key) {
            *buffer = TapeBuffer::default();
        }
        parts.store.mark_dirty(&self.buffer_key, false);
        parts.slot.phase = Some(Phase::Capture);
        if self.callbacks.wants_capture() {
            let state = self.state(parts.store);
            let snapshot = self.snapshot_of(parts.store, tick, &state);
            self.callbacks.emit_capture(tick, &snapshot);
        }
    }

    fn compute(&mut self, ctx: &mut TickContext<'_>) {
        self.ensure(ctx.store_mut());
        let parts = ctx.parts(&self.state_key);
        let state = self.state(parts.store);
        if state.last_tick == Some(parts.tick) {
            debug!(key = %self.state_key, tick = parts.tick, "tick already applied, compute skipped");
            return;
        }

        let staged = if state.halted {
            TapeBuffer {
                halted: true,
                ..TapeBuffer::default()
            }
        } else {
            let read = self.read_cell(parts.store, state.head);
            match self.machine.transition(&state.state, read) {
                Some(rule) => TapeBuffer {
                    halted: self.machine.is_halt(&rule.next),
                    write: Some(rule.write),
                    movement: rule.movement,
                    next_state: Some(rule.next.clone()),
                },
                None => {
                    debug!(state = %state.state, read, "no transition, halting");
                    TapeBuffer {
                        halted: true,
                        ..TapeBuffer::default()
                    }
                }
            }
        };
        parts
            .store
            .set_chunk(self.buffer_key.clone(), staged, ChunkOptions::dirty());
        parts.slot.phase = Some(Phase::Compute);
    }

    fn commit(&mut self, ctx: &mut TickContext<'_>) {
        let tick = ctx.tick();
        let parts = ctx.parts(&self.state_key);
        if !parts.slot.computed() {
            debug!(key = %self.state_key, tick, "nothing computed this tick, commit skipped");
            return;
        }
        let buffer = parts
            .store
            .get_chunk::<TapeBuffer>(&self.buffer_key)
            .cloned()
            .unwrap_or_default();
        let mut state = self.state(parts.store);

        if let (Some(symbol), Some(next)) = (buffer.write, buffer.next_state) {
            self.write_cell(parts.store, state.head, symbol);
            state.head = state.head.saturating_add(buffer.movement.delta());
            state.state = next;
            state.steps = state.steps.saturating_add(1);
        }
        state.halted = buffer.halted;
        state.last_tick = Some(tick);
        let (center, _) = self.locate(state.head);
        state.window = ChunkWindow::around(center, self.window_radius);
        self.materialize(parts.store, state.window);

        let post_step = self.callbacks.wants_commit().then(|| self.snapshot_of(parts.store, tick, &state));
        parts
            .store
            .set_chunk(self.state_key.clone(), state, ChunkOptions::dirty());
        parts.store.mark_dirty(&self.buffer_key, false);
        parts.slot.phase = Some(Phase::Commit);
        if let Some(snapshot) = post_step {
            self.callbacks.emit_commit(tick, &snapshot);
        }
    }

    fn build_snapshot(&self, store: &ChunkStore, tick: u64) -> TapeSnapshot {
        self.snapshot_of(store, tick, &self.state(store))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use substrate_core::context::TickInput;
    use substrate_core::hash::hash_serialized;

    use super::*;
    use crate::registry::RegisterOptions;

    fn incrementer(initial: &[u8], chunk_size: usize) -> TapeOptions {
        TapeOptions {
            chunk_size,
            window_radius: 1,
            initial_tape: initial.to_vec(),
            ..TapeOptions::for_machine("unary_incrementer")
        }
    }

    #[test]
    fn incrementer_appends_one_and_halts() {
        let registry = MachineRegistry::with_bundled().unwrap();
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = TapeStepper::register(&mut scheduler, &mut store, &registry, incrementer(&[1, 1, 1], 4)).unwrap();
        for tick in 0..6 {
            scheduler.run_tick(TickInput::new(tick), &mut store);
        }
        let stepper = registration.stepper.borrow();
        let state = stepper.state(&store);
        assert!(state.halted);
        assert_eq!(state.state, "halt");
        assert_eq!(state.head, 3);
        assert_eq!(state.steps, 4);
        let tape: Vec<u8> = (0..6).map(|p| stepper.read_cell(&store, p)).collect();
        assert_eq!(tape, vec![1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn halting_freezes_the_machine() {
        let registry = MachineRegistry::with_bundled().unwrap();
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let registration = TapeStepper::register(&mut scheduler, &mut store, &registry, incrementer(&[], 4)).unwrap();
        scheduler.run_tick(TickInput::new(0), &mut store);
        let after_halt = registration.stepper.borrow().state(&store);
        assert!(after_halt.halted);
        scheduler.run_tick(TickInput::new(1), &mut store);
        let later = registration.stepper.borrow().state(&store);
        assert_eq!((later.head, later.steps), (after_halt.head, after_halt.steps));
    }

    #[test]
    fn negative_positions_use_euclidean_chunks() {
        let mut registry = MachineRegistry::new();
        registry
            .register_json(
                r#"{"id": "left", "initial_state": "go", "transitions": [
                    {"state": "go", "read": 0, "write": 2, "move": "L", "next": "go"}
                ]}"#,
                None,
                RegisterOptions::default(),
            )
            .unwrap();
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        let options = TapeOptions {
            chunk_size: 4,
            window_radius: 0,
            ..TapeOptions::for_machine("left")
        };
        let registration = TapeStepper::register(&mut scheduler, &mut store, &registry, options).unwrap();
        for tick in 0..6 {
            scheduler.run_tick(TickInput::new(tick), &mut store);
        }
        let stepper = registration.stepper.borrow();
        let state = stepper.state(&store);
        assert_eq!(state.head, -6);
        assert_eq!(state.window, ChunkWindow { first_chunk: -2, last_chunk: -2 });
        assert_eq!(stepper.read_cell(&store, -1), 2);
        assert_eq!(stepper.read_cell(&store, -5), 2);
        assert_eq!(store.get_chunk::<Vec<u8>>("tc.tape.chunk.-1").unwrap(), &vec![2, 2, 2, 2]);
        assert!(store.contains("tc.tape.chunk.-2"));
    }

    #[test]
    fn unknown_machines_are_rejected() {
        let registry = MachineRegistry::new();
        let mut store = ChunkStore::new();
        let result = TapeStepper::new(TapeOptions::for_machine("ghost"), &registry, &mut store);
        assert!(matches!(result, Err(TapeError::UnknownMachine { .. })));
    }

    #[test]
    fn commit_without_compute_changes_nothing() {
        let registry = MachineRegistry::with_bundled().unwrap();
        let mut store = ChunkStore::new();
        let mut stepper = TapeStepper::new(incrementer(&[1], 4), &registry, &mut store).unwrap();
        let before = stepper.state(&store);
        let mut ctx = TickContext::new(TickInput::new(0), &mut store);
        stepper.capture(&mut ctx);
        stepper.commit(&mut ctx);
        drop(ctx);
        assert_eq!(stepper.state(&store), before);
    }

    #[test]
    fn snapshot_shape_and_window() {
        let registry = MachineRegistry::with_bundled().unwrap();
        let mut store = ChunkStore::new();
        let stepper = TapeStepper::new(incrementer(&[1, 1], 4), &registry, &mut store).unwrap();
        let value = serde_json::to_value(stepper.build_snapshot(&store, 0)).unwrap();
        assert_eq!(value["type"], SNAPSHOT_KIND);
        assert_eq!(value["machineId"], "unary_incrementer");
        assert_eq!(value["chunkSize"], 4);
        assert_eq!(value["window"]["firstChunk"], -1);
        assert_eq!(value["window"]["lastChunk"], 1);
        assert_eq!(value["window"]["cells"].as_array().unwrap().len(), 12);
        assert_eq!(value["window"]["cells"][4], 1);
        assert_eq!(value["origin"], "machine.unary_incrementer");
    }

    #[test]
    fn traces_are_deterministic() {
        let run = || {
            let registry = MachineRegistry::with_bundled().unwrap();
            let mut store = ChunkStore::new();
            let mut scheduler = Scheduler::new();
            let registration =
                TapeStepper::register(&mut scheduler, &mut store, &registry, incrementer(&[1; 9], 8)).unwrap();
            (0..12)
                .map(|tick| {
                    scheduler.run_tick(TickInput::new(tick), &mut store);
                    hash_serialized(&registration.stepper.borrow().build_snapshot(&store, tick)).unwrap()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
