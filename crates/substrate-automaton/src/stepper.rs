//! Double-buffered Rule 110 stepper.
//!
//! The current row and the staged row live in the chunk store under the
//! stepper's state and buffer keys. `compute` fills the buffer from the
//! current row through the 8-entry rule table, treating cells beyond either
//! edge as 0; `commit` copies the buffer into the current row.

use std::any::Any;

use serde::Serialize;
use serde_json::{Value, json};
use substrate_core::context::TickContext;
use substrate_core::scheduler::{Phase, Registration, Scheduler};
use substrate_core::snapshot::{Callbacks, Metadata, Provenance, Snapshot};
use substrate_core::stepper::Stepper;
use substrate_core::storage::ChunkStore;
use tracing::{debug, warn};

use crate::initializers::{DEFAULT_WIDTH, InitOptions, Initializer, RULE110};

/// Snapshot type tag.
pub const SNAPSHOT_KIND: &str = "tc.rule110.snapshot";

/// Default chunk key of the current row.
pub const DEFAULT_STATE_KEY: &str = "tc.rule110.state";

/// Default chunk key of the staged row.
pub const DEFAULT_BUFFER_KEY: &str = "tc.rule110.next";

/// Output cell for each `(left << 2) | (center << 1) | right` neighborhood.
pub const RULE_TABLE: [u8; 8] = build_rule_table(RULE110);

#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
const fn build_rule_table(rule: u8) -> [u8; 8] {
    let mut table = [0_u8; 8];
    let mut index = 0;
    while index < 8 {
        table[index] = (rule >> index) & 1;
        index += 1;
    }
    table
}

/// Apply the rule table to one neighborhood.
pub fn next_cell(left: u8, center: u8, right: u8) -> u8 {
    let index = (usize::from(left != 0) << 2) | (usize::from(center != 0) << 1) | usize::from(right != 0);
    RULE_TABLE.get(index).copied().unwrap_or(0)
}

/// Stage one generation of `current` into `next`. Cells past either edge
/// read as 0.
pub fn step_row(current: &[u8], next: &mut [u8]) {
    for (i, out) in next.iter_mut().enumerate() {
        let left = i.checked_sub(1).and_then(|j| current.get(j)).copied().unwrap_or(0);
        let center = current.get(i).copied().unwrap_or(0);
        let right = i.checked_add(1).and_then(|j| current.get(j)).copied().unwrap_or(0);
        *out = next_cell(left, center, right);
    }
}

/// Rule 110 snapshot record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule110Snapshot {
    /// Always [`SNAPSHOT_KIND`].
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Tick described.
    pub tick: u64,
    /// Row width.
    pub width: usize,
    /// Cells, one 0/1 byte each.
    pub cells: Vec<u8>,
    /// Origin tag of the current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Descriptive metadata; always carries `rule: 110`.
    pub metadata: Metadata,
}

impl Rule110Snapshot {
    /// Number of live cells.
    pub fn active_cells(&self) -> usize {
        self.cells.iter().filter(|cell| **cell != 0).count()
    }
}

impl Snapshot for Rule110Snapshot {
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
        self.metadata.get("manifestKey").and_then(Value::as_str)
    }

    fn metadata(&self) -> Option<&Metadata> {
        Some(&self.metadata)
    }

    fn summary(&self) -> Value {
        json!({ "width": self.width, "activeCells": self.active_cells() })
    }
}

/// Construction options.
#[derive(Debug)]
pub struct Rule110Options {
    /// Number of cells.
    pub width: usize,
    /// Chunk key of the current row.
    pub state_key: String,
    /// Chunk key of the staged row.
    pub buffer_key: String,
    /// Initializer applied at construction.
    pub initializer: Initializer,
    /// Initializer parameters.
    pub init: InitOptions,
    /// Whether to apply the initializer at construction. When `false` the
    /// stepper adopts whatever row is already stored.
    pub initialize: bool,
    /// Initial provenance, merged with the initializer's.
    pub provenance: Provenance,
    /// Observability callbacks.
    pub callbacks: Callbacks<Rule110Snapshot>,
}

impl Default for Rule110Options {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            state_key: DEFAULT_STATE_KEY.to_owned(),
            buffer_key: DEFAULT_BUFFER_KEY.to_owned(),
            initializer: Initializer::Ether,
            init: InitOptions::default(),
            initialize: true,
            provenance: Provenance::default(),
            callbacks: Callbacks::default(),
        }
    }
}

impl Rule110Options {
    /// Options for `width` cells with everything else defaulted.
    pub fn with_width(width: usize) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    /// Namespace the chunk keys under `prefix` (`<prefix>.state`,
    /// `<prefix>.buffer`).
    #[must_use]
    pub fn keyed(mut self, prefix: &str) -> Self {
        self.state_key = format!("{prefix}.state");
        self.buffer_key = format!("{prefix}.buffer");
        self
    }
}

/// The Rule 110 stepper.
#[derive(Debug)]
pub struct Rule110Stepper {
    width: usize,
    state_key: String,
    buffer_key: String,
    provenance: Provenance,
    callbacks: Callbacks<Rule110Snapshot>,
}

/// Convert a stored value of another type into a row, where possible.
fn salvage(previous: Option<&dyn Any>, width: usize) -> Vec<u8> {
    let mut row = vec![0_u8; width];
    if let Some(text) = previous.and_then(|value| value.downcast_ref::<String>()) {
        for (cell, byte) in row.iter_mut().zip(text.bytes()) {
            *cell = u8::from(byte == b'1');
        }
    } else if let Some(flags) = previous.and_then(|value| value.downcast_ref::<Vec<bool>>()) {
        for (cell, flag) in row.iter_mut().zip(flags) {
            *cell = u8::from(*flag);
        }
    }
    row
}

/// Return the row under `key`, healing absent, mistyped or mis-sized
/// chunks.
fn ensure_row<'s>(store: &'s mut ChunkStore, key: &str, width: usize) -> &'s mut Vec<u8> {
    let row = store.ensure_chunk(key, |previous| salvage(previous, width));
    if row.len() != width {
        debug!(key, from = row.len(), to = width, "resizing automaton row");
        row.resize(width, 0);
    }
    row
}

/// Overwrite `target` with `source`, normalizing to 0/1 and zero-filling
/// past the end of `source`.
fn copy_cells(target: &mut [u8], source: &[u8]) {
    target.fill(0);
    for (cell, value) in target.iter_mut().zip(source) {
        *cell = u8::from(*value != 0);
    }
}

impl Rule110Stepper {
    /// Create a stepper over `store`, materializing its chunks and applying
    /// the initializer unless `options.initialize` is false.
    pub fn new(options: Rule110Options, store: &mut ChunkStore) -> Self {
        let mut stepper = Self {
            width: options.width,
            state_key: options.state_key,
            buffer_key: options.buffer_key,
            provenance: options.provenance,
            callbacks: options.callbacks,
        };
        stepper.ensure(store);
        if options.initialize {
            stepper.apply_initializer(store, options.initializer, &options.init);
        }
        stepper
    }

    /// Create a stepper and register it with `scheduler`.
    pub fn register(
        scheduler: &mut Scheduler,
        store: &mut ChunkStore,
        options: Rule110Options,
    ) -> Registration<Self> {
        scheduler.register_stepper(Self::new(options, store))
    }

    fn ensure(&self, store: &mut ChunkStore) {
        ensure_row(store, &self.state_key, self.width);
        ensure_row(store, &self.buffer_key, self.width);
    }

    /// Row width.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Chunk key of the current row.
    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// Chunk key of the staged row.
    pub fn buffer_key(&self) -> &str {
        &self.buffer_key
    }

    /// Origin tag of the current state.
    pub fn origin(&self) -> Option<&str> {
        self.provenance.origin.as_deref()
    }

    /// Metadata of the current state, always including `rule: 110`.
    pub fn metadata(&self) -> Metadata {
        let mut metadata = self.provenance.metadata.clone();
        metadata.insert("rule".to_owned(), Value::from(RULE110));
        metadata
    }

    /// Copy of the current row (zeros if the row was never stored).
    pub fn state(&self, store: &ChunkStore) -> Vec<u8> {
        store
            .get_chunk::<Vec<u8>>(&self.state_key)
            .filter(|row| row.len() == self.width)
            .cloned()
            .unwrap_or_else(|| vec![0; self.width])
    }

    /// Replace the current row, clear the buffer, and optionally merge new
    /// provenance.
    pub fn set_state(&mut self, store: &mut ChunkStore, cells: &[u8], provenance: Option<Provenance>) {
        copy_cells(ensure_row(store, &self.state_key, self.width), cells);
        ensure_row(store, &self.buffer_key, self.width).fill(0);
        store.mark_dirty(&self.state_key, true);
        store.mark_dirty(&self.buffer_key, false);
        if let Some(provenance) = provenance {
            self.provenance.merge(provenance);
        }
    }

    /// Run a named initializer and adopt its cells and provenance.
    pub fn apply_initializer(&mut self, store: &mut ChunkStore, initializer: Initializer, options: &InitOptions) {
        let seeded = initializer.build(self.width, options);
        debug!(
            key = %self.state_key,
            initializer = initializer.name(),
            width = self.width,
            "applying rule 110 initializer"
        );
        self.set_state(store, &seeded.cells, Some(seeded.provenance));
    }

    fn snapshot_of(&self, tick: u64, cells: Vec<u8>) -> Rule110Snapshot {
        Rule110Snapshot {
            kind: SNAPSHOT_KIND,
            tick,
            width: self.width,
            cells,
            origin: self.provenance.origin.clone(),
            metadata: self.metadata(),
        }
    }
}

impl Stepper for Rule110Stepper {
    type Snapshot = Rule110Snapshot;

    fn id(&self) -> &str {
        &self.state_key
    }

    fn capture(&mut self, ctx: &mut TickContext<'_>) {
        let tick = ctx.tick();
        let parts = ctx.parts(&self.state_key);
        ensure_row(parts.store, &self.buffer_key, self.width).fill(0);
        let current = ensure_row(parts.store, &self.state_key, self.width);
        let pre_step = self.callbacks.wants_capture().then(|| current.clone());
        parts.slot.phase = Some(Phase::Capture);
        if let Some(cells) = pre_step {
            let snapshot = self.snapshot_of(tick, cells);
            self.callbacks.emit_capture(tick, &snapshot);
        }
    }

    fn compute(&mut self, ctx: &mut TickContext<'_>) {
        self.ensure(ctx.store_mut());
        let parts = ctx.parts(&self.state_key);
        let Some((current, next)) = parts
            .store
            .chunk_pair_mut::<Vec<u8>, Vec<u8>>(&self.state_key, &self.buffer_key)
        else {
            warn!(key = %self.state_key, "state and buffer share a key, skipping compute");
            return;
        };
        step_row(current, next);
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
        let Some((current, next)) = parts
            .store
            .chunk_pair_mut::<Vec<u8>, Vec<u8>>(&self.state_key, &self.buffer_key)
        else {
            return;
        };
        copy_cells(current, next);
        let post_step = self.callbacks.wants_commit().then(|| current.clone());
        parts.store.mark_dirty(&self.state_key, true);
        parts.store.mark_dirty(&self.buffer_key, false);
        parts.slot.phase = Some(Phase::Commit);
        if let Some(cells) = post_step {
            let snapshot = self.snapshot_of(tick, cells);
            self.callbacks.emit_commit(tick, &snapshot);
        }
    }

    fn build_snapshot(&self, store: &ChunkStore, tick: u64) -> Rule110Snapshot {
        self.snapshot_of(tick, self.state(store))
    }
}
