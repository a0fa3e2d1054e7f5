//! Bounded observability store for stepper snapshots.
//!
//! The overlay never talks to steppers directly. A host wires [`sink`] into
//! a stepper's capture or commit callback and the store keeps the most
//! recent entries, newest first, for a display layer to render.
//!
//! `recorded_at` is wall-clock time and exists for display only; nothing
//! hashed or replayed ever reads it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use substrate_core::config::OverlayConfig;
use substrate_core::snapshot::{Metadata, Snapshot, SnapshotEvent};
use tracing::{debug, warn};

/// One recorded snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayEntry {
    /// Snapshot type tag.
    pub kind: String,
    /// Tick the snapshot describes.
    pub tick: u64,
    /// Manifest key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_key: Option<String>,
    /// Origin tag, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Snapshot metadata.
    pub metadata: Metadata,
    /// Compact summary for display.
    pub summary: Value,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl OverlayEntry {
    /// Build an entry from any snapshot, stamped now.
    pub fn from_snapshot<S: Snapshot>(snapshot: &S) -> Self {
        Self {
            kind: snapshot.kind().to_owned(),
            tick: snapshot.tick(),
            manifest_key: snapshot.manifest_key().map(str::to_owned),
            origin: snapshot.origin().map(str::to_owned),
            metadata: snapshot.metadata().cloned().unwrap_or_default(),
            summary: snapshot.summary(),
            recorded_at: Utc::now(),
        }
    }
}

/// Ring buffer of recent snapshot entries.
#[derive(Debug, Clone, Default)]
pub struct OverlayStore {
    config: OverlayConfig,
    entries: VecDeque<OverlayEntry>,
}

/// Overlay store shared between a host and the callbacks feeding it.
pub type SharedOverlay = Rc<RefCell<OverlayStore>>;

impl OverlayStore {
    /// A store using `config`.
    pub fn new(config: OverlayConfig) -> Self {
        let mut store = Self::default();
        store.configure(config);
        store
    }

    /// Wrap a new store for sharing with callbacks.
    pub fn shared(config: OverlayConfig) -> SharedOverlay {
        Rc::new(RefCell::new(Self::new(config)))
    }

    /// Replace the configuration. Disabling drops every entry; a smaller
    /// capacity drops the oldest ones.
    pub fn configure(&mut self, mut config: OverlayConfig) {
        config.max_entries = config.max_entries.max(1);
        if config.enabled {
            self.entries.truncate(config.max_entries);
        } else {
            self.entries.clear();
        }
        debug!(enabled = config.enabled, max_entries = config.max_entries, "overlay configured");
        self.config = config;
    }

    /// Current configuration.
    pub const fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Record an entry as the newest. Returns `false` while disabled.
    pub fn record_snapshot(&mut self, entry: OverlayEntry) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.config.max_entries);
        true
    }

    /// Record any snapshot.
    pub fn record<S: Snapshot>(&mut self, snapshot: &S) -> bool {
        self.record_snapshot(OverlayEntry::from_snapshot(snapshot))
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &OverlayEntry> {
        self.entries.iter()
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A snapshot callback recording into `overlay`.
///
/// If the store is already borrowed when the callback fires, the snapshot
/// is skipped with a warning.
pub fn sink<S: Snapshot + 'static>(overlay: &SharedOverlay) -> impl FnMut(&SnapshotEvent<'_, S>) + 'static {
    let overlay = Rc::clone(overlay);
    move |event| match overlay.try_borrow_mut() {
        Ok(mut store) => {
            store.record(event.snapshot);
        }
        Err(_) => warn!(tick = event.tick, "overlay busy, snapshot dropped"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use substrate_automaton::{Rule110Options, Rule110Snapshot, Rule110Stepper};
    use substrate_core::context::TickInput;
    use substrate_core::scheduler::Scheduler;
    use substrate_core::snapshot::Callbacks;
    use substrate_core::storage::ChunkStore;

    use super::*;

    fn enabled(max_entries: usize) -> OverlayConfig {
        OverlayConfig {
            enabled: true,
            max_entries,
            ..OverlayConfig::default()
        }
    }

    fn entry(tick: u64) -> OverlayEntry {
        OverlayEntry {
            kind: "test".to_owned(),
            tick,
            manifest_key: None,
            origin: None,
            metadata: Metadata::new(),
            summary: Value::Null,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn newest_first_and_bounded() {
        let mut overlay = OverlayStore::new(enabled(3));
        for tick in 0..5 {
            assert!(overlay.record_snapshot(entry(tick)));
        }
        let ticks: Vec<u64> = overlay.entries().map(|entry| entry.tick).collect();
        assert_eq!(ticks, vec![4, 3, 2]);
    }

    #[test]
    fn disabled_store_ignores_and_clears() {
        let mut overlay = OverlayStore::new(enabled(6));
        overlay.record_snapshot(entry(1));
        overlay.configure(OverlayConfig::default());
        assert!(overlay.is_empty());
        assert!(!overlay.record_snapshot(entry(2)));
        assert!(overlay.is_empty());
    }

    #[test]
    fn capacity_is_at_least_one_and_shrinks() {
        let mut overlay = OverlayStore::new(enabled(0));
        assert_eq!(overlay.config().max_entries, 1);
        overlay.configure(enabled(4));
        for tick in 0..4 {
            overlay.record_snapshot(entry(tick));
        }
        overlay.configure(enabled(2));
        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.entries().next().map(|entry| entry.tick), Some(3));
        overlay.clear();
        assert!(overlay.is_empty());
    }

    #[test]
    fn sink_records_stepper_commits() {
        let overlay = OverlayStore::shared(enabled(6));
        let options = Rule110Options {
            callbacks: Callbacks::<Rule110Snapshot>::default().with_commit(sink(&overlay)),
            ..Rule110Options::with_width(32)
        };
        let mut store = ChunkStore::new();
        let mut scheduler = Scheduler::new();
        Rule110Stepper::register(&mut scheduler, &mut store, options);
        for tick in 0..3 {
            scheduler.run_tick(TickInput::new(tick), &mut store);
        }
        let overlay = overlay.borrow();
        assert_eq!(overlay.len(), 3);
        let newest = overlay.entries().next().unwrap();
        assert_eq!(newest.kind, "tc.rule110.snapshot");
        assert_eq!(newest.tick, 2);
        assert_eq!(newest.origin.as_deref(), Some("ether"));
        assert_eq!(newest.summary["width"], 32);
        let value = serde_json::to_value(newest).unwrap();
        assert!(value["recordedAt"].is_string());
    }
}
