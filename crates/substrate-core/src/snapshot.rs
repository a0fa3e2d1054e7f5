//! Snapshot records and the callback seam used by observability sinks.
//!
//! A snapshot is an immutable, serializable description of a stepper at a
//! tick. Steppers hand snapshots to injected callbacks during `capture` and
//! `commit`; the core never talks to a sink directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form descriptive metadata carried by snapshots.
pub type Metadata = serde_json::Map<String, Value>;

/// Where a stepper's current state came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Short origin tag (`"ether"`, `"prng"`, `"preset.hunger-loop"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Manifest key of the preset the state was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_key: Option<String>,
    /// Descriptive metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Provenance {
    /// Provenance with only an origin tag.
    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            ..Self::default()
        }
    }

    /// Insert one metadata entry, builder style.
    #[must_use]
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }

    /// Fold `other` into `self`: a present origin or manifest key replaces
    /// the current one and metadata entries are merged key by key.
    pub fn merge(&mut self, other: Self) {
        if other.origin.is_some() {
            self.origin = other.origin;
        }
        if other.manifest_key.is_some() {
            self.manifest_key = other.manifest_key;
        }
        self.metadata.extend(other.metadata);
    }
}

/// Common read access over every snapshot type.
pub trait Snapshot: Serialize {
    /// Snapshot type tag, e.g. `tc.rule110.snapshot`.
    fn kind(&self) -> &'static str;

    /// Tick the snapshot describes.
    fn tick(&self) -> u64;

    /// Origin tag, if any.
    fn origin(&self) -> Option<&str>;

    /// Manifest key, if any.
    fn manifest_key(&self) -> Option<&str> {
        None
    }

    /// Descriptive metadata, if any.
    fn metadata(&self) -> Option<&Metadata>;

    /// Compact summary for observability displays.
    fn summary(&self) -> Value;
}

/// Event handed to snapshot callbacks.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotEvent<'a, S> {
    /// Tick the event was emitted in.
    pub tick: u64,
    /// The snapshot itself.
    pub snapshot: &'a S,
}

/// Injected observability callback.
pub type SnapshotCallback<S> = Box<dyn FnMut(&SnapshotEvent<'_, S>)>;

/// The optional capture/commit callback pair every stepper accepts.
pub struct Callbacks<S> {
    /// Called during `capture` with the pre-step snapshot.
    pub on_capture: Option<SnapshotCallback<S>>,
    /// Called during `commit` with the post-step snapshot.
    pub on_commit: Option<SnapshotCallback<S>>,
}

impl<S> Default for Callbacks<S> {
    fn default() -> Self {
        Self {
            on_capture: None,
            on_commit: None,
        }
    }
}

impl<S> std::fmt::Debug for Callbacks<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_capture", &self.on_capture.is_some())
            .field("on_commit", &self.on_commit.is_some())
            .finish()
    }
}

impl<S> Callbacks<S> {
    /// Install the capture callback.
    #[must_use]
    pub fn with_capture(mut self, f: impl FnMut(&SnapshotEvent<'_, S>) + 'static) -> Self {
        self.on_capture = Some(Box::new(f));
        self
    }

    /// Install the commit callback.
    #[must_use]
    pub fn with_commit(mut self, f: impl FnMut(&SnapshotEvent<'_, S>) + 'static) -> Self {
        self.on_commit = Some(Box::new(f));
        self
    }

    /// Whether a capture callback is installed.
    pub const fn wants_capture(&self) -> bool {
        self.on_capture.is_some()
    }

    /// Whether a commit callback is installed.
    pub const fn wants_commit(&self) -> bool {
        self.on_commit.is_some()
    }

    /// Deliver a pre-step snapshot to the capture callback.
    pub fn emit_capture(&mut self, tick: u64, snapshot: &S) {
        if let Some(callback) = self.on_capture.as_mut() {
            callback(&SnapshotEvent { tick, snapshot });
        }
    }

    /// Deliver a post-step snapshot to the commit callback.
    pub fn emit_commit(&mut self, tick: u64, snapshot: &S) {
        if let Some(callback) = self.on_commit.as_mut() {
            callback(&SnapshotEvent { tick, snapshot });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn merge_replaces_present_fields_only() {
        let mut base = Provenance::with_origin("ether").meta("phase", 0);
        base.merge(Provenance {
            origin: None,
            manifest_key: Some("preset:x".to_owned()),
            metadata: Provenance::default().meta("offset", 57).metadata,
        });
        assert_eq!(base.origin.as_deref(), Some("ether"));
        assert_eq!(base.manifest_key.as_deref(), Some("preset:x"));
        assert_eq!(base.metadata.len(), 2);
    }

    #[test]
    fn callbacks_receive_events() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut callbacks = Callbacks::<u32>::default().with_commit(move |event| {
            sink.borrow_mut().push((event.tick, *event.snapshot));
        });
        callbacks.emit_capture(1, &10);
        callbacks.emit_commit(1, &11);
        assert!(!callbacks.wants_capture());
        assert_eq!(*seen.borrow(), vec![(1, 11)]);
    }
}
