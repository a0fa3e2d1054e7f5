//! Keyed store of lazily-materialized, mutable chunks.
//!
//! A chunk is a named value plus an advisory dirty flag and optional
//! metadata. Keys are caller-chosen strings; steppers namespace their keys
//! so multiple instances coexist. Values are type-erased so one store can
//! hold automaton rows, VM registers, programs, and tape segments side by
//! side.
//!
//! # Contract
//!
//! - No deep copies: [`ChunkStore::set_chunk`] moves the value in and hands
//!   back a mutable reference. Callers own their mutation discipline.
//! - The dirty flag is advisory. Nothing in the store reads it to decide
//!   behavior; it exists for persistence and observability consumers.
//! - Absent or type-incompatible chunks self-heal through
//!   [`ChunkStore::ensure_chunk`] instead of erroring.

use std::any::Any;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::ops::Bound;

use tracing::warn;

/// Free-form metadata attached to a chunk.
pub type ChunkMeta = serde_json::Map<String, serde_json::Value>;

/// Options applied when a chunk is stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkOptions {
    /// Initial dirty flag.
    pub dirty: bool,
    /// Optional metadata; `None` keeps no metadata.
    pub meta: Option<ChunkMeta>,
}

impl ChunkOptions {
    /// Options for a clean chunk without metadata.
    pub const fn clean() -> Self {
        Self {
            dirty: false,
            meta: None,
        }
    }

    /// Options for a dirty chunk without metadata.
    pub const fn dirty() -> Self {
        Self {
            dirty: true,
            meta: None,
        }
    }

    /// Attach metadata to these options.
    #[must_use]
    pub fn with_meta(mut self, meta: ChunkMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// One stored chunk.
struct Chunk {
    value: Box<dyn Any>,
    dirty: bool,
    meta: Option<ChunkMeta>,
}

impl Chunk {
    fn new<T: Any>(value: T, options: ChunkOptions) -> Self {
        Self {
            value: Box::new(value),
            dirty: options.dirty,
            meta: options.meta,
        }
    }

    /// Borrow the value as `T`. Only called right after the value was
    /// stored or verified as `T`.
    #[allow(clippy::expect_used)] // the value was inserted or checked as T by every caller
    fn typed_mut<T: Any>(&mut self) -> &mut T {
        self.value
            .downcast_mut::<T>()
            .expect("chunk value was stored with this type")
    }
}

/// The chunk store.
#[derive(Default)]
pub struct ChunkStore {
    chunks: BTreeMap<String, Chunk>,
}

impl fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.chunks.iter().map(|(key, chunk)| (key, chunk.dirty)))
            .finish()
    }
}

impl ChunkStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            chunks: BTreeMap::new(),
        }
    }

    /// Number of chunks currently materialized.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether a chunk exists under `key`, whatever its type.
    pub fn contains(&self, key: &str) -> bool {
        self.chunks.contains_key(key)
    }

    /// Current value under `key`, or `None` if absent or of another type.
    pub fn get_chunk<T: Any>(&self, key: &str) -> Option<&T> {
        self.chunks.get(key)?.value.downcast_ref::<T>()
    }

    /// Mutable access to the value under `key`, or `None` if absent or of
    /// another type.
    pub fn get_chunk_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.chunks.get_mut(key)?.value.downcast_mut::<T>()
    }

    /// Store `value` under `key`, replacing any previous chunk, and return
    /// a mutable reference to the stored value.
    pub fn set_chunk<T: Any>(
        &mut self,
        key: impl Into<String>,
        value: T,
        options: ChunkOptions,
    ) -> &mut T {
        let chunk = Chunk::new(value, options);
        let slot = match self.chunks.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(chunk);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(chunk),
        };
        slot.typed_mut::<T>()
    }

    /// Return the chunk under `key` as `T`, (re)initializing it with `init`
    /// when it is absent or holds a value of another type.
    ///
    /// `init` receives the previous value of another type, if any, so the
    /// caller can salvage its contents.
    pub fn ensure_chunk<T: Any>(
        &mut self,
        key: &str,
        init: impl FnOnce(Option<&dyn Any>) -> T,
    ) -> &mut T {
        let chunk = match self.chunks.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().value.is::<T>() {
                    warn!(key, "chunk held an incompatible value, reinitializing");
                    let value = init(Some(occupied.get().value.as_ref()));
                    occupied.insert(Chunk::new(value, ChunkOptions::clean()));
                }
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(Chunk::new(init(None), ChunkOptions::clean())),
        };
        chunk.typed_mut::<T>()
    }

    /// Mutable access to two distinct chunks at once.
    ///
    /// Returns `None` when the keys are equal, either chunk is absent, or
    /// either holds a value of another type.
    pub fn chunk_pair_mut<A: Any, B: Any>(
        &mut self,
        first: &str,
        second: &str,
    ) -> Option<(&mut A, &mut B)> {
        if first == second {
            return None;
        }
        let (low, high) = if first < second { (first, second) } else { (second, first) };
        let mut range = self
            .chunks
            .range_mut::<str, _>((Bound::Included(low), Bound::Included(high)));
        let (low_key, low_chunk) = range.next()?;
        let (high_key, high_chunk) = range.next_back()?;
        if low_key != low || high_key != high {
            return None;
        }
        let (a, b) = if first < second { (low_chunk, high_chunk) } else { (high_chunk, low_chunk) };
        Some((a.value.downcast_mut::<A>()?, b.value.downcast_mut::<B>()?))
    }

    /// Set the dirty flag of an existing chunk. Returns `false` if absent.
    pub fn mark_dirty(&mut self, key: &str, dirty: bool) -> bool {
        match self.chunks.get_mut(key) {
            Some(chunk) => {
                chunk.dirty = dirty;
                true
            }
            None => false,
        }
    }

    /// Whether the chunk under `key` exists and is marked dirty.
    pub fn is_dirty(&self, key: &str) -> bool {
        self.chunks.get(key).is_some_and(|chunk| chunk.dirty)
    }

    /// Metadata of the chunk under `key`, if any.
    pub fn meta(&self, key: &str) -> Option<&ChunkMeta> {
        self.chunks.get(key)?.meta.as_ref()
    }

    /// Keys of all dirty chunks, in key order.
    pub fn dirty_keys(&self) -> impl Iterator<Item = &str> {
        self.chunks
            .iter()
            .filter(|(_, chunk)| chunk.dirty)
            .map(|(key, _)| key.as_str())
    }

    /// Keys starting with `prefix`, in key order.
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.chunks
            .keys()
            .filter(move |key| key.starts_with(prefix))
            .map(String::as_str)
    }

    /// Drop the chunk under `key`. Returns whether one existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.chunks.remove(key).is_some()
    }

    /// Drop every chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn absent_chunk_reads_none() {
        let store = ChunkStore::new();
        assert!(store.get_chunk::<Vec<u8>>("missing").is_none());
        assert!(!store.is_dirty("missing"));
    }

    #[test]
    fn set_returns_the_stored_value_without_copying() {
        let mut store = ChunkStore::new();
        let cells = store.set_chunk("row", vec![0_u8, 1, 0], ChunkOptions::clean());
        cells[0] = 1;
        assert_eq!(store.get_chunk::<Vec<u8>>("row").unwrap(), &vec![1, 1, 0]);
    }

    #[test]
    fn wrong_type_reads_none() {
        let mut store = ChunkStore::new();
        store.set_chunk("row", 7_u32, ChunkOptions::clean());
        assert!(store.get_chunk::<Vec<u8>>("row").is_none());
        assert_eq!(store.get_chunk::<u32>("row"), Some(&7));
    }

    #[test]
    fn ensure_creates_lazily_and_keeps_existing() {
        let mut store = ChunkStore::new();
        store.ensure_chunk("count", |_| 1_u64);
        *store.ensure_chunk("count", |_| 100_u64) += 1;
        assert_eq!(store.get_chunk::<u64>("count"), Some(&2));
    }

    #[test]
    fn ensure_heals_type_mismatch_and_offers_previous_value() {
        let mut store = ChunkStore::new();
        store.set_chunk("row", String::from("101"), ChunkOptions::dirty());
        let healed: &mut Vec<u8> = store.ensure_chunk("row", |previous| {
            previous
                .and_then(|value| value.downcast_ref::<String>())
                .map(|text| text.bytes().map(|b| u8::from(b == b'1')).collect())
                .unwrap_or_default()
        });
        assert_eq!(healed, &vec![1_u8, 0, 1]);
        assert!(!store.is_dirty("row"));
    }

    #[test]
    fn dirty_flags_and_meta() {
        let mut store = ChunkStore::new();
        let mut meta = ChunkMeta::new();
        meta.insert("manifest".to_owned(), serde_json::json!("tc.rule110.snapshot"));
        store.set_chunk("snap", 1_u8, ChunkOptions::dirty().with_meta(meta));
        store.set_chunk("other", 2_u8, ChunkOptions::clean());
        assert!(store.is_dirty("snap"));
        assert_eq!(store.dirty_keys().collect::<Vec<_>>(), vec!["snap"]);
        assert_eq!(
            store.meta("snap").and_then(|m| m.get("manifest")),
            Some(&serde_json::json!("tc.rule110.snapshot"))
        );
        assert!(store.mark_dirty("snap", false));
        assert!(!store.mark_dirty("missing", true));
        assert_eq!(store.dirty_keys().count(), 0);
    }

    #[test]
    fn pair_access_is_disjoint() {
        let mut store = ChunkStore::new();
        store.set_chunk("a", vec![1_u8, 1], ChunkOptions::clean());
        store.set_chunk("b", vec![0_u8, 0], ChunkOptions::clean());
        let (a, b) = store.chunk_pair_mut::<Vec<u8>, Vec<u8>>("a", "b").unwrap();
        b.copy_from_slice(a);
        a[0] = 0;
        assert_eq!(store.get_chunk::<Vec<u8>>("b").unwrap(), &vec![1, 1]);
        assert!(store.chunk_pair_mut::<Vec<u8>, Vec<u8>>("a", "a").is_none());
        assert!(store.chunk_pair_mut::<Vec<u8>, u32>("a", "b").is_none());
    }

    #[test]
    fn pair_access_ignores_key_order_and_neighbours() {
        let mut store = ChunkStore::new();
        store.set_chunk("row.next", 0_u32, ChunkOptions::clean());
        store.set_chunk("row.middle", String::from("skip"), ChunkOptions::clean());
        store.set_chunk("row.current", vec![1_u8], ChunkOptions::clean());
        let (next, current) = store.chunk_pair_mut::<u32, Vec<u8>>("row.next", "row.current").unwrap();
        *next = 7;
        current.push(0);
        assert_eq!(store.get_chunk::<u32>("row.next"), Some(&7));
        assert_eq!(store.get_chunk::<Vec<u8>>("row.current"), Some(&vec![1, 0]));
        assert!(store.chunk_pair_mut::<u32, Vec<u8>>("row.next", "row.absent").is_none());
        assert!(store.chunk_pair_mut::<u32, Vec<u8>>("row.zzz", "row.current").is_none());
    }

    #[test]
    fn prefix_listing_and_clear() {
        let mut store = ChunkStore::new();
        store.set_chunk("tape.chunk.0", 0_u8, ChunkOptions::clean());
        store.set_chunk("tape.chunk.-1", 0_u8, ChunkOptions::clean());
        store.set_chunk("tape.state", 0_u8, ChunkOptions::clean());
        assert_eq!(store.keys_with_prefix("tape.chunk.").count(), 2);
        assert!(store.remove("tape.state"));
        assert_eq!(store.len(), 2);
        store.clear();
        assert!(store.is_empty());
    }
}
