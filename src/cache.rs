use crate::protocol::{CacheKey, PacketTag, Record};
use ahash::AHashMap;

/// Per-connection store of the last record transmitted (or received) for
/// each packet type and cache key.
///
/// Entries hold owned copies of records. Each direction of a connection
/// owns its own cache; the two sides of a link stay byte-compatible because
/// sender and receiver mutate their caches through the same insert and
/// evict sequence.
#[derive(Debug, Default)]
pub struct DeltaCache {
    tables: AHashMap<PacketTag, AHashMap<CacheKey, Record>>,
}

impl DeltaCache {
    pub fn new() -> Self {
        Self {
            tables: AHashMap::new(),
        }
    }

    pub fn lookup(&self, tag: PacketTag, key: CacheKey) -> Option<&Record> {
        self.tables.get(&tag)?.get(&key)
    }

    /// Removes and returns the entry, letting the caller reuse the
    /// allocation when rebuilding the record.
    pub fn take(&mut self, tag: PacketTag, key: CacheKey) -> Option<Record> {
        self.tables.get_mut(&tag)?.remove(&key)
    }

    pub fn insert(&mut self, tag: PacketTag, key: CacheKey, record: Record) {
        self.tables.entry(tag).or_default().insert(key, record);
    }

    /// Evicts one entry. Returns whether anything was stored under the key.
    pub fn remove(&mut self, tag: PacketTag, key: CacheKey) -> bool {
        self.tables
            .get_mut(&tag)
            .map(|table| table.remove(&key).is_some())
            .unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn entry_count(&self) -> usize {
        self.tables.values().map(|table| table.len()).sum()
    }
}
