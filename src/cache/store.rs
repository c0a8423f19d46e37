//! Keyed store of fetched collections and records.
//!
//! The store is synchronous and owned by a single writer (the runtime
//! loop). Entry lifecycle is `absent -> fetching -> fresh -> stale ->
//! fetching -> ...`: `fresh` decays to `stale` once the configured TTL
//! elapses or immediately on invalidation. An in-flight fetch never touches
//! the entry's data, so a failed fetch leaves the entry exactly as it was.

use std::time::{Duration, Instant};

use hashbrown::HashMap;

use crate::{task::TaskRecord, types::TaskId};

use super::key::{CachedValue, QueryKey};

/// Observable lifecycle state of a cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// No entry for the key.
    Absent,
    /// A fetch for the key is in flight.
    Fetching,
    /// Data is present and within its TTL.
    Fresh,
    /// Data is present but eligible for refetch.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    value: CachedValue,
    fetched_at: Instant,
    stale: bool,
}

/// Exact pre-mutation copy of one entry, restorable verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    entry: Entry,
}

impl EntrySnapshot {
    /// The snapshotted data.
    pub fn value(&self) -> &CachedValue {
        &self.entry.value
    }
}

#[derive(Debug)]
struct InFlight {
    begin_version: u64,
}

/// Process-wide keyed store of fetched collections and records.
#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<QueryKey, Entry>,
    in_flight: HashMap<QueryKey, InFlight>,
    versions: HashMap<QueryKey, u64>,
    next_version: u64,
    stale_after: Duration,
}

impl QueryCache {
    /// Creates an empty cache whose fresh entries decay after `stale_after`.
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            versions: HashMap::new(),
            next_version: 1,
            stale_after,
        }
    }

    /// Returns immediately-available data without triggering a fetch.
    /// Mid-fetch and stale data are still served.
    pub fn read(&self, key: &QueryKey) -> Option<&CachedValue> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Current lifecycle state of `key`.
    pub fn state(&self, key: &QueryKey) -> EntryState {
        if self.in_flight.contains_key(key) {
            return EntryState::Fetching;
        }
        match self.entries.get(key) {
            None => EntryState::Absent,
            Some(e) if e.stale || e.fetched_at.elapsed() >= self.stale_after => EntryState::Stale,
            Some(_) => EntryState::Fresh,
        }
    }

    /// True when `key` holds data within its TTL and no fetch is in flight.
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.state(key) == EntryState::Fresh
    }

    /// Unconditionally replaces the entry's data and marks it fresh. The
    /// full value is swapped in one step; readers never see a partial
    /// write.
    pub fn write(&mut self, key: QueryKey, value: CachedValue) {
        self.bump_version(&key);
        self.entries.insert(
            key,
            Entry {
                value,
                fetched_at: Instant::now(),
                stale: false,
            },
        );
    }

    /// Claims the single in-flight fetch slot for `key`. Returns false when
    /// a fetch is already in flight, in which case the caller must attach
    /// to the existing one instead of issuing a duplicate request.
    pub fn begin_fetch(&mut self, key: &QueryKey) -> bool {
        if self.in_flight.contains_key(key) {
            return false;
        }
        self.in_flight.insert(
            key.clone(),
            InFlight {
                begin_version: self.version_of(key),
            },
        );
        true
    }

    /// Resolves an in-flight fetch with `value`. Returns false when the
    /// result was discarded because a mutation rewrote or removed the entry
    /// after the fetch began; the speculative data wins in that case.
    pub fn finish_fetch(&mut self, key: &QueryKey, value: CachedValue) -> bool {
        let Some(started) = self.in_flight.remove(key) else {
            return false;
        };
        if self.version_of(key) != started.begin_version {
            return false;
        }
        self.write(key.clone(), value);
        true
    }

    /// Resolves an in-flight fetch as failed. The entry was never touched
    /// during the fetch, so this only releases the in-flight slot.
    pub fn fail_fetch(&mut self, key: &QueryKey) {
        self.in_flight.remove(key);
    }

    /// Marks the entry stale, forcing the next ensure to refetch.
    pub fn invalidate(&mut self, key: &QueryKey) {
        if let Some(e) = self.entries.get_mut(key) {
            e.stale = true;
        }
    }

    /// Marks every list entry stale.
    pub fn invalidate_lists(&mut self) {
        for (key, e) in self.entries.iter_mut() {
            if key.is_list() {
                e.stale = true;
            }
        }
    }

    /// Deletes the entry entirely.
    pub fn remove(&mut self, key: &QueryKey) {
        self.bump_version(key);
        self.entries.remove(key);
    }

    /// Captures an exact restorable copy of the entry, if present.
    pub fn snapshot(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        self.entries.get(key).map(|e| EntrySnapshot { entry: e.clone() })
    }

    /// Puts a snapshotted entry back verbatim, including its staleness and
    /// fetch instant.
    pub fn restore(&mut self, key: QueryKey, snapshot: EntrySnapshot) {
        self.bump_version(&key);
        self.entries.insert(key, snapshot.entry);
    }

    /// Keys of all populated list entries, in no particular order.
    pub fn list_keys(&self) -> Vec<QueryKey> {
        self.entries
            .keys()
            .filter(|k| k.is_list())
            .cloned()
            .collect()
    }

    /// Looks up a record by id across the detail entry and all cached
    /// lists. Detail data wins when both are present.
    pub fn find_record(&self, id: TaskId) -> Option<&TaskRecord> {
        if let Some(CachedValue::One(rec)) = self.read(&QueryKey::detail(id)) {
            return Some(rec);
        }
        self.entries.iter().find_map(|(key, e)| {
            if !key.is_list() {
                return None;
            }
            e.value.as_many()?.iter().find(|r| r.id == id)
        })
    }

    fn version_of(&self, key: &QueryKey) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump_version(&mut self, key: &QueryKey) {
        let v = self.next_version;
        self.next_version += 1;
        self.versions.insert(key.clone(), v);
    }
}
