//! Optimistic mutation coordinator: speculative cache writes with exact
//! rollback.
//!
//! Each mutation applies its speculative change to every affected cache
//! entry up front, capturing a [`MutationContext`] of pre-mutation
//! snapshots. When the remote call resolves, the context is consumed
//! exactly once: committed against the authoritative server record, or
//! restored verbatim. Everything here is synchronous; the async remote
//! round-trip happens in the runtime loop between apply and resolve.

use std::fmt;

use thiserror::Error;

use crate::{
    cache::{
        key::{CachedValue, QueryKey},
        store::{EntrySnapshot, QueryCache},
    },
    remote::RemoteError,
    task::{TaskDraft, TaskPatch, TaskRecord},
    types::{PLACEHOLDER_ID_BASE, TaskId},
};

/// Mutation discriminator carried by [`MutationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// A create-intent.
    Create,
    /// An update-intent.
    Update,
    /// A delete-intent.
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// A mutation's remote call failed. Raised only after every touched cache
/// entry has been restored to its pre-mutation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} mutation failed{}; cache rolled back", fmt_target(*id))]
pub struct MutationError {
    /// Which mutation failed.
    pub kind: MutationKind,
    /// Target task, when the mutation had one (update, delete).
    pub id: Option<TaskId>,
    /// The underlying remote failure.
    #[source]
    pub source: RemoteError,
}

fn fmt_target(id: Option<TaskId>) -> String {
    match id {
        Some(id) => format!(" for task {id}"),
        None => String::new(),
    }
}

/// Allocator for cache-local create placeholders. Ids come from a
/// dedicated namespace disjoint from server-assigned ids, so a placeholder
/// can never be mistaken for a persisted record.
#[derive(Debug)]
pub struct PlaceholderIds {
    next: TaskId,
}

impl PlaceholderIds {
    /// Starts the namespace at [`PLACEHOLDER_ID_BASE`].
    pub fn new() -> Self {
        Self {
            next: PLACEHOLDER_ID_BASE,
        }
    }

    /// Returns the next unused placeholder id.
    pub fn next(&mut self) -> TaskId {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for PlaceholderIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot bundle for one in-flight mutation. Created by the `apply_*`
/// functions, consumed exactly once by the matching `commit_*` or by
/// [`MutationContext::restore`].
#[derive(Debug)]
pub struct MutationContext {
    kind: MutationKind,
    target: Option<TaskId>,
    placeholder_id: Option<TaskId>,
    prior_completed: Option<bool>,
    snapshots: Vec<(QueryKey, EntrySnapshot)>,
}

impl MutationContext {
    /// Which mutation this context belongs to.
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Server id the mutation targets, when it has one.
    pub fn target(&self) -> Option<TaskId> {
        self.target
    }

    /// The cache-local id of the speculative create record.
    pub fn placeholder_id(&self) -> Option<TaskId> {
        self.placeholder_id
    }

    /// Restores every snapshotted entry verbatim and discards the context.
    /// Entries removed outright (a deleted detail record) are not
    /// restorable; the next read refetches them.
    pub fn restore(self, cache: &mut QueryCache) {
        for (key, snap) in self.snapshots {
            cache.restore(key, snap);
        }
    }

    /// Wraps the remote failure that forced the rollback.
    pub fn failure(&self, source: RemoteError) -> MutationError {
        MutationError {
            kind: self.kind,
            id: self.target,
            source,
        }
    }
}

/// Prepends a speculative record to every populated list whose filter
/// admits it, snapshotting each list first.
pub fn apply_create(
    cache: &mut QueryCache,
    draft: TaskDraft,
    placeholder_id: TaskId,
) -> MutationContext {
    let record = draft.into_record(placeholder_id);
    let mut snapshots = Vec::new();

    for key in cache.list_keys() {
        let QueryKey::List(filter) = &key else {
            continue;
        };
        if !filter.admits(&record) {
            continue;
        }
        let Some(snap) = cache.snapshot(&key) else {
            continue;
        };
        let Some(old) = snap.value().as_many() else {
            continue;
        };
        let mut next = Vec::with_capacity(old.len() + 1);
        next.push(record.clone());
        next.extend_from_slice(old);
        snapshots.push((key.clone(), snap));
        cache.write(key, CachedValue::Many(next));
    }

    MutationContext {
        kind: MutationKind::Create,
        target: None,
        placeholder_id: Some(placeholder_id),
        prior_completed: None,
        snapshots,
    }
}

/// Substitutes the server-assigned record for the placeholder in every
/// list the optimistic create touched. The placeholder id never survives
/// resolution.
pub fn commit_create(cache: &mut QueryCache, ctx: MutationContext, server: &TaskRecord) {
    // Only contexts built by `apply_create` carry a placeholder; anything
    // else has no speculative record to substitute.
    let Some(placeholder) = ctx.placeholder_id else {
        return;
    };
    for (key, _) in &ctx.snapshots {
        let Some(CachedValue::Many(list)) = cache.read(key) else {
            continue;
        };
        let next: Vec<TaskRecord> = list
            .iter()
            .map(|t| if t.id == placeholder { server.clone() } else { t.clone() })
            .collect();
        cache.write(key.clone(), CachedValue::Many(next));
    }
}

/// Applies a partial patch in place to the detail entry (if present) and
/// to every cached list containing the target, snapshotting each touched
/// entry first.
pub fn apply_update(cache: &mut QueryCache, id: TaskId, patch: &TaskPatch) -> MutationContext {
    let prior_completed = cache.find_record(id).map(|r| r.completed);
    let mut snapshots = Vec::new();

    let detail = QueryKey::detail(id);
    if let Some(snap) = cache.snapshot(&detail) {
        if let Some(rec) = snap.value().as_one() {
            let mut patched = rec.clone();
            patch.apply_to(&mut patched);
            snapshots.push((detail.clone(), snap));
            cache.write(detail, CachedValue::One(patched));
        }
    }

    for key in cache.list_keys() {
        let Some(snap) = cache.snapshot(&key) else {
            continue;
        };
        let Some(old) = snap.value().as_many() else {
            continue;
        };
        if !old.iter().any(|t| t.id == id) {
            continue;
        }
        let next: Vec<TaskRecord> = old
            .iter()
            .map(|t| {
                if t.id == id {
                    let mut patched = t.clone();
                    patch.apply_to(&mut patched);
                    patched
                } else {
                    t.clone()
                }
            })
            .collect();
        snapshots.push((key.clone(), snap));
        cache.write(key, CachedValue::Many(next));
    }

    MutationContext {
        kind: MutationKind::Update,
        target: Some(id),
        placeholder_id: None,
        prior_completed,
        snapshots,
    }
}

/// Reconciles the authoritative server record into the cache. When the
/// completion flag flipped, the record migrates between the filtered
/// lists: removed from lists its filter no longer admits, updated or
/// prepended into the now-matching completed filter, with the position of
/// other entries preserved.
pub fn commit_update(cache: &mut QueryCache, ctx: MutationContext, server: &TaskRecord) {
    let id = server.id;
    cache.write(QueryKey::detail(id), CachedValue::One(server.clone()));

    let migrated = ctx
        .prior_completed
        .is_some_and(|prev| prev != server.completed);

    for key in cache.list_keys() {
        let QueryKey::List(filter) = &key else {
            continue;
        };
        let Some(CachedValue::Many(list)) = cache.read(&key) else {
            continue;
        };
        let present = list.iter().any(|t| t.id == id);

        let next: Option<Vec<TaskRecord>> = if !migrated {
            present.then(|| replace_by_id(list, id, server))
        } else if present && !filter.admits(server) && filter.search.is_none() {
            Some(list.iter().filter(|t| t.id != id).cloned().collect())
        } else if present {
            Some(replace_by_id(list, id, server))
        } else if filter.completed == Some(server.completed) && filter.admits(server) {
            let mut with = Vec::with_capacity(list.len() + 1);
            with.push(server.clone());
            with.extend(list.iter().cloned());
            Some(with)
        } else {
            None
        };

        if let Some(next) = next {
            cache.write(key, CachedValue::Many(next));
        }
    }
}

/// Removes the target from every cached list (snapshotting each) and drops
/// the detail entry outright. On success nothing further is needed; on
/// failure the list snapshots restore and the detail entry refetches on
/// next read.
pub fn apply_delete(cache: &mut QueryCache, id: TaskId) -> MutationContext {
    let mut snapshots = Vec::new();

    for key in cache.list_keys() {
        let Some(snap) = cache.snapshot(&key) else {
            continue;
        };
        let Some(old) = snap.value().as_many() else {
            continue;
        };
        if !old.iter().any(|t| t.id == id) {
            continue;
        }
        let next: Vec<TaskRecord> = old.iter().filter(|t| t.id != id).cloned().collect();
        snapshots.push((key.clone(), snap));
        cache.write(key, CachedValue::Many(next));
    }

    cache.remove(&QueryKey::detail(id));

    MutationContext {
        kind: MutationKind::Delete,
        target: Some(id),
        placeholder_id: None,
        prior_completed: None,
        snapshots,
    }
}

fn replace_by_id(list: &[TaskRecord], id: TaskId, server: &TaskRecord) -> Vec<TaskRecord> {
    list.iter()
        .map(|t| if t.id == id { server.clone() } else { t.clone() })
        .collect()
}
