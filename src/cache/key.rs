//! Cache addressing: query keys, list filters, and cached value shapes.

use crate::task::TaskRecord;
use crate::types::{OwnerId, TaskId};

/// Canonical list filter. Two filters address the same cache slot iff all
/// fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TaskFilter {
    /// Keep only tasks with this completion state.
    pub completed: Option<bool>,
    /// Free-text search, forwarded verbatim; matching is server-defined.
    pub search: Option<String>,
    /// Keep only tasks owned by this user.
    pub owner_id: Option<OwnerId>,
}

impl TaskFilter {
    /// The unfiltered list.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter by completion state only.
    pub fn by_completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    /// Filter by owner only.
    pub fn by_owner(owner_id: OwnerId) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    /// True when `rec` belongs in this filter's list as far as the client
    /// can tell. Search matching is server-defined, so any filter with a
    /// search term admits nothing speculatively.
    pub fn admits(&self, rec: &TaskRecord) -> bool {
        if self.search.is_some() {
            return false;
        }
        if self.completed.is_some_and(|c| c != rec.completed) {
            return false;
        }
        if self.owner_id.is_some_and(|o| o != rec.owner_id) {
            return false;
        }
        true
    }
}

/// Cache slot address: a query kind plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// A filtered collection of tasks.
    List(TaskFilter),
    /// A single task by id.
    Detail(TaskId),
}

impl QueryKey {
    /// Key for the unfiltered list.
    pub fn list_all() -> Self {
        Self::List(TaskFilter::all())
    }

    /// Key for a filtered list.
    pub fn list(filter: TaskFilter) -> Self {
        Self::List(filter)
    }

    /// Key for a single record.
    pub fn detail(id: TaskId) -> Self {
        Self::Detail(id)
    }

    /// True for list keys.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

/// Data held by a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    /// A single record (detail queries).
    One(TaskRecord),
    /// An ordered collection (list queries).
    Many(Vec<TaskRecord>),
}

impl CachedValue {
    /// The single record, if this is a detail value.
    pub fn as_one(&self) -> Option<&TaskRecord> {
        match self {
            Self::One(rec) => Some(rec),
            Self::Many(_) => None,
        }
    }

    /// The collection, if this is a list value.
    pub fn as_many(&self) -> Option<&[TaskRecord]> {
        match self {
            Self::One(_) => None,
            Self::Many(recs) => Some(recs),
        }
    }

    /// True when a record with `id` is present in this value.
    pub fn contains_id(&self, id: TaskId) -> bool {
        match self {
            Self::One(rec) => rec.id == id,
            Self::Many(recs) => recs.iter().any(|r| r.id == id),
        }
    }
}
