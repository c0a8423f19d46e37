//! Event stream payloads for reactive consumers.

use crate::{cache::key::QueryKey, mutate::MutationKind, types::TaskId};

/// Cache-change events broadcast by the runtime loop so a view layer can
/// re-render without polling. Optimistic applies are announced as well as
/// terminal resolutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A fetch resolved and refreshed this cache slot.
    Refreshed {
        /// Slot that now holds fresh data.
        key: QueryKey,
    },
    /// A speculative mutation was written to the cache; resolution pending.
    Applied {
        /// Mutation kind.
        kind: MutationKind,
        /// Target id; the placeholder id for creates.
        id: TaskId,
    },
    /// A create committed with its server-assigned id.
    Created {
        /// Server-assigned id.
        id: TaskId,
    },
    /// An update committed.
    Updated {
        /// Updated task id.
        id: TaskId,
    },
    /// A delete committed.
    Deleted {
        /// Deleted task id.
        id: TaskId,
    },
    /// A mutation failed and every touched entry was restored.
    RolledBack {
        /// Mutation kind.
        kind: MutationKind,
        /// Target id; the placeholder id for creates.
        id: TaskId,
    },
    /// All list entries were explicitly marked stale.
    ListsInvalidated,
}
