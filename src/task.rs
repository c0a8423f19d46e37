//! Task domain record, draft, and patch types.

use serde::{Deserialize, Serialize};

use crate::types::{OwnerId, TaskId};

/// Fully materialized task record as held by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Stable server-assigned identifier.
    pub id: TaskId,
    /// Owning user.
    #[serde(rename = "ownerId")]
    pub owner_id: OwnerId,
    /// Task text. Never empty in cache.
    pub title: String,
    /// Completion flag.
    pub completed: bool,
}

/// Create payload. The server assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Owning user.
    #[serde(rename = "ownerId")]
    pub owner_id: OwnerId,
    /// Task text.
    pub title: String,
    /// Completion flag; absent means not completed.
    #[serde(default)]
    pub completed: bool,
}

impl TaskDraft {
    /// Materializes the speculative record the cache holds while the
    /// create round-trip is in flight.
    pub fn into_record(self, placeholder_id: TaskId) -> TaskRecord {
        TaskRecord {
            id: placeholder_id,
            owner_id: self.owner_id,
            title: self.title,
            completed: self.completed,
        }
    }
}

/// Sparse update where each `Some` field overwrites the record value.
/// Fields left `None` are untouched server-side (PATCH semantics).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Optional replacement for the owning user.
    #[serde(rename = "ownerId", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,
    /// Optional replacement for the title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional replacement for the completion flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut TaskRecord) {
        if let Some(v) = self.owner_id {
            rec.owner_id = v;
        }
        if let Some(v) = &self.title {
            rec.title = v.clone();
        }
        if let Some(v) = self.completed {
            rec.completed = v;
        }
    }
}
