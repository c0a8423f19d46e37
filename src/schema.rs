//! Payload validation at the trust boundary.
//!
//! Every payload decoded from the remote collection passes through
//! [`validate_task`] before it may enter the cache; outbound create and
//! update payloads are checked by [`validate_draft`] and [`validate_patch`]
//! before they are sent.

use serde_json::Value;
use thiserror::Error;

use crate::task::{TaskDraft, TaskPatch, TaskRecord};

/// A payload failed validation. Names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    /// Field that failed validation.
    pub field: &'static str,
    /// Human-readable rule that was violated.
    pub reason: &'static str,
}

impl ValidationError {
    fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

/// Validates a decoded payload into a full [`TaskRecord`].
///
/// Rules: `id` and `ownerId` are positive integers, `title` has minimum
/// length 1, `completed` is a boolean.
pub fn validate_task(value: &Value) -> Result<TaskRecord, ValidationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ValidationError::new("record", "expected a JSON object"))?;

    let id = obj
        .get("id")
        .and_then(Value::as_u64)
        .filter(|v| *v > 0)
        .ok_or_else(|| ValidationError::new("id", "expected a positive integer"))?;

    let owner_id = obj
        .get("ownerId")
        .and_then(Value::as_u64)
        .filter(|v| *v > 0)
        .ok_or_else(|| ValidationError::new("ownerId", "expected a positive integer"))?;

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::new("title", "expected a string"))?;
    if title.is_empty() {
        return Err(ValidationError::new("title", "minimum length 1"));
    }

    let completed = obj
        .get("completed")
        .and_then(Value::as_bool)
        .ok_or_else(|| ValidationError::new("completed", "expected a boolean"))?;

    Ok(TaskRecord {
        id,
        owner_id,
        title: title.to_string(),
        completed,
    })
}

/// Validates a create payload before it is sent.
pub fn validate_draft(draft: &TaskDraft) -> Result<(), ValidationError> {
    if draft.owner_id == 0 {
        return Err(ValidationError::new("ownerId", "expected a positive integer"));
    }
    if draft.title.is_empty() {
        return Err(ValidationError::new("title", "minimum length 1"));
    }
    Ok(())
}

/// Validates an update payload before it is sent. Present fields follow the
/// same rules as on a full record; a patch with no fields set is rejected.
pub fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::new("patch", "no fields set"));
    }
    if patch.owner_id == Some(0) {
        return Err(ValidationError::new("ownerId", "expected a positive integer"));
    }
    if patch.title.as_deref() == Some("") {
        return Err(ValidationError::new("title", "minimum length 1"));
    }
    Ok(())
}
