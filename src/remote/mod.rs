//! Remote access to the task collection.
//!
//! This layer performs zero retries and zero caching; every failure is
//! surfaced as a [`RemoteError`] and the caller decides what to do with it.

/// HTTP implementation over reqwest.
pub mod http;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    cache::key::TaskFilter,
    schema::ValidationError,
    task::{TaskDraft, TaskPatch, TaskRecord},
    types::TaskId,
};

/// Operation name carried by [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    /// Collection fetch.
    List,
    /// Single-record fetch.
    Get,
    /// Record creation.
    Create,
    /// Partial update.
    Update,
    /// Record deletion.
    Delete,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => f.write_str("list"),
            Self::Get => f.write_str("get"),
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Why a remote call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteErrorKind {
    /// The target does not exist remotely.
    #[error("resource not found")]
    NotFound,
    /// Any other non-success response.
    #[error("unexpected status {0}")]
    Status(u16),
    /// The request never completed.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body was not decodable JSON.
    #[error("undecodable response body: {0}")]
    Decode(String),
    /// The response body decoded but failed schema validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// A remote call failed. Names the operation and the target id, if any.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote {op}{} failed: {kind}", fmt_target(*id))]
pub struct RemoteError {
    /// Which operation failed.
    pub op: RemoteOp,
    /// Target task, when the operation had one.
    pub id: Option<TaskId>,
    /// Failure detail.
    pub kind: RemoteErrorKind,
}

fn fmt_target(id: Option<TaskId>) -> String {
    match id {
        Some(id) => format!(" of task {id}"),
        None => String::new(),
    }
}

impl RemoteError {
    /// Builds an error for `op` against `id`.
    pub fn new(op: RemoteOp, id: Option<TaskId>, kind: RemoteErrorKind) -> Self {
        Self { op, id, kind }
    }

    /// True when the target does not exist remotely.
    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

/// Convenience alias for remote call results.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Asynchronous CRUD access to the remote task collection. The seam the
/// runtime suspends at; everything on the cache side of it is synchronous.
#[async_trait]
pub trait TaskRemote: Send + Sync + 'static {
    /// Fetches the collection, forwarding filter parameters verbatim.
    /// Filter combination semantics are server-defined.
    async fn list(&self, filter: &TaskFilter) -> RemoteResult<Vec<TaskRecord>>;

    /// Fetches a single record.
    async fn get(&self, id: TaskId) -> RemoteResult<TaskRecord>;

    /// Creates a record. The server assigns the id.
    async fn create(&self, draft: &TaskDraft) -> RemoteResult<TaskRecord>;

    /// Partially updates a record; omitted fields are untouched server-side.
    async fn update(&self, id: TaskId, patch: &TaskPatch) -> RemoteResult<TaskRecord>;

    /// Deletes a record.
    async fn delete(&self, id: TaskId) -> RemoteResult<()>;
}
