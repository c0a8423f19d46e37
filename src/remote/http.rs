//! Reqwest-backed implementation of [`TaskRemote`].

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    cache::key::TaskFilter,
    schema,
    task::{TaskDraft, TaskPatch, TaskRecord},
    types::TaskId,
};

use super::{RemoteError, RemoteErrorKind, RemoteOp, RemoteResult, TaskRemote};

/// REST client for the task collection endpoint.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    /// Creates a client for the service at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Creates a client reusing a preconfigured [`reqwest::Client`], e.g.
    /// one with a request timeout.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.base_url)
    }

    fn task_url(&self, id: TaskId) -> String {
        format!("{}/tasks/{id}", self.base_url)
    }

    async fn read_body(
        op: RemoteOp,
        id: Option<TaskId>,
        resp: reqwest::Response,
    ) -> RemoteResult<Value> {
        let status = resp.status();
        if !status.is_success() {
            let kind = if status == reqwest::StatusCode::NOT_FOUND {
                RemoteErrorKind::NotFound
            } else {
                RemoteErrorKind::Status(status.as_u16())
            };
            return Err(RemoteError::new(op, id, kind));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| RemoteError::new(op, id, RemoteErrorKind::Decode(e.to_string())))
    }

    fn transport(op: RemoteOp, id: Option<TaskId>, err: reqwest::Error) -> RemoteError {
        RemoteError::new(op, id, RemoteErrorKind::Transport(err.to_string()))
    }

    fn validated(op: RemoteOp, id: Option<TaskId>, body: &Value) -> RemoteResult<TaskRecord> {
        schema::validate_task(body).map_err(|e| RemoteError::new(op, id, e.into()))
    }
}

#[async_trait]
impl TaskRemote for HttpRemote {
    async fn list(&self, filter: &TaskFilter) -> RemoteResult<Vec<TaskRecord>> {
        let op = RemoteOp::List;
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(completed) = filter.completed {
            params.push(("completed", completed.to_string()));
        }
        if let Some(search) = &filter.search {
            params.push(("search", search.clone()));
        }
        if let Some(owner_id) = filter.owner_id {
            params.push(("ownerId", owner_id.to_string()));
        }
        debug!(?filter, "GET /tasks");

        let resp = self
            .client
            .get(self.tasks_url())
            .query(&params)
            .send()
            .await
            .map_err(|e| Self::transport(op, None, e))?;
        let body = Self::read_body(op, None, resp).await?;

        let items = body.as_array().ok_or_else(|| {
            RemoteError::new(op, None, RemoteErrorKind::Decode("expected a JSON array".into()))
        })?;
        items
            .iter()
            .map(|item| Self::validated(op, None, item))
            .collect()
    }

    async fn get(&self, id: TaskId) -> RemoteResult<TaskRecord> {
        let op = RemoteOp::Get;
        debug!(id, "GET /tasks/{{id}}");
        let resp = self
            .client
            .get(self.task_url(id))
            .send()
            .await
            .map_err(|e| Self::transport(op, Some(id), e))?;
        let body = Self::read_body(op, Some(id), resp).await?;
        Self::validated(op, Some(id), &body)
    }

    async fn create(&self, draft: &TaskDraft) -> RemoteResult<TaskRecord> {
        let op = RemoteOp::Create;
        debug!(owner_id = draft.owner_id, "POST /tasks");
        let resp = self
            .client
            .post(self.tasks_url())
            .json(draft)
            .send()
            .await
            .map_err(|e| Self::transport(op, None, e))?;
        let body = Self::read_body(op, None, resp).await?;
        Self::validated(op, None, &body)
    }

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> RemoteResult<TaskRecord> {
        let op = RemoteOp::Update;
        debug!(id, "PATCH /tasks/{{id}}");
        let resp = self
            .client
            .patch(self.task_url(id))
            .json(patch)
            .send()
            .await
            .map_err(|e| Self::transport(op, Some(id), e))?;
        let body = Self::read_body(op, Some(id), resp).await?;
        Self::validated(op, Some(id), &body)
    }

    async fn delete(&self, id: TaskId) -> RemoteResult<()> {
        let op = RemoteOp::Delete;
        debug!(id, "DELETE /tasks/{{id}}");
        let resp = self
            .client
            .delete(self.task_url(id))
            .send()
            .await
            .map_err(|e| Self::transport(op, Some(id), e))?;
        let status = resp.status();
        if !status.is_success() {
            let kind = if status == reqwest::StatusCode::NOT_FOUND {
                RemoteErrorKind::NotFound
            } else {
                RemoteErrorKind::Status(status.as_u16())
            };
            return Err(RemoteError::new(op, Some(id), kind));
        }
        Ok(())
    }
}
