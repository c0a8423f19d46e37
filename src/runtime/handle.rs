//! Single-writer runtime loop and its cloneable handle.
//!
//! One tokio task exclusively owns the [`QueryCache`]. Calls arrive as
//! commands over an mpsc channel and answer through oneshot responders.
//! Remote round-trips run in spawned tasks and report back through an
//! internal completion channel the loop selects on, so the loop is never
//! suspended on the network and every reader between suspension points
//! observes a fully consistent cache.

use std::{sync::Arc, time::Duration};

use hashbrown::HashMap;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    cache::{
        key::{CachedValue, QueryKey, TaskFilter},
        store::QueryCache,
    },
    mutate::{
        self, MutationContext, MutationError, MutationKind, PlaceholderIds,
    },
    remote::{RemoteError, TaskRemote},
    schema::{self, ValidationError},
    task::{TaskDraft, TaskPatch, TaskRecord},
    types::{TaskId, TicketId},
};

use super::events::TaskEvent;

/// Errors surfaced by [`TodoHandle`] calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// An outbound payload failed validation; nothing was sent or cached.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A fetch failed; the cache entry was left as it was before the fetch.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// A mutation failed; the cache was rolled back before this was raised.
    #[error(transparent)]
    Mutation(#[from] MutationError),
    /// The operation needs a cached record that is not present.
    #[error("task {0} is not cached")]
    NotFound(TaskId),
    /// The runtime loop is gone.
    #[error("runtime channel closed")]
    ChannelClosed,
}

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long a fetched entry stays fresh before it is eligible for
    /// refetch.
    pub stale_after: Duration,
    /// Bound of the command channel into the loop.
    pub command_queue_bound: usize,
    /// Capacity of the broadcast event buffer.
    pub event_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            command_queue_bound: 256,
            event_buffer: 1024,
        }
    }
}

/// Cloneable handle to the runtime loop.
pub struct TodoHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<TaskEvent>,
}

impl Clone for TodoHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

type RecordResp = oneshot::Sender<Result<TaskRecord, ClientError>>;
type ListResp = oneshot::Sender<Result<Vec<TaskRecord>, ClientError>>;
type UnitResp = oneshot::Sender<Result<(), ClientError>>;

enum Command {
    ListTasks {
        filter: TaskFilter,
        resp: ListResp,
    },
    GetTask {
        id: TaskId,
        resp: RecordResp,
    },
    PeekList {
        filter: TaskFilter,
        resp: oneshot::Sender<Option<Vec<TaskRecord>>>,
    },
    PeekTask {
        id: TaskId,
        resp: oneshot::Sender<Option<TaskRecord>>,
    },
    CreateTask {
        draft: TaskDraft,
        resp: RecordResp,
    },
    UpdateTask {
        id: TaskId,
        patch: TaskPatch,
        resp: RecordResp,
    },
    DeleteTask {
        id: TaskId,
        resp: UnitResp,
    },
    ToggleTask {
        id: TaskId,
        resp: RecordResp,
    },
    InvalidateLists {
        resp: oneshot::Sender<()>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

enum MutationOutcome {
    Record(TaskRecord),
    Deleted,
}

enum Done {
    Fetch {
        key: QueryKey,
        result: Result<CachedValue, RemoteError>,
    },
    Mutation {
        ticket: TicketId,
        result: Result<MutationOutcome, RemoteError>,
    },
}

enum Waiter {
    List(ListResp),
    Detail(RecordResp),
}

enum Responder {
    Record(RecordResp),
    Unit(UnitResp),
}

struct PendingMutation {
    ctx: MutationContext,
    resp: Responder,
}

/// Spawns the runtime loop over `remote` and returns its handle.
pub fn spawn_todosync(remote: Arc<dyn TaskRemote>, config: RuntimeConfig) -> TodoHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (events_tx, _) = broadcast::channel::<TaskEvent>(config.event_buffer);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Done>();

    let events_tx_loop = events_tx.clone();
    tokio::spawn(async move {
        let mut state = LoopState {
            cache: QueryCache::new(config.stale_after),
            remote,
            events_tx: events_tx_loop,
            done_tx,
            waiters: HashMap::new(),
            pending: HashMap::new(),
            placeholders: PlaceholderIds::new(),
            next_ticket: 1,
        };

        let mut shutdown_resp = None;
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None => break,
                        Some(Command::Shutdown { resp }) => {
                            shutdown_resp = Some(resp);
                            break;
                        }
                        Some(cmd) => state.handle_command(cmd),
                    }
                }
                done = done_rx.recv() => {
                    let Some(done) = done else { break };
                    state.handle_done(done);
                }
            }
        }

        // Every in-flight mutation still resolves to a commit or rollback
        // before shutdown is acknowledged.
        if let Some(resp) = shutdown_resp {
            while !state.pending.is_empty() {
                let Some(done) = done_rx.recv().await else { break };
                state.handle_done(done);
            }
            let _ = resp.send(());
        }
    });

    TodoHandle { cmd_tx, events_tx }
}

struct LoopState {
    cache: QueryCache,
    remote: Arc<dyn TaskRemote>,
    events_tx: broadcast::Sender<TaskEvent>,
    done_tx: mpsc::UnboundedSender<Done>,
    waiters: HashMap<QueryKey, Vec<Waiter>>,
    pending: HashMap<TicketId, PendingMutation>,
    placeholders: PlaceholderIds,
    next_ticket: TicketId,
}

impl LoopState {
    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::ListTasks { filter, resp } => {
                let key = QueryKey::list(filter.clone());
                if self.cache.is_fresh(&key) {
                    if let Some(CachedValue::Many(list)) = self.cache.read(&key) {
                        let _ = resp.send(Ok(list.clone()));
                        return;
                    }
                }
                self.attach_fetch(key.clone(), Waiter::List(resp));
                if self.cache.begin_fetch(&key) {
                    let remote = Arc::clone(&self.remote);
                    let done_tx = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = remote.list(&filter).await.map(CachedValue::Many);
                        let _ = done_tx.send(Done::Fetch { key, result });
                    });
                }
            }
            Command::GetTask { id, resp } => {
                let key = QueryKey::detail(id);
                if self.cache.is_fresh(&key) {
                    if let Some(CachedValue::One(rec)) = self.cache.read(&key) {
                        let _ = resp.send(Ok(rec.clone()));
                        return;
                    }
                }
                self.attach_fetch(key.clone(), Waiter::Detail(resp));
                if self.cache.begin_fetch(&key) {
                    let remote = Arc::clone(&self.remote);
                    let done_tx = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = remote.get(id).await.map(CachedValue::One);
                        let _ = done_tx.send(Done::Fetch { key, result });
                    });
                }
            }
            Command::PeekList { filter, resp } => {
                let key = QueryKey::list(filter);
                let list = match self.cache.read(&key) {
                    Some(CachedValue::Many(list)) => Some(list.clone()),
                    _ => None,
                };
                let _ = resp.send(list);
            }
            Command::PeekTask { id, resp } => {
                let _ = resp.send(self.cache.find_record(id).cloned());
            }
            Command::CreateTask { draft, resp } => {
                if let Err(e) = schema::validate_draft(&draft) {
                    let _ = resp.send(Err(ClientError::Validation(e)));
                    return;
                }
                let placeholder = self.placeholders.next();
                let ctx = mutate::apply_create(&mut self.cache, draft.clone(), placeholder);
                let _ = self.events_tx.send(TaskEvent::Applied {
                    kind: MutationKind::Create,
                    id: placeholder,
                });
                let ticket = self.enqueue(ctx, Responder::Record(resp));
                let remote = Arc::clone(&self.remote);
                let done_tx = self.done_tx.clone();
                tokio::spawn(async move {
                    let result = remote.create(&draft).await.map(MutationOutcome::Record);
                    let _ = done_tx.send(Done::Mutation { ticket, result });
                });
            }
            Command::UpdateTask { id, patch, resp } => {
                self.begin_update(id, patch, resp);
            }
            Command::DeleteTask { id, resp } => {
                let ctx = mutate::apply_delete(&mut self.cache, id);
                let _ = self.events_tx.send(TaskEvent::Applied {
                    kind: MutationKind::Delete,
                    id,
                });
                let ticket = self.enqueue(ctx, Responder::Unit(resp));
                let remote = Arc::clone(&self.remote);
                let done_tx = self.done_tx.clone();
                tokio::spawn(async move {
                    let result = remote.delete(id).await.map(|()| MutationOutcome::Deleted);
                    let _ = done_tx.send(Done::Mutation { ticket, result });
                });
            }
            Command::ToggleTask { id, resp } => {
                let Some(rec) = self.cache.find_record(id) else {
                    let _ = resp.send(Err(ClientError::NotFound(id)));
                    return;
                };
                let patch = TaskPatch {
                    completed: Some(!rec.completed),
                    ..TaskPatch::default()
                };
                self.begin_update(id, patch, resp);
            }
            Command::InvalidateLists { resp } => {
                self.cache.invalidate_lists();
                let _ = self.events_tx.send(TaskEvent::ListsInvalidated);
                let _ = resp.send(());
            }
            Command::Shutdown { .. } => unreachable!("handled by the loop"),
        }
    }

    fn begin_update(&mut self, id: TaskId, patch: TaskPatch, resp: RecordResp) {
        if let Err(e) = schema::validate_patch(&patch) {
            let _ = resp.send(Err(ClientError::Validation(e)));
            return;
        }
        let ctx = mutate::apply_update(&mut self.cache, id, &patch);
        let _ = self.events_tx.send(TaskEvent::Applied {
            kind: MutationKind::Update,
            id,
        });
        let ticket = self.enqueue(ctx, Responder::Record(resp));
        let remote = Arc::clone(&self.remote);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = remote.update(id, &patch).await.map(MutationOutcome::Record);
            let _ = done_tx.send(Done::Mutation { ticket, result });
        });
    }

    fn attach_fetch(&mut self, key: QueryKey, waiter: Waiter) {
        self.waiters.entry(key).or_default().push(waiter);
    }

    fn enqueue(&mut self, ctx: MutationContext, resp: Responder) -> TicketId {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(ticket, PendingMutation { ctx, resp });
        ticket
    }

    fn handle_done(&mut self, done: Done) {
        match done {
            Done::Fetch { key, result } => self.finish_fetch(key, result),
            Done::Mutation { ticket, result } => self.finish_mutation(ticket, result),
        }
    }

    fn finish_fetch(&mut self, key: QueryKey, result: Result<CachedValue, RemoteError>) {
        let waiters = self.waiters.remove(&key).unwrap_or_default();
        match result {
            Ok(value) => {
                if self.cache.finish_fetch(&key, value.clone()) {
                    debug!(?key, "fetch resolved fresh");
                    let _ = self.events_tx.send(TaskEvent::Refreshed { key });
                }
                for waiter in waiters {
                    match (waiter, &value) {
                        (Waiter::List(tx), CachedValue::Many(list)) => {
                            let _ = tx.send(Ok(list.clone()));
                        }
                        (Waiter::Detail(tx), CachedValue::One(rec)) => {
                            let _ = tx.send(Ok(rec.clone()));
                        }
                        // A waiter never attaches to a key of the other shape.
                        (Waiter::List(tx), CachedValue::One(_)) => drop(tx),
                        (Waiter::Detail(tx), CachedValue::Many(_)) => drop(tx),
                    }
                }
            }
            Err(err) => {
                warn!(?key, %err, "fetch failed; entry left untouched");
                self.cache.fail_fetch(&key);
                for waiter in waiters {
                    match waiter {
                        Waiter::List(tx) => {
                            let _ = tx.send(Err(ClientError::Remote(err.clone())));
                        }
                        Waiter::Detail(tx) => {
                            let _ = tx.send(Err(ClientError::Remote(err.clone())));
                        }
                    }
                }
            }
        }
    }

    fn finish_mutation(&mut self, ticket: TicketId, result: Result<MutationOutcome, RemoteError>) {
        let Some(PendingMutation { ctx, resp }) = self.pending.remove(&ticket) else {
            return;
        };

        match result {
            Ok(MutationOutcome::Record(server)) => {
                let id = server.id;
                let event = match ctx.kind() {
                    MutationKind::Create => {
                        mutate::commit_create(&mut self.cache, ctx, &server);
                        TaskEvent::Created { id }
                    }
                    MutationKind::Update => {
                        mutate::commit_update(&mut self.cache, ctx, &server);
                        TaskEvent::Updated { id }
                    }
                    // Delete round-trips resolve with `Deleted`, never a record.
                    MutationKind::Delete => TaskEvent::Deleted { id },
                };
                let _ = self.events_tx.send(event);
                match resp {
                    Responder::Record(tx) => {
                        let _ = tx.send(Ok(server));
                    }
                    Responder::Unit(tx) => {
                        let _ = tx.send(Ok(()));
                    }
                }
            }
            Ok(MutationOutcome::Deleted) => {
                // Optimistic removal already happened; nothing to reconcile.
                let id = ctx.target().unwrap_or_default();
                let _ = self.events_tx.send(TaskEvent::Deleted { id });
                match resp {
                    Responder::Unit(tx) => {
                        let _ = tx.send(Ok(()));
                    }
                    Responder::Record(tx) => drop(tx),
                }
            }
            Err(remote_err) => {
                let err = ctx.failure(remote_err);
                let kind = ctx.kind();
                let id = ctx.target().or(ctx.placeholder_id()).unwrap_or_default();
                warn!(%kind, id, %err, "mutation failed; rolling back");
                ctx.restore(&mut self.cache);
                let _ = self.events_tx.send(TaskEvent::RolledBack { kind, id });
                match resp {
                    Responder::Record(tx) => {
                        let _ = tx.send(Err(ClientError::Mutation(err)));
                    }
                    Responder::Unit(tx) => {
                        let _ = tx.send(Err(ClientError::Mutation(err)));
                    }
                }
            }
        }
    }
}

impl TodoHandle {
    /// Subscribes to the cache-change event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events_tx.subscribe()
    }

    /// Returns the filtered collection: from cache when fresh, otherwise
    /// fetched. Concurrent calls for the same filter share one network
    /// request.
    pub async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<TaskRecord>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ListTasks { filter, resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Returns a single task: from cache when fresh, otherwise fetched.
    pub async fn get_task(&self, id: TaskId) -> Result<TaskRecord, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetTask { id, resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Returns whatever the cache currently holds for the filter, without
    /// triggering a fetch. Stale and speculative data are served as-is.
    pub async fn peek_list(
        &self,
        filter: TaskFilter,
    ) -> Result<Option<Vec<TaskRecord>>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::PeekList { filter, resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Returns the cached record for `id` from the detail entry or any
    /// cached list, without triggering a fetch.
    pub async fn peek_task(&self, id: TaskId) -> Result<Option<TaskRecord>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::PeekTask { id, resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Creates a task. The speculative record is visible in matching
    /// cached lists immediately; the returned record carries the
    /// server-assigned id.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<TaskRecord, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::CreateTask { draft, resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Partially updates a task, applying the patch to every affected
    /// cache entry immediately.
    pub async fn update_task(
        &self,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<TaskRecord, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::UpdateTask { id, patch, resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Deletes a task, removing it from every affected cache entry
    /// immediately.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::DeleteTask { id, resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Flips the completion flag of a cached task. Fails with
    /// [`ClientError::NotFound`] when no cache entry holds the record.
    pub async fn toggle_task(&self, id: TaskId) -> Result<TaskRecord, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ToggleTask { id, resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Marks every cached list stale; the next `list_tasks` refetches.
    pub async fn invalidate_lists(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::InvalidateLists { resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Stops the loop after every in-flight mutation has committed or
    /// rolled back.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }
}
