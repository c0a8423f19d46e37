//! Client-side cache synchronization for a remote task collection, with
//! optimistic mutations and exact rollback.
//!
//! # Examples
//!
//! Synchronous cache usage with [`cache::store::QueryCache`]:
//! ```
//! use std::time::Duration;
//! use todosync::{
//!     cache::{
//!         key::{CachedValue, QueryKey},
//!         store::QueryCache,
//!     },
//!     task::TaskRecord,
//! };
//!
//! let mut cache = QueryCache::new(Duration::from_secs(30));
//! let key = QueryKey::list_all();
//! cache.write(
//!     key.clone(),
//!     CachedValue::Many(vec![TaskRecord {
//!         id: 1,
//!         owner_id: 1,
//!         title: "buy milk".to_string(),
//!         completed: false,
//!     }]),
//! );
//! assert!(cache.is_fresh(&key));
//! ```
//!
//! Runtime usage against an HTTP endpoint:
//! ```no_run
//! use std::sync::Arc;
//! use todosync::{
//!     cache::key::TaskFilter,
//!     remote::http::HttpRemote,
//!     runtime::handle::{spawn_todosync, RuntimeConfig},
//!     task::TaskDraft,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let remote = Arc::new(HttpRemote::new("https://todos.example.net"));
//! let handle = spawn_todosync(remote, RuntimeConfig::default());
//! let created = handle.create_task(TaskDraft {
//!     owner_id: 1,
//!     title: "new task".to_string(),
//!     completed: false,
//! }).await.expect("create");
//! let all = handle.list_tasks(TaskFilter::all()).await.expect("list");
//! assert!(all.iter().any(|t| t.id == created.id));
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Query cache store, keys, and entry lifecycle.
pub mod cache;
/// Optimistic mutation coordinator and rollback contexts.
pub mod mutate;
/// Remote access trait, errors, and HTTP implementation.
pub mod remote;
/// Runtime loop, handle, and event stream.
pub mod runtime;
/// Payload validation at the trust boundary.
pub mod schema;
/// Task domain records, drafts, and patches.
pub mod task;
/// Shared primitive types and id namespaces.
pub mod types;
