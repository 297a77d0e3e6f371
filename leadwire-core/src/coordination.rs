//! Coordination-service seam consumed by the leader watcher.
//!
//! The watcher never talks to a concrete ensemble client. It dials through a
//! [`Connector`] and reads through a [`CoordinationClient`], which lets the
//! same watcher run against a real ensemble or the in-memory ensemble used in
//! tests.

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Session lifecycle notifications, delivered asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is (re)connected to an ensemble member
    Connected,
    /// The connection dropped; the session may still be recovered
    Disconnected,
    /// The session is gone along with its ephemeral nodes and watches
    Expired,
}

/// Notification delivered by a one-shot watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    ChildrenChanged { path: String },
    NodeDeleted { path: String },
}

/// Metadata returned alongside node data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStat {
    /// Data version, bumped on every write
    pub version: i64,
    /// Transaction id that created the node
    pub created_txn: u64,
    /// Owning session for ephemeral nodes
    pub ephemeral_owner: Option<u64>,
    pub num_children: usize,
}

/// Receiver side of a one-shot watch. A dropped sender means the watch was
/// discarded, e.g. because the session expired.
pub type ChildWatch = oneshot::Receiver<WatchEvent>;

/// Stream of session lifecycle events for one dialed session.
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Node read/watch primitives of a live coordination session.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Lists the child node names of `path`.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Lists the child node names of `path` and installs a one-shot watch
    /// that fires on the next change to that set.
    async fn children_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch)>;

    /// Reads the data stored at `path`.
    async fn get(&self, path: &str) -> Result<(Bytes, NodeStat)>;

    /// Closes the session. Ephemeral nodes owned by it are removed.
    async fn close(&self);
}

/// Dials a coordination ensemble.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a session against any reachable host of `hosts`.
    async fn connect(&self, hosts: &[String]) -> Result<(Arc<dyn CoordinationClient>, SessionEvents)>;
}

/// Joins a parent path and a child name.
///
/// ```rust
/// use leadwire_core::coordination::join_path;
///
/// assert_eq!(join_path("/mesos", "info_1"), "/mesos/info_1");
/// assert_eq!(join_path("/mesos/", "info_1"), "/mesos/info_1");
/// assert_eq!(join_path("/", "info_1"), "/info_1");
/// ```
pub fn join_path(parent: &str, child: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), child)
}

/// Parent path of `path`, `/` for top-level nodes.
pub fn parent_path(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}
