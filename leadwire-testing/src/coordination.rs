//! In-memory coordination ensemble.
//!
//! Implements the coordination seam with ephemeral sequential nodes,
//! one-shot child watches and session lifecycle events, plus knobs to
//! simulate disconnects, session expiry, unreachable hosts and failing reads.

use async_trait::async_trait;
use bytes::Bytes;
use leadwire_core::coordination::{
    parent_path, ChildWatch, Connector, CoordinationClient, NodeStat, SessionEvent, SessionEvents, WatchEvent,
};
use leadwire_core::{CoreError, LeaderInfo, MemberFormat, PayloadCodec, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

#[derive(Debug, Clone)]
struct Node {
    data: Bytes,
    version: i64,
    created_txn: u64,
    ephemeral_owner: Option<u64>,
}

struct ClientSession {
    events: mpsc::UnboundedSender<SessionEvent>,
    connected: bool,
}

struct PendingWatch {
    session: u64,
    sender: oneshot::Sender<WatchEvent>,
}

#[derive(Default)]
struct EnsembleState {
    nodes: BTreeMap<String, Node>,
    sequences: HashMap<String, u64>,
    watches: HashMap<String, Vec<PendingWatch>>,
    sessions: HashMap<u64, ClientSession>,
    next_session: u64,
    txn: u64,
    unreachable: bool,
    connect_delay: Option<Duration>,
    get_delay: Option<Duration>,
    list_delay: Option<Duration>,
    failing_gets: usize,
    failing_lists: usize,
    connects: usize,
}

impl EnsembleState {
    fn children_of(&self, path: &str) -> Result<Vec<String>> {
        if !self.nodes.contains_key(path) {
            return Err(CoreError::no_node(path));
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{}/", path) };
        Ok(self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(name, _)| name.starts_with(&prefix))
            .filter(|(name, _)| name.len() > prefix.len() && !name[prefix.len()..].contains('/'))
            .map(|(name, _)| name[prefix.len()..].to_string())
            .collect())
    }

    fn insert(&mut self, path: String, data: Bytes, ephemeral_owner: Option<u64>) {
        self.txn += 1;
        let node = Node {
            data,
            version: 0,
            created_txn: self.txn,
            ephemeral_owner,
        };
        let parent = parent_path(&path).to_string();
        self.nodes.insert(path, node);
        self.fire(&parent);
    }

    fn remove(&mut self, path: &str) -> bool {
        let removed = self.nodes.remove(path).is_some();
        if removed {
            self.fire(parent_path(path));
        }
        removed
    }

    fn fire(&mut self, parent: &str) {
        if let Some(watches) = self.watches.remove(parent) {
            debug!("Firing {} child watches on {}", watches.len(), parent);
            for watch in watches {
                let _ = watch.sender.send(WatchEvent::ChildrenChanged {
                    path: parent.to_string(),
                });
            }
        }
    }

    fn check(&self, session: u64) -> Result<()> {
        match self.sessions.get(&session) {
            None => Err(CoreError::SessionExpired),
            Some(_) if self.unreachable => Err(CoreError::connection("ensemble unreachable")),
            Some(entry) if !entry.connected => Err(CoreError::connection("session disconnected")),
            Some(_) => Ok(()),
        }
    }

    fn drop_session(&mut self, session: u64) -> Option<ClientSession> {
        let entry = self.sessions.remove(&session)?;
        for watches in self.watches.values_mut() {
            watches.retain(|watch| watch.session != session);
        }
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            self.remove(&path);
        }
        Some(entry)
    }
}

/// Shared in-memory ensemble. Clones observe the same state.
#[derive(Clone, Default)]
pub struct InMemoryEnsemble {
    state: Arc<Mutex<EnsembleState>>,
}

impl InMemoryEnsemble {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensemble with `path` (and its ancestors) already created.
    pub fn with_path(path: &str) -> Self {
        let ensemble = Self::new();
        ensemble.create_path(path);
        ensemble
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(InMemoryConnector {
            ensemble: self.clone(),
        })
    }

    /// Creates a persistent node and any missing ancestors.
    pub fn create_path(&self, path: &str) {
        let mut state = self.state.lock();
        state.nodes.entry("/".to_string()).or_insert(Node {
            data: Bytes::new(),
            version: 0,
            created_txn: 0,
            ephemeral_owner: None,
        });

        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            if !state.nodes.contains_key(&current) {
                state.insert(current.clone(), Bytes::new(), None);
            }
        }
    }

    /// Creates a child node with an explicit name.
    pub fn create_member(&self, parent: &str, name: &str, data: impl Into<Bytes>) {
        let path = format!("{}/{}", parent.trim_end_matches('/'), name);
        self.state.lock().insert(path, data.into(), None);
    }

    /// Registers a candidate the way an elected process does: an ephemeral
    /// sequential node carrying its encoded leader info. Returns the node
    /// name.
    pub fn join(&self, parent: &str, format: MemberFormat, info: &LeaderInfo) -> Result<String> {
        let prefix = match format {
            MemberFormat::Json => "json.info_",
            MemberFormat::Binary => "info_",
        };
        let data = encode_info(format, info)?;

        let mut state = self.state.lock();
        let sequence = state.sequences.entry(parent.to_string()).or_insert(0);
        let name = format!("{}{:010}", prefix, *sequence);
        *sequence += 1;

        // Candidates own a session of their own
        state.next_session += 1;
        let owner = state.next_session;
        state.insert(format!("{}/{}", parent.trim_end_matches('/'), name), data, Some(owner));
        Ok(name)
    }

    /// Replaces every child of `parent` at once, firing watches a single time.
    pub fn reset_members(&self, parent: &str, members: &[(String, Bytes)]) {
        let mut state = self.state.lock();
        let prefix = format!("{}/", parent.trim_end_matches('/'));
        state.nodes.retain(|path, _| !(path.starts_with(&prefix) && !path[prefix.len()..].contains('/')));
        for (name, data) in members {
            state.txn += 1;
            let node = Node {
                data: data.clone(),
                version: 0,
                created_txn: state.txn,
                ephemeral_owner: None,
            };
            state.nodes.insert(format!("{}{}", prefix, name), node);
        }
        state.fire(parent.trim_end_matches('/'));
    }

    pub fn delete(&self, path: &str) -> bool {
        self.state.lock().remove(path)
    }

    pub fn set_data(&self, path: &str, data: impl Into<Bytes>) {
        if let Some(node) = self.state.lock().nodes.get_mut(path) {
            node.data = data.into();
            node.version += 1;
        }
    }

    /// Current child names of `parent`, sorted.
    pub fn children(&self, parent: &str) -> Vec<String> {
        self.state.lock().children_of(parent).unwrap_or_default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().connect_delay = delay;
    }

    /// Delays every payload read, before the session is checked.
    pub fn set_get_delay(&self, delay: Option<Duration>) {
        self.state.lock().get_delay = delay;
    }

    /// Delays every child listing, before the session is checked.
    pub fn set_list_delay(&self, delay: Option<Duration>) {
        self.state.lock().list_delay = delay;
    }

    /// Fails the next `count` reads with a connection error.
    pub fn fail_next_gets(&self, count: usize) {
        self.state.lock().failing_gets = count;
    }

    /// Fails the next `count` child listings with a connection error.
    pub fn fail_next_lists(&self, count: usize) {
        self.state.lock().failing_lists = count;
    }

    /// Drops the connection of every live client session without expiring it.
    pub fn disconnect_sessions(&self) {
        let mut state = self.state.lock();
        for session in state.sessions.values_mut() {
            session.connected = false;
            let _ = session.events.send(SessionEvent::Disconnected);
        }
    }

    pub fn reconnect_sessions(&self) {
        let mut state = self.state.lock();
        for session in state.sessions.values_mut() {
            session.connected = true;
            let _ = session.events.send(SessionEvent::Connected);
        }
    }

    /// Expires every live client session, discarding its watches.
    pub fn expire_sessions(&self) {
        let mut state = self.state.lock();
        let ids: Vec<u64> = state.sessions.keys().copied().collect();
        for id in ids {
            if let Some(session) = state.drop_session(id) {
                let _ = session.events.send(SessionEvent::Expired);
            }
        }
    }

    /// Number of successful dials so far.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Pending child watches on `path`.
    pub fn watch_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .watches
            .get(path)
            .map(|watches| watches.iter().filter(|w| !w.sender.is_closed()).count())
            .unwrap_or(0)
    }

    fn open_session(&self) -> Result<(u64, SessionEvents)> {
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(CoreError::connection("no ensemble host reachable"));
        }
        state.next_session += 1;
        let id = state.next_session;
        let (events, receiver) = mpsc::unbounded_channel();
        let _ = events.send(SessionEvent::Connected);
        state.sessions.insert(
            id,
            ClientSession {
                events,
                connected: true,
            },
        );
        state.connects += 1;
        Ok((id, receiver))
    }
}

/// Encodes leader info the way a candidate of `format` publishes it.
pub fn encode_info(format: MemberFormat, info: &LeaderInfo) -> Result<Bytes> {
    format.codec().encode(info).map(Bytes::from)
}

/// Dials the in-memory ensemble.
pub struct InMemoryConnector {
    ensemble: InMemoryEnsemble,
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self, hosts: &[String]) -> Result<(Arc<dyn CoordinationClient>, SessionEvents)> {
        let delay = self.ensemble.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (session, events) = self.ensemble.open_session()?;
        debug!("Opened in-memory session {} via {:?}", session, hosts);
        let client = InMemoryClient {
            ensemble: self.ensemble.clone(),
            session,
        };
        Ok((Arc::new(client), events))
    }
}

/// One client session against the in-memory ensemble.
pub struct InMemoryClient {
    ensemble: InMemoryEnsemble,
    session: u64,
}

#[async_trait]
impl CoordinationClient for InMemoryClient {
    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let mut state = self.ensemble.state.lock();
        state.check(self.session)?;
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(CoreError::connection("injected list failure"));
        }
        state.children_of(path)
    }

    async fn children_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch)> {
        let delay = self.ensemble.state.lock().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.ensemble.state.lock();
        state.check(self.session)?;
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(CoreError::connection("injected list failure"));
        }
        let children = state.children_of(path)?;
        let (sender, receiver) = oneshot::channel();
        state.watches.entry(path.to_string()).or_default().push(PendingWatch {
            session: self.session,
            sender,
        });
        Ok((children, receiver))
    }

    async fn get(&self, path: &str) -> Result<(Bytes, NodeStat)> {
        let delay = self.ensemble.state.lock().get_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.ensemble.state.lock();
        state.check(self.session)?;
        if state.failing_gets > 0 {
            state.failing_gets -= 1;
            return Err(CoreError::connection("injected read failure"));
        }
        let num_children = state.children_of(path).map(|c| c.len()).unwrap_or(0);
        let node = state.nodes.get(path).ok_or_else(|| CoreError::no_node(path))?;
        let stat = NodeStat {
            version: node.version,
            created_txn: node.created_txn,
            ephemeral_owner: node.ephemeral_owner,
            num_children,
        };
        Ok((node.data.clone(), stat))
    }

    async fn close(&self) {
        let closed = self.ensemble.state.lock().drop_session(self.session).is_some();
        if closed {
            debug!("Closed in-memory session {}", self.session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_members_and_watch() {
        let ensemble = InMemoryEnsemble::with_path("/mesos");
        let (client, _events) = ensemble.connector().connect(&["zk:2181".into()]).await.unwrap();

        let (children, watch) = client.children_watch("/mesos").await.unwrap();
        assert!(children.is_empty());

        let info = LeaderInfo::new("m1", "10.0.0.1", 5050);
        let name = ensemble.join("/mesos", MemberFormat::Json, &info).unwrap();
        assert_eq!(name, "json.info_0000000000");

        let event = watch.await.unwrap();
        assert_eq!(event, WatchEvent::ChildrenChanged { path: "/mesos".into() });

        let (data, stat) = client.get("/mesos/json.info_0000000000").await.unwrap();
        assert_eq!(encode_info(MemberFormat::Json, &info).unwrap(), data);
        assert!(stat.ephemeral_owner.is_some());
    }

    #[tokio::test]
    async fn test_expiry_discards_watches() {
        let ensemble = InMemoryEnsemble::with_path("/mesos");
        let (client, mut events) = ensemble.connector().connect(&[]).await.unwrap();
        assert_eq!(events.recv().await, Some(SessionEvent::Connected));

        let (_, watch) = client.children_watch("/mesos").await.unwrap();
        ensemble.expire_sessions();

        assert_eq!(events.recv().await, Some(SessionEvent::Expired));
        assert!(watch.await.is_err());
        assert!(matches!(client.get("/mesos").await, Err(CoreError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let ensemble = InMemoryEnsemble::new();
        ensemble.set_reachable(false);
        assert!(ensemble.connector().connect(&[]).await.is_err());
        assert_eq!(ensemble.connect_count(), 0);
    }

    #[test]
    fn test_children_excludes_grandchildren() {
        let ensemble = InMemoryEnsemble::with_path("/a/b/c");
        ensemble.create_path("/a/d");
        assert_eq!(ensemble.children("/a"), vec!["b".to_string(), "d".to_string()]);
        assert!(ensemble.children("/missing").is_empty());
    }
}
