//! In-process coordination service
//!
//! Keeps a tree of nodes in memory with the semantics the watcher relies on:
//! ephemeral-sequential children with monotonically increasing suffixes,
//! one-shot watches that fire once on data change or deletion, and a session
//! event stream per connected client. Used by the test suite and the
//! `simulate` command.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::{
    CoordinationClient, CoordinationError, Connector, NodeStat, Session, SessionEvent,
    SessionState, WatchEvent, WatchedData,
};
use crate::address::EnsembleMember;
use crate::election::join_path;

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    version: u64,
    ephemeral: bool,
}

#[derive(Debug, Default)]
struct EnsembleState {
    nodes: BTreeMap<String, Node>,
    sequences: HashMap<String, u64>,
    watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    sessions: Vec<mpsc::UnboundedSender<SessionEvent>>,
    failure: Option<CoordinationError>,
    refuse_connections: bool,
    requests: u64,
}

impl EnsembleState {
    fn fire(&mut self, path: &str, event: WatchEvent) {
        for tx in self.watches.remove(path).unwrap_or_default() {
            let _ = tx.send(event.clone());
        }
    }

    fn children_of(&self, parent: &str) -> Vec<String> {
        let prefix = join_path(parent, "");
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, _)| {
                let name = &path[prefix.len()..];
                (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
            })
            .collect()
    }

    fn check_request(&mut self) -> Result<(), CoordinationError> {
        self.requests += 1;
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Shared in-memory node tree
///
/// Clones share the same tree, so a test can hand one clone to the finder as
/// its [`Connector`] and keep another to drive elections.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnsemble {
    state: Arc<Mutex<EnsembleState>>,
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, EnsembleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a persistent node and any missing parents
    pub fn create_path(&self, path: &str) {
        let mut state = self.state();
        let mut current = String::new();

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = join_path(&current, segment);
            state.nodes.entry(current.clone()).or_insert(Node {
                data: Vec::new(),
                version: 0,
                ephemeral: false,
            });
        }
    }

    /// Create an ephemeral-sequential child and return its full path
    pub fn create_sequential(
        &self,
        parent: &str,
        prefix: &str,
        data: impl Into<Vec<u8>>,
    ) -> Result<String, CoordinationError> {
        let mut state = self.state();
        if !parent.trim_matches('/').is_empty() && !state.nodes.contains_key(parent) {
            return Err(CoordinationError::NoNode(parent.to_string()));
        }

        let counter = state.sequences.entry(parent.to_string()).or_insert(0);
        let sequence = *counter;
        *counter += 1;

        let path = join_path(parent, &format!("{prefix}{sequence:010}"));
        state.nodes.insert(
            path.clone(),
            Node {
                data: data.into(),
                version: 0,
                ephemeral: true,
            },
        );

        Ok(path)
    }

    /// Replace a node's data, firing its watches
    pub fn set_data(&self, path: &str, data: impl Into<Vec<u8>>) -> Result<(), CoordinationError> {
        let mut state = self.state();
        let node = state
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;

        node.data = data.into();
        node.version += 1;
        state.fire(path, WatchEvent::DataChanged);
        Ok(())
    }

    /// Remove a node, firing its watches
    pub fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        let mut state = self.state();
        if state.nodes.remove(path).is_none() {
            return Err(CoordinationError::NoNode(path.to_string()));
        }

        state.fire(path, WatchEvent::NodeDeleted);
        Ok(())
    }

    /// Deliver a watcher error to everyone watching `path`
    pub fn break_watches(&self, path: &str, reason: impl Into<String>) {
        self.state().fire(path, WatchEvent::Error(reason.into()));
    }

    /// Fail every subsequent request with `error` until cleared with `None`
    pub fn set_failure(&self, error: Option<CoordinationError>) {
        self.state().failure = error;
    }

    /// Make new connection attempts fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.state().refuse_connections = refuse;
    }

    /// Push a session event to every connected client
    pub fn emit_session_event(&self, event: SessionEvent) {
        self.state()
            .sessions
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state().nodes.contains_key(path)
    }

    /// Child names of `parent`, in path order
    pub fn children_of(&self, parent: &str) -> Vec<String> {
        self.state().children_of(parent)
    }

    /// Number of watches currently armed on `path`
    pub fn watch_count(&self, path: &str) -> usize {
        self.state()
            .watches
            .get(path)
            .map(|watches| watches.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Total client requests served, failed ones included
    pub fn request_count(&self) -> u64 {
        self.state().requests
    }
}

#[async_trait]
impl CoordinationClient for MemoryEnsemble {
    async fn children(&self, path: &str) -> Result<(Vec<String>, NodeStat), CoordinationError> {
        let mut state = self.state();
        state.check_request()?;

        let node = state
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        let version = node.version;
        let ephemeral = node.ephemeral;

        let children = state.children_of(path);
        let stat = NodeStat {
            version,
            num_children: children.len(),
            ephemeral,
        };
        Ok((children, stat))
    }

    async fn get_watched(&self, path: &str) -> Result<WatchedData, CoordinationError> {
        let mut state = self.state();
        state.check_request()?;

        let node = state
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;

        let (tx, rx) = oneshot::channel();
        let watches = state.watches.entry(path.to_string()).or_default();
        watches.retain(|armed| !armed.is_closed());
        watches.push(tx);

        let num_children = state.children_of(path).len();
        Ok(WatchedData {
            data: node.data,
            stat: NodeStat {
                version: node.version,
                num_children,
                ephemeral: node.ephemeral,
            },
            watch: rx,
        })
    }
}

#[async_trait]
impl Connector for MemoryEnsemble {
    async fn connect(
        &self,
        ensemble: &[EnsembleMember],
        _timeout: Duration,
    ) -> Result<Session, CoordinationError> {
        let mut state = self.state();
        if state.refuse_connections {
            return Err(CoordinationError::ConnectionLoss);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let server = ensemble
            .first()
            .map(|member| member.to_string())
            .unwrap_or_else(|| "memory".to_string());
        let _ = tx.send(SessionEvent::new(SessionState::Connected, server));
        state.sessions.push(tx);

        Ok(Session {
            client: Arc::new(self.clone()),
            events: rx,
        })
    }
}
