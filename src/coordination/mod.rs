//! Coordination-service client seam
//!
//! The finder never speaks the coordination protocol itself. It needs three
//! things from a client: list the children of a path, read a node while
//! registering a one-shot watch on it, and a stream of session events. Any
//! ZooKeeper-style client can be adapted to [`CoordinationClient`] and
//! [`Connector`]; [`memory::MemoryEnsemble`] is an in-process implementation.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::address::EnsembleMember;

pub use memory::MemoryEnsemble;

/// Errors reported by a coordination client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// Path does not exist
    #[error("node does not exist: {0}")]
    NoNode(String),

    /// Connection to the ensemble was lost mid-request
    #[error("connection to ensemble lost")]
    ConnectionLoss,

    /// Session expired and must be re-established
    #[error("session expired")]
    SessionExpired,

    /// Request did not complete in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// No client is available for this kind of address
    #[error("coordination client unavailable: {0}")]
    Unavailable(String),

    /// Any other client failure
    #[error("{0}")]
    Other(String),
}

impl CoordinationError {
    /// Check if a later attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

/// Metadata returned with listings and reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStat {
    pub version: u64,
    pub num_children: usize,
    pub ephemeral: bool,
}

/// Single notification delivered by a one-shot watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    DataChanged,
    NodeDeleted,
    Error(String),
}

/// Node data together with the watch armed by the same read
#[derive(Debug)]
pub struct WatchedData {
    pub data: Vec<u8>,
    pub stat: NodeStat,
    pub watch: oneshot::Receiver<WatchEvent>,
}

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
    Expired,
    AuthFailed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Expired => "expired",
            Self::AuthFailed => "auth_failed",
        }
    }
}

/// Session lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub state: SessionState,
    pub server: Option<String>,
}

impl SessionEvent {
    pub fn new(state: SessionState, server: impl Into<String>) -> Self {
        Self {
            state,
            server: Some(server.into()),
        }
    }
}

/// Operations the watcher needs from a coordination client
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// List child names under `path`
    async fn children(&self, path: &str) -> Result<(Vec<String>, NodeStat), CoordinationError>;

    /// Read `path` and arm a one-shot watch on it in the same request
    async fn get_watched(&self, path: &str) -> Result<WatchedData, CoordinationError>;
}

/// An established session
pub struct Session {
    pub client: Arc<dyn CoordinationClient>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Opens sessions against an ensemble
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        ensemble: &[EnsembleMember],
        timeout: Duration,
    ) -> Result<Session, CoordinationError>;
}

/// Connector for builds that ship no coordination client
///
/// Probe-mode finders work as usual; coordination addresses fail to connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledConnector;

#[async_trait]
impl Connector for DisabledConnector {
    async fn connect(
        &self,
        _ensemble: &[EnsembleMember],
        _timeout: Duration,
    ) -> Result<Session, CoordinationError> {
        Err(CoordinationError::Unavailable(
            "no coordination client configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_recoverability() {
        assert!(CoordinationError::ConnectionLoss.is_recoverable());
        assert!(CoordinationError::Timeout(Duration::from_secs(1)).is_recoverable());
        assert!(!CoordinationError::Unavailable("x".to_string()).is_recoverable());
    }

    #[tokio::test]
    async fn test_disabled_connector_refuses() {
        let result = DisabledConnector
            .connect(&[EnsembleMember::new("localhost", 2181)], Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(CoordinationError::Unavailable(_))));
    }

    #[test]
    fn test_session_state_labels() {
        assert_eq!(SessionState::Connected.as_str(), "connected");
        assert_eq!(SessionState::AuthFailed.as_str(), "auth_failed");
    }
}
