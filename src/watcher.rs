//! Coordination watcher
//!
//! Keeps a [`LeaderCache`] current by following an election directory. Each
//! cycle locates the lowest-sequence member, reads its advertisement while
//! arming a one-shot watch, publishes the decoded address and then parks on
//! the watch until something about that node changes. Every failure inside
//! the loop is logged and retried on the next tick; the cache is never
//! cleared by the loop.
//!
//! A second task drains the session event stream for logging only.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::advertisement::LeaderAdvertisement;
use crate::cache::LeaderCache;
use crate::config::FinderConfig;
use crate::coordination::{CoordinationClient, CoordinationError, SessionEvent, SessionState, WatchEvent};
use crate::election::leader_node_path;
use crate::error::{Error, Result, WatchInterruption};
use crate::metrics;

// ============================================================================
// Settings
// ============================================================================

/// Timing and naming for one watcher
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    /// Election directory to follow
    pub directory: String,

    /// Name prefix of member nodes
    pub member_prefix: String,

    /// Delay between refresh cycles
    pub poll_interval: Duration,

    /// Longest wait on a single watch before re-confirming the leader
    pub watch_timeout: Duration,

    /// Bound on each coordination request issued by a refresh
    pub request_timeout: Duration,
}

impl WatcherSettings {
    /// Settings for `directory` taken from a finder configuration
    pub fn from_config(config: &FinderConfig, directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            member_prefix: config.member_prefix.clone(),
            poll_interval: config.poll_interval(),
            watch_timeout: config.watch_timeout(),
            request_timeout: config.connect_timeout(),
        }
    }
}

// ============================================================================
// Watcher
// ============================================================================

/// Refresh loop over one election directory
pub struct CoordinationWatcher {
    client: Arc<dyn CoordinationClient>,
    cache: Arc<LeaderCache>,
    settings: WatcherSettings,
}

impl CoordinationWatcher {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        cache: Arc<LeaderCache>,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            client,
            cache,
            settings,
        }
    }

    /// Start the refresh loop and the session observer
    ///
    /// Both tasks stop when [`WatcherHandle::shutdown`] is called or the
    /// handle is dropped.
    pub fn spawn(self, events: mpsc::UnboundedReceiver<SessionEvent>) -> WatcherHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);

        tracing::info!(
            directory = %self.settings.directory,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "starting leader watcher"
        );

        let session = tokio::spawn(observe_session(events, shutdown_rx.clone()));
        let refresh = tokio::spawn(self.run(shutdown_rx));

        WatcherHandle {
            refresh,
            session,
            shutdown,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let request_timeout = self.settings.request_timeout;
            let outcome = tokio::select! {
                result = tokio::time::timeout(request_timeout, self.refresh()) => {
                    result.unwrap_or_else(|_| {
                        Err(CoordinationError::Timeout(request_timeout).into())
                    })
                }
                _ = shutdown.changed() => break,
            };

            let notification = match outcome {
                Ok(notification) => {
                    metrics::record_refresh("ok");
                    notification
                }
                Err(e) => {
                    tracing::warn!(
                        directory = %self.settings.directory,
                        error = %e,
                        "leader refresh failed, keeping cached leader"
                    );
                    metrics::record_refresh(e.category().as_str());
                    continue;
                }
            };

            let Some(interruption) =
                await_change(notification, &mut shutdown, self.settings.watch_timeout).await
            else {
                break;
            };

            metrics::record_watch_interruption(interruption.as_label());
            match &interruption {
                WatchInterruption::DataChanged | WatchInterruption::TimedOut => {
                    tracing::debug!(reason = %interruption, "re-resolving leader");
                }
                _ => {
                    tracing::warn!(reason = %interruption, "leader watch interrupted");
                }
            }
        }

        tracing::info!(directory = %self.settings.directory, "leader watcher stopped");
    }

    /// One locate, fetch and publish pass
    ///
    /// Returns the watch armed on the leader node.
    async fn refresh(&self) -> Result<oneshot::Receiver<WatchEvent>> {
        let directory = &self.settings.directory;

        let (children, _) = self.client.children(directory).await?;
        let node = leader_node_path(directory, &children, &self.settings.member_prefix)?;

        let watched = self.client.get_watched(&node).await?;
        let address = LeaderAdvertisement::decode(&watched.data)?.address()?;

        tracing::debug!(node = %node, leader = %address, "leader node read");

        if self.cache.write(address.clone()).await {
            tracing::info!(node = %node, leader = %address, status = %address.status, "leader changed");
            metrics::record_leader_change();
        }

        Ok(watched.watch)
    }
}

/// Wait for the leader node to change
///
/// Returns `None` when shutdown was requested.
async fn await_change(
    notification: oneshot::Receiver<WatchEvent>,
    shutdown: &mut watch::Receiver<bool>,
    limit: Duration,
) -> Option<WatchInterruption> {
    tokio::select! {
        event = notification => Some(match event {
            Ok(WatchEvent::DataChanged) => WatchInterruption::DataChanged,
            Ok(WatchEvent::NodeDeleted) => WatchInterruption::NodeDeleted,
            Ok(WatchEvent::Error(reason)) => WatchInterruption::WatcherError(reason),
            Err(_) => WatchInterruption::Closed,
        }),
        _ = tokio::time::sleep(limit) => Some(WatchInterruption::TimedOut),
        _ = shutdown.changed() => None,
    }
}

async fn observe_session(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::debug!("session event stream closed");
                    break;
                };

                metrics::record_session_event(event.state.as_str());
                let server = event.server.as_deref().unwrap_or("-");
                match event.state {
                    SessionState::Connected | SessionState::Connecting => {
                        tracing::info!(state = event.state.as_str(), server, "coordination session event");
                    }
                    _ => {
                        tracing::warn!(state = event.state.as_str(), server, "coordination session event");
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

// ============================================================================
// Watcher Handle
// ============================================================================

/// Handle to a running watcher
#[derive(Debug)]
pub struct WatcherHandle {
    refresh: JoinHandle<()>,
    session: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl WatcherHandle {
    /// Signal both tasks and wait for them to finish
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);

        let (refresh, session) = tokio::join!(self.refresh, self.session);
        for joined in [refresh, session] {
            joined.map_err(|e| Error::resolution_with_source("watcher task failed", e))?;
        }
        Ok(())
    }

    /// Check if the refresh loop is still running
    pub fn is_running(&self) -> bool {
        !self.refresh.is_finished()
    }

    /// Check if session events are still being observed
    ///
    /// Goes false once the client closes its event stream, which does not
    /// stop the refresh loop.
    pub fn is_observing_session(&self) -> bool {
        !self.session.is_finished()
    }
}
