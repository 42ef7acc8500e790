//! Shared leader cache
//!
//! Written by exactly one refresh loop, read by any number of queriers. The
//! host and port are replaced together under the write lock, so a reader sees
//! either the previous leader or the next one, never a mix of both.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};

use crate::advertisement::LeaderAddress;
use crate::error::{Error, Result};
use crate::metrics;

#[derive(Debug, Clone)]
struct CachedLeader {
    address: LeaderAddress,
    confirmed_at: Instant,
    changed_at: DateTime<Utc>,
}

/// Point-in-time view of the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderSnapshot {
    pub address: LeaderAddress,
    /// Time since the leader was last confirmed by a refresh
    pub age: Duration,
    /// Wall-clock time the leader last changed
    pub changed_at: DateTime<Utc>,
}

/// Lock-protected leader address
#[derive(Debug)]
pub struct LeaderCache {
    state: RwLock<Option<CachedLeader>>,
    changes: watch::Sender<Option<LeaderAddress>>,
    max_staleness: Option<Duration>,
}

impl Default for LeaderCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl LeaderCache {
    /// Create an empty cache
    ///
    /// With `max_staleness` set, [`leader_url`](Self::leader_url) refuses to
    /// answer from an entry that has not been confirmed within that window.
    pub fn new(max_staleness: Option<Duration>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            state: RwLock::new(None),
            changes,
            max_staleness,
        }
    }

    /// Current leader, if one has ever been published
    pub async fn read(&self) -> Option<LeaderAddress> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|cached| cached.address.clone())
    }

    /// Publish a leader, returning `true` when it differs from the previous one
    pub async fn write(&self, address: LeaderAddress) -> bool {
        let changed = {
            let mut state = self.state.write().await;
            let now = Instant::now();

            match state.as_mut() {
                Some(cached) if cached.address == address => {
                    cached.confirmed_at = now;
                    false
                }
                _ => {
                    *state = Some(CachedLeader {
                        address: address.clone(),
                        confirmed_at: now,
                        changed_at: Utc::now(),
                    });
                    true
                }
            }
        };

        metrics::set_leader_known(true);
        if changed {
            self.changes.send_replace(Some(address));
        }

        changed
    }

    /// Current leader along with its age
    pub async fn snapshot(&self) -> Option<LeaderSnapshot> {
        self.state.read().await.as_ref().map(|cached| LeaderSnapshot {
            address: cached.address.clone(),
            age: cached.confirmed_at.elapsed(),
            changed_at: cached.changed_at,
        })
    }

    /// Leader URL, or a resolution error if none is known or it is too old
    ///
    /// Refusing a stale entry also clears the `leader_known` gauge; the next
    /// confirming write sets it again.
    pub async fn leader_url(&self) -> Result<String> {
        let state = self.state.read().await;

        let Some(cached) = state.as_ref() else {
            return Err(Error::resolution("no leader found"));
        };

        if let Some(limit) = self.max_staleness {
            let age = cached.confirmed_at.elapsed();
            if age > limit {
                metrics::set_leader_known(false);
                return Err(Error::resolution(format!(
                    "leader {} not confirmed for {}s",
                    cached.address,
                    age.as_secs()
                )));
            }
        }

        Ok(cached.address.url())
    }

    /// Receive every leader change
    pub fn subscribe(&self) -> watch::Receiver<Option<LeaderAddress>> {
        self.changes.subscribe()
    }
}
