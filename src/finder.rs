//! Leader finder façade
//!
//! The discovery mode is chosen once, from the address scheme, when the
//! finder is resolved:
//!
//! - `http://` / `https://` addresses probe a redirecting endpoint on every
//!   query and hold no background state.
//! - `zk://` addresses connect to the ensemble, start a
//!   [`CoordinationWatcher`] and answer every query from its cache.
//!
//! # Example
//!
//! ```no_run
//! use leader_finder::config::FinderConfig;
//! use leader_finder::coordination::MemoryEnsemble;
//! use leader_finder::finder::Finder;
//!
//! # async fn example() -> leader_finder::Result<()> {
//! let ensemble = MemoryEnsemble::new();
//! let config = FinderConfig::new("zk://zk1:2181/aurora/scheduler");
//! let finder = Finder::resolve(&config, &ensemble).await?;
//!
//! println!("leader at {}", finder.leader_url().await?);
//! finder.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::sync::watch;

use crate::address::{Address, EnsembleMember};
use crate::advertisement::LeaderAddress;
use crate::cache::{LeaderCache, LeaderSnapshot};
use crate::config::FinderConfig;
use crate::coordination::{CoordinationError, Connector};
use crate::error::{Error, Result};
use crate::probe::ProbeFinder;
use crate::watcher::{CoordinationWatcher, WatcherHandle, WatcherSettings};

/// Discovery mode of a [`Finder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderMode {
    Probe,
    Watch,
}

impl FinderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Watch => "watch",
        }
    }
}

impl std::fmt::Display for FinderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Watch-mode state: the cache and the watcher feeding it
#[derive(Debug)]
pub struct WatchFinder {
    cache: Arc<LeaderCache>,
    handle: WatcherHandle,
    directory: String,
    members: Vec<EnsembleMember>,
}

impl WatchFinder {
    /// Election directory being followed
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Ensemble the session was opened against
    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    /// Check if the refresh loop is still running
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }
}

/// Resolves the current leader's base URL
#[derive(Debug)]
pub enum Finder {
    Probe(ProbeFinder),
    Watch(WatchFinder),
}

impl Finder {
    /// Build a finder from configuration
    ///
    /// Probe addresses perform no I/O here. Coordination addresses open a
    /// session through `connector`, bounded by the connect timeout, and start
    /// the watcher. The first refresh runs immediately, but this call does not
    /// wait for it.
    pub async fn resolve(config: &FinderConfig, connector: &dyn Connector) -> Result<Self> {
        config.validate()?;

        match Address::parse(&config.address)? {
            Address::Probe { base } => {
                let probe = ProbeFinder::new(&base, &config.probe_path, config.probe_timeout())?;
                tracing::debug!(url = probe.scheduler_url(), "using HTTP leader probe");
                Ok(Self::Probe(probe))
            }
            Address::Ensemble { members, path } => {
                let directory = config.election_path_for(path.as_deref());
                let timeout = config.connect_timeout();

                let session = tokio::time::timeout(timeout, connector.connect(&members, timeout))
                    .await
                    .map_err(|_| {
                        Error::connection(
                            "could not connect to ensemble",
                            CoordinationError::Timeout(timeout),
                        )
                    })?
                    .map_err(|e| Error::connection("could not connect to ensemble", e))?;

                tracing::info!(
                    ensemble = %Address::Ensemble { members: members.clone(), path: None },
                    directory = %directory,
                    "connected to coordination ensemble"
                );

                let cache = Arc::new(LeaderCache::new(config.max_staleness()));
                let settings = WatcherSettings::from_config(config, directory.clone());
                let handle = CoordinationWatcher::new(session.client, Arc::clone(&cache), settings)
                    .spawn(session.events);

                Ok(Self::Watch(WatchFinder {
                    cache,
                    handle,
                    directory,
                    members,
                }))
            }
        }
    }

    /// Build a finder for `address` with default settings
    pub async fn from_address(address: &str, connector: &dyn Connector) -> Result<Self> {
        Self::resolve(&FinderConfig::new(address), connector).await
    }

    /// Current leader as `http://<host>:<port>`
    ///
    /// Probe mode issues one HTTP request; watch mode only reads the cache.
    pub async fn leader_url(&self) -> Result<String> {
        match self {
            Self::Probe(probe) => probe.leader_url().await,
            Self::Watch(watch) => watch.cache.leader_url().await,
        }
    }

    /// Cached leader with its age; `None` in probe mode or before the first refresh
    pub async fn snapshot(&self) -> Option<LeaderSnapshot> {
        match self {
            Self::Probe(_) => None,
            Self::Watch(watch) => watch.cache.snapshot().await,
        }
    }

    /// Leadership changes, available in watch mode
    pub fn subscribe(&self) -> Option<watch::Receiver<Option<LeaderAddress>>> {
        match self {
            Self::Probe(_) => None,
            Self::Watch(watch) => Some(watch.cache.subscribe()),
        }
    }

    pub fn mode(&self) -> FinderMode {
        match self {
            Self::Probe(_) => FinderMode::Probe,
            Self::Watch(_) => FinderMode::Watch,
        }
    }

    /// Stop background work, waiting for the watcher tasks to exit
    pub async fn shutdown(self) -> Result<()> {
        match self {
            Self::Probe(_) => Ok(()),
            Self::Watch(watch) => {
                tracing::info!(directory = %watch.directory, "stopping leader watcher");
                watch.handle.shutdown().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{DisabledConnector, MemoryEnsemble};
    use std::time::Duration;

    #[tokio::test]
    async fn test_http_address_selects_probe() {
        let finder = Finder::from_address("http://aurora:8081", &DisabledConnector)
            .await
            .unwrap();
        assert_eq!(finder.mode(), FinderMode::Probe);
        assert!(finder.subscribe().is_none());
        assert!(finder.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_bad_address_is_configuration_error() {
        let err = Finder::from_address("localhost:8081", &DisabledConnector)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("bad address"));
    }

    #[tokio::test]
    async fn test_disabled_connector_fails_ensemble() {
        let err = Finder::from_address("zk://zk1:2181", &DisabledConnector)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[tokio::test]
    async fn test_ensemble_address_selects_watch() {
        let ensemble = MemoryEnsemble::new();
        ensemble.create_path("/jobs/leader");

        let config = FinderConfig::builder()
            .address("zk://zk1:2181,zk2:2181/jobs/leader")
            .poll_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let finder = Finder::resolve(&config, &ensemble).await.unwrap();

        assert_eq!(finder.mode(), FinderMode::Watch);
        let Finder::Watch(watch) = &finder else {
            panic!("expected watch mode");
        };
        assert_eq!(watch.directory(), "/jobs/leader");
        assert_eq!(watch.members().len(), 2);
        assert!(watch.is_running());

        let err = finder.leader_url().await.unwrap_err();
        assert!(err.to_string().contains("no leader found"));

        finder.shutdown().await.unwrap();
    }
}
