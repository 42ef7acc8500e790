//! leader-finder - locate the elected leader of a replicated service
//!
//! A client hands the finder one address and gets back the base URL of the
//! current leader. Two discovery strategies are supported and picked once,
//! from the address scheme:
//!
//! - **Probe** (`http://`, `https://`): GET `<base>/scheduler` without
//!   following redirects and read the leader from the `Location` header.
//! - **Watch** (`zk://`): follow an election directory on a ZooKeeper-style
//!   ensemble. The member node with the lowest sequence number is the leader;
//!   a background loop keeps its advertised endpoint in a shared cache.
//!
//! # Architecture
//!
//! - [`address`] - Discovery address parsing
//! - [`advertisement`] - Leader advertisement payload decoding
//! - [`cache`] - Lock-protected leader cache
//! - [`config`] - Configuration management and settings
//! - [`coordination`] - Coordination client seam and in-memory ensemble
//! - [`election`] - Leader selection over member node names
//! - [`finder`] - The [`Finder`] façade
//! - [`metrics`] - Prometheus metrics
//! - [`probe`] - HTTP redirect probe
//! - [`watcher`] - Background refresh loop
//!
//! # Example
//!
//! ```no_run
//! use leader_finder::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let finder = Finder::from_address("http://aurora.local:8081", &DisabledConnector).await?;
//!     println!("{}", finder.leader_url().await?);
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod advertisement;
pub mod cache;
pub mod config;
pub mod coordination;
pub mod election;
pub mod error;
pub mod finder;
pub mod metrics;
pub mod probe;
pub mod watcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::address::{Address, EnsembleMember};
    pub use crate::advertisement::{LeaderAddress, LeaderAdvertisement, MemberStatus};
    pub use crate::config::FinderConfig;
    pub use crate::coordination::{Connector, DisabledConnector, MemoryEnsemble};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::finder::{Finder, FinderMode};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use finder::Finder;
