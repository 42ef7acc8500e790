//! Discovery address parsing
//!
//! Two forms are accepted:
//!
//! - `http://host[:port]` or `https://...`: probe the virtual endpoint
//! - `zk://host1:port1,host2:port2[/election/path]`: watch an election directory

use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, Result};

/// Scheme prefix selecting coordination mode
pub const COORDINATION_SCHEME: &str = "zk://";

/// Client port assumed for ensemble members written without one
pub const DEFAULT_ENSEMBLE_PORT: u16 = 2181;

/// One coordination-service server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnsembleMember {
    pub host: String,
    pub port: u16,
}

impl EnsembleMember {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(Error::config("bad address: empty ensemble member"));
        }
        if entry.contains(&['@', '?', '#'][..]) {
            return Err(Error::config(format!("bad address: invalid ensemble member '{entry}'")));
        }

        let url = Url::parse(&format!("{COORDINATION_SCHEME}{entry}"))
            .map_err(|e| Error::config(format!("bad address: ensemble member '{entry}': {e}")))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::config(format!("bad address: ensemble member '{entry}' has no host")))?;

        Ok(Self::new(host, url.port().unwrap_or(DEFAULT_ENSEMBLE_PORT)))
    }
}

impl fmt::Display for EnsembleMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parsed discovery target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Probe a stable endpoint that redirects to the leader
    Probe { base: String },

    /// Watch an election directory on a coordination ensemble
    Ensemble {
        members: Vec<EnsembleMember>,
        path: Option<String>,
    },
}

impl Address {
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();

        if let Some(rest) = address.strip_prefix(COORDINATION_SCHEME) {
            return Self::parse_ensemble(rest);
        }

        let url = Url::parse(address).map_err(|_| Error::config("bad address"))?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(Self::Probe {
                base: address.trim_end_matches('/').to_string(),
            }),
            _ => Err(Error::config("bad address")),
        }
    }

    fn parse_ensemble(rest: &str) -> Result<Self> {
        let (hosts, path) = match rest.split_once('/') {
            Some((hosts, path)) => (hosts, Some(path.trim_end_matches('/'))),
            None => (rest, None),
        };

        let members = hosts
            .split(',')
            .map(EnsembleMember::parse)
            .collect::<Result<Vec<_>>>()?;

        let path = path.filter(|p| !p.is_empty()).map(|p| format!("/{p}"));

        Ok(Self::Ensemble { members, path })
    }

    /// `true` for coordination addresses
    pub fn is_ensemble(&self) -> bool {
        matches!(self, Self::Ensemble { .. })
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe { base } => f.write_str(base),
            Self::Ensemble { members, path } => {
                f.write_str(COORDINATION_SCHEME)?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{member}")?;
                }
                if let Some(path) = path {
                    f.write_str(path)?;
                }
                Ok(())
            }
        }
    }
}
