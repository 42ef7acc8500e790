//! Leader advertisement decoding
//!
//! The elected leader writes a JSON document into its election node
//! describing how to reach it:
//!
//! ```json
//! {
//!   "serviceEndpoint": {"host": "10.0.0.1", "port": 8081},
//!   "additionalEndpoints": {"http": {"host": "10.0.0.1", "port": 8081}},
//!   "status": "ALIVE"
//! }
//! ```
//!
//! Only the primary endpoint is used to build the leader URL.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Placeholder byte some writers leave in a node before the real payload lands
pub const SOH: u8 = 0x01;

/// Errors produced while decoding an advertisement payload
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Node holds only the SOH placeholder
    #[error("received SOH control character instead of an advertisement")]
    Placeholder,

    /// Node holds no data at all
    #[error("advertisement payload is empty")]
    Empty,

    /// Payload is not a valid advertisement document
    #[error("malformed advertisement: {0}")]
    Json(#[from] serde_json::Error),

    /// Primary endpoint has an empty host
    #[error("advertisement has no service host")]
    MissingHost,

    /// Primary endpoint port does not fit a TCP port
    #[error("advertised port {0} is out of range")]
    InvalidPort(i64),
}

impl DecodeError {
    /// Decode failures are retried on the next refresh cycle
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

/// Lifecycle status published alongside the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Alive,
    Dead,
    Starting,
    Stopping,
    Stopped,
    Warning,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alive => "ALIVE",
            Self::Dead => "DEAD",
            Self::Starting => "STARTING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Warning => "WARNING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw endpoint as written by the leader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: i64,
}

/// Decoded leader advertisement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderAdvertisement {
    pub service_endpoint: Endpoint,

    #[serde(default)]
    pub additional_endpoints: HashMap<String, Endpoint>,

    #[serde(default)]
    pub status: MemberStatus,
}

impl LeaderAdvertisement {
    /// Decode a payload read from an election node
    ///
    /// The SOH placeholder is rejected before any JSON parsing happens.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data == [SOH] {
            return Err(DecodeError::Placeholder);
        }
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }

        let advertisement: Self = serde_json::from_slice(data)?;
        advertisement.address()?;
        Ok(advertisement)
    }

    /// Primary endpoint as a validated address
    pub fn address(&self) -> Result<LeaderAddress, DecodeError> {
        let host = self.service_endpoint.host.trim();
        if host.is_empty() {
            return Err(DecodeError::MissingHost);
        }

        let port = self.service_endpoint.port;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(DecodeError::InvalidPort(port))?;

        Ok(LeaderAddress {
            host: host.to_string(),
            port,
            status: self.status,
        })
    }

    /// Look up a named secondary endpoint
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.additional_endpoints.get(name)
    }
}

/// Host and port of the current leader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderAddress {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub status: MemberStatus,
}

impl LeaderAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            status: MemberStatus::Alive,
        }
    }

    /// Base URL of the leader's service endpoint
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for LeaderAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
