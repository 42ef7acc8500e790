//! Unified error handling for the leader-finder crate
//!
//! Domain modules keep their own error types ([`DecodeError`],
//! [`CoordinationError`]); this module folds them into one [`Error`] enum that
//! crosses module boundaries and is what callers of the
//! [`Finder`](crate::finder::Finder) see.
//!
//! # Usage
//!
//! ```rust,ignore
//! use leader_finder::error::Error;
//!
//! match finder.leader_url().await {
//!     Ok(url) => println!("leader at {url}"),
//!     Err(e) if e.is_recoverable() => eprintln!("not yet: {e}"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use std::num::ParseIntError;
use thiserror::Error;

pub use crate::advertisement::DecodeError;
pub use crate::coordination::CoordinationError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Address and configuration validation errors
    Config,
    /// HTTP probe and leader lookup errors
    Network,
    /// Coordination-service session and watch errors
    Coordination,
    /// Election node names and advertisement payloads
    Parsing,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Network => "network",
            Self::Coordination => "coordination",
            Self::Parsing => "parsing",
            Self::Other => "other",
        }
    }
}

/// Why the refresh loop stopped waiting on a one-shot watch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchInterruption {
    /// The watched node's data was replaced
    #[error("leader node data changed")]
    DataChanged,

    /// The watched node was removed
    #[error("leader node deleted")]
    NodeDeleted,

    /// The coordination client reported a watcher failure
    #[error("watcher error: {0}")]
    WatcherError(String),

    /// The notification channel closed without delivering an event
    #[error("watch channel closed")]
    Closed,

    /// No event arrived within the configured re-arm window
    #[error("watch re-armed after timeout")]
    TimedOut,
}

impl WatchInterruption {
    /// Metric label for this interruption
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::DataChanged => "data_changed",
            Self::NodeDeleted => "node_deleted",
            Self::WatcherError(_) => "watcher_error",
            Self::Closed => "closed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Unified error type for the leader-finder crate
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed address or invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Could not establish a coordination-service session
    #[error("Connection error: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<CoordinationError>,
    },

    /// No leader could be produced for a query
    #[error("Resolution error: {reason}")]
    Resolution {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The election directory holds no member node
    #[error("Not found: {0}")]
    NotFound(String),

    /// An election member name carries a non-numeric sequence
    #[error("Invalid election member '{name}': {source}")]
    InvalidMember {
        name: String,
        #[source]
        source: ParseIntError,
    },

    /// Leader advertisement payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The refresh loop must re-resolve the leader node
    #[error("Watch interrupted: {0}")]
    WatchInterrupted(#[from] WatchInterruption),

    /// Coordination client failure
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a resolution error without an underlying cause
    pub fn resolution(reason: impl Into<String>) -> Self {
        Self::Resolution {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a resolution error wrapping the failure that caused it
    pub fn resolution_with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Resolution {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error from a failed session attempt
    pub fn connection(reason: impl Into<String>, source: CoordinationError) -> Self {
        Self::Connection {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Check if this error is recoverable (the operation may be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Configuration(_) => false,
            Self::Connection { .. } => true,
            Self::Resolution { .. } => true,
            Self::NotFound(_) => true, // a member may register later
            Self::InvalidMember { .. } => false,
            Self::Decode(e) => e.is_recoverable(),
            Self::WatchInterrupted(_) => true,
            Self::Coordination(e) => e.is_recoverable(),
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Config,
            Self::Resolution { .. } => ErrorCategory::Network,
            Self::Connection { .. } | Self::WatchInterrupted(_) | Self::Coordination(_) => {
                ErrorCategory::Coordination
            }
            Self::InvalidMember { .. } | Self::Decode(_) => ErrorCategory::Parsing,
            Self::NotFound(_) => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(Error::config("bad address").category(), ErrorCategory::Config);
        assert_eq!(Error::resolution("no leader").category(), ErrorCategory::Network);
        assert_eq!(
            Error::from(DecodeError::Placeholder).category(),
            ErrorCategory::Parsing
        );
        assert_eq!(
            Error::from(WatchInterruption::NodeDeleted).category(),
            ErrorCategory::Coordination
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(!Error::config("bad address").is_recoverable());
        assert!(Error::resolution("no leader found").is_recoverable());
        assert!(Error::from(WatchInterruption::Closed).is_recoverable());
        assert!(Error::from(CoordinationError::ConnectionLoss).is_recoverable());
    }

    #[test]
    fn test_invalid_member_not_recoverable() {
        let source = "abc".parse::<u64>().unwrap_err();
        let err = Error::InvalidMember {
            name: "member_abc".to_string(),
            source,
        };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("member_abc"));
    }

    #[test]
    fn test_resolution_with_source_keeps_cause() {
        let err = Error::resolution_with_source(
            "probe failed",
            CoordinationError::Other("boom".to_string()),
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("boom"));
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(ErrorCategory::Coordination.as_str(), "coordination");
        assert_eq!(ErrorCategory::Parsing.as_str(), "parsing");
        assert_eq!(WatchInterruption::NodeDeleted.as_label(), "node_deleted");
        assert_eq!(
            WatchInterruption::WatcherError("x".to_string()).as_label(),
            "watcher_error"
        );
    }
}
