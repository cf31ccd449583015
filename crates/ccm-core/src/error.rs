//! Error types for CCM Core
//!
//! Provides the error taxonomy shared by every component:
//! - Evidence-source failures (degraded to drift items by the detector)
//! - Audit validation and delivery failures
//! - Keyed store failures
//! - Outbound transport failures
//! - Incident lifecycle violations
//! - Configuration errors

use crate::incident::IncidentStatus;
use crate::types::IncidentId;
use std::path::PathBuf;

/// Failure to query an external evidence source
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvidenceError {
    /// Source could not be reached
    #[error("evidence source unreachable: {0}")]
    Unreachable(String),

    /// Source answered but the answer could not be interpreted
    #[error("malformed evidence: {0}")]
    Malformed(String),

    /// Query exceeded its deadline
    #[error("evidence query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Mutation was rejected by the store
    #[error("evidence mutation rejected: {0}")]
    Rejected(String),
}

/// Audit validation and delivery errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// A required context field is empty
    #[error("missing required audit context field: {0}")]
    MissingContext(&'static str),

    /// Rollback entries must carry a reason
    #[error("rollback audit entries require a reason")]
    MissingRollbackReason,

    /// Sink refused or failed the write
    #[error("audit sink write failed: {0}")]
    SinkFailed(String),

    /// Background queue is full, entry dropped
    #[error("audit queue full (capacity: {0})")]
    QueueFull(usize),

    /// Background worker is gone
    #[error("audit worker stopped")]
    WorkerStopped,
}

impl AuditError {
    /// Validation errors indicate a programming error in the caller
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingContext(_) | Self::MissingRollbackReason)
    }
}

/// Keyed store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Backend unavailable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Value could not be encoded or decoded
    #[error("store serialization failed: {0}")]
    Serialization(String),
}

/// Outbound HTTP transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Request was cancelled by its deadline
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Check if a retry could help
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network(_))
    }
}

/// Incident lifecycle errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum IncidentError {
    /// No incident with this id
    #[error("incident not found: {0}")]
    NotFound(IncidentId),

    /// Human actions must carry a reason
    #[error("a non-empty reason is required")]
    ReasonRequired,

    /// Actor id must be present
    #[error("an actor id is required")]
    ActorRequired,

    /// Status may only move forward
    #[error("invalid incident transition: {from} -> {to}")]
    InvalidTransition {
        from: IncidentStatus,
        to: IncidentStatus,
    },

    /// Concurrent update lost the race too many times
    #[error("incident {0} is being modified concurrently")]
    Contended(IncidentId),

    /// Underlying store failed
    #[error("incident store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    /// Create invalid-value error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_error_classification() {
        assert!(AuditError::MissingContext("actor_id").is_validation());
        assert!(AuditError::MissingRollbackReason.is_validation());
        assert!(!AuditError::SinkFailed("503".into()).is_validation());
        assert!(!AuditError::QueueFull(8).is_validation());
    }

    #[test]
    fn transport_error_retryable() {
        assert!(TransportError::Timeout { timeout_ms: 10_000 }.is_retryable());
        assert!(TransportError::Network("reset".into()).is_retryable());
        assert!(!TransportError::InvalidRequest("bad url".into()).is_retryable());
    }

    #[test]
    fn incident_transition_display() {
        let err = IncidentError::InvalidTransition {
            from: IncidentStatus::Resolved,
            to: IncidentStatus::Acknowledged,
        };
        assert_eq!(
            err.to_string(),
            "invalid incident transition: RESOLVED -> ACKNOWLEDGED"
        );
    }
}
