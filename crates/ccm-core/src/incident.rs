//! Incident records produced by the auto-response playbook
//!
//! Status moves forward only: `OPEN -> ACKNOWLEDGED -> RESOLVED`.
//! Resolving straight from `OPEN` is permitted.

use crate::error::IncidentError;
use crate::types::{DriftItem, IncidentId, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Incident lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl IncidentStatus {
    /// Check a human-driven transition
    ///
    /// # Errors
    /// `IncidentError::InvalidTransition` unless `to` is strictly later than `self`
    pub fn validate_transition(self, to: Self) -> Result<(), IncidentError> {
        if to > self {
            Ok(())
        } else {
            Err(IncidentError::InvalidTransition { from: self, to })
        }
    }

    /// Terminal state
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Resolved
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Self::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// Steps of the auto-response playbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoActionType {
    EnableKillSwitch,
    SendNotification,
    OpenIncident,
}

impl std::fmt::Display for AutoActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnableKillSwitch => write!(f, "ENABLE_KILL_SWITCH"),
            Self::SendNotification => write!(f, "SEND_NOTIFICATION"),
            Self::OpenIncident => write!(f, "OPEN_INCIDENT"),
        }
    }
}

/// Outcome of one playbook step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoActionRecord {
    pub action: AutoActionType,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    pub details: Option<String>,
}

impl AutoActionRecord {
    /// Successful step
    #[must_use]
    pub fn succeeded(action: AutoActionType, timestamp: DateTime<Utc>) -> Self {
        Self {
            action,
            success: true,
            timestamp,
            error: None,
            details: None,
        }
    }

    /// Failed step
    #[must_use]
    pub fn failed(
        action: AutoActionType,
        timestamp: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            action,
            success: false,
            timestamp,
            error: Some(error.into()),
            details: None,
        }
    }

    /// With details
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Incident opened by the auto-response playbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: IncidentId,
    pub workspace_id: String,
    /// Taken from the first drift item carrying one
    pub snapshot_id: Option<String>,
    pub severity: Severity,
    /// Drift messages joined with `"; "`
    pub reason: String,
    pub drift_items: Vec<DriftItem>,
    pub timestamp: DateTime<Utc>,
    pub auto_actions: Vec<AutoActionRecord>,
    pub status: IncidentStatus,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_reason: Option<String>,
}

impl IncidentRecord {
    /// Apply an acknowledge action
    ///
    /// # Errors
    /// `IncidentError::InvalidTransition` if already acknowledged or resolved
    pub fn acknowledge(
        &mut self,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), IncidentError> {
        self.status
            .validate_transition(IncidentStatus::Acknowledged)?;
        self.status = IncidentStatus::Acknowledged;
        self.acknowledged_by = Some(actor_id.to_string());
        self.acknowledged_at = Some(at);
        Ok(())
    }

    /// Apply a resolve action
    ///
    /// # Errors
    /// `IncidentError::InvalidTransition` if already resolved
    pub fn resolve(
        &mut self,
        actor_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), IncidentError> {
        self.status.validate_transition(IncidentStatus::Resolved)?;
        self.status = IncidentStatus::Resolved;
        self.resolved_by = Some(actor_id.to_string());
        self.resolved_at = Some(at);
        self.resolution_reason = Some(reason.to_string());
        Ok(())
    }

    /// Whether every playbook step succeeded
    #[must_use]
    pub fn fully_executed(&self) -> bool {
        self.auto_actions.iter().all(|a| a.success)
    }
}
