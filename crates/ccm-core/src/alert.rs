//! Alert payloads and delivery outcomes
//!
//! These are transient: the engine never persists them beyond the audit trail.

use crate::types::{DriftItem, IncidentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Alert urgency, selects the channel set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Critical,
    Warn,
    Info,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::Warn => write!(f, "WARN"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            other => Err(format!("unknown alert severity: {other}")),
        }
    }
}

/// Outbound integration channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Chat,
    Pager,
    Webhook,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Pager => write!(f, "pager"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

/// Alert to fan out across channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub workspace_id: Option<String>,
    pub incident_id: Option<IncidentId>,
    pub drift_items: Option<Vec<DriftItem>>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl AlertPayload {
    /// Create new alert
    #[must_use]
    pub fn new(
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            title: title.into(),
            message: message.into(),
            source: source.into(),
            timestamp,
            workspace_id: None,
            incident_id: None,
            drift_items: None,
            metadata: None,
        }
    }

    /// With workspace
    #[inline]
    #[must_use]
    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// With incident
    #[inline]
    #[must_use]
    pub fn with_incident(mut self, incident_id: IncidentId) -> Self {
        self.incident_id = Some(incident_id);
        self
    }

    /// With drift items
    #[inline]
    #[must_use]
    pub fn with_drift_items(mut self, items: Vec<DriftItem>) -> Self {
        self.drift_items = Some(items);
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Key under which repeated triggers coalesce
    #[must_use]
    pub fn dedup_key(&self) -> String {
        self.incident_id
            .map_or_else(|| self.id.to_string(), |id| id.to_string())
    }
}

/// Per-channel outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One channel's delivery record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub channel: ChannelKind,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    /// Retries actually performed (attempts - 1)
    pub retry_count: u32,
    /// Channel had no endpoint; excluded from the final status
    #[serde(default)]
    pub not_configured: bool,
}

impl DeliveryAttempt {
    /// Immediate failure for a channel with no endpoint
    #[must_use]
    pub fn not_configured(channel: ChannelKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            channel,
            timestamp,
            status: DeliveryStatus::Failed,
            status_code: None,
            error: Some(format!("{channel} channel not configured")),
            retry_count: 0,
            not_configured: true,
        }
    }

    /// Channel that failed before any request was sent
    #[must_use]
    pub fn failed(channel: ChannelKind, timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            channel,
            timestamp,
            status: DeliveryStatus::Failed,
            status_code: None,
            error: Some(error.into()),
            retry_count: 0,
            not_configured: false,
        }
    }
}

/// Aggregate delivery outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    /// Every configured channel sent
    Success,
    /// Some configured channels sent
    Partial,
    /// No configured channel sent
    Failed,
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Result of `send_alert`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDeliveryResult {
    pub alert_id: Uuid,
    pub attempts: Vec<DeliveryAttempt>,
    pub final_status: FinalStatus,
    pub successful_channels: Vec<ChannelKind>,
    pub failed_channels: Vec<ChannelKind>,
}

impl AlertDeliveryResult {
    /// Build from ordered attempts
    ///
    /// Unconfigured channels count neither as sent nor as failed.
    #[must_use]
    pub fn from_attempts(alert_id: Uuid, attempts: Vec<DeliveryAttempt>) -> Self {
        let successful_channels: Vec<ChannelKind> = attempts
            .iter()
            .filter(|a| a.status == DeliveryStatus::Sent)
            .map(|a| a.channel)
            .collect();
        let failed_channels: Vec<ChannelKind> = attempts
            .iter()
            .filter(|a| a.status == DeliveryStatus::Failed && !a.not_configured)
            .map(|a| a.channel)
            .collect();

        let final_status = match (successful_channels.is_empty(), failed_channels.is_empty()) {
            (false, true) => FinalStatus::Success,
            (false, false) => FinalStatus::Partial,
            (true, _) => FinalStatus::Failed,
        };

        Self {
            alert_id,
            attempts,
            final_status,
            successful_channels,
            failed_channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(channel: ChannelKind, status: DeliveryStatus) -> DeliveryAttempt {
        DeliveryAttempt {
            channel,
            timestamp: Utc::now(),
            status,
            status_code: Some(200),
            error: None,
            retry_count: 0,
            not_configured: false,
        }
    }

    #[test]
    fn unconfigured_channel_does_not_make_partial() {
        let result = AlertDeliveryResult::from_attempts(
            Uuid::new_v4(),
            vec![
                attempt(ChannelKind::Chat, DeliveryStatus::Sent),
                DeliveryAttempt::not_configured(ChannelKind::Webhook, Utc::now()),
            ],
        );
        assert_eq!(result.final_status, FinalStatus::Success);
        assert_eq!(result.successful_channels, vec![ChannelKind::Chat]);
        assert!(result.failed_channels.is_empty());
    }

    #[test]
    fn mixed_outcome_is_partial() {
        let result = AlertDeliveryResult::from_attempts(
            Uuid::new_v4(),
            vec![
                attempt(ChannelKind::Chat, DeliveryStatus::Sent),
                attempt(ChannelKind::Pager, DeliveryStatus::Failed),
            ],
        );
        assert_eq!(result.final_status, FinalStatus::Partial);
        assert_eq!(result.failed_channels, vec![ChannelKind::Pager]);
    }

    #[test]
    fn nothing_configured_is_failed() {
        let result = AlertDeliveryResult::from_attempts(
            Uuid::new_v4(),
            vec![DeliveryAttempt::not_configured(ChannelKind::Chat, Utc::now())],
        );
        assert_eq!(result.final_status, FinalStatus::Failed);
    }

    #[test]
    fn dedup_key_prefers_incident() {
        let incident = IncidentId::new();
        let alert = AlertPayload::new(AlertSeverity::Critical, "t", "m", "s", Utc::now());
        assert_eq!(alert.dedup_key(), alert.id.to_string());
        let alert = alert.with_incident(incident);
        assert_eq!(alert.dedup_key(), incident.to_string());
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("CRITICAL".parse::<AlertSeverity>(), Ok(AlertSeverity::Critical));
        assert_eq!("warning".parse::<AlertSeverity>(), Ok(AlertSeverity::Warn));
        assert!("loud".parse::<AlertSeverity>().is_err());
    }
}
