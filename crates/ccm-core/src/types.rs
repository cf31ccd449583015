//! Core types for CCM
//!
//! Defines the drift model shared by every component:
//! - Severities and aggregate check statuses
//! - Drift items and their per-check details
//! - Per-workspace and global compliance results
//! - The tracker's durable drift record and escalation levels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ulid::Ulid;

/// Unique drift record identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DriftId(pub Ulid);

impl DriftId {
    /// Generate new drift ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for DriftId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DriftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "drift_{}", self.0)
    }
}

/// Unique incident identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub Ulid);

impl IncidentId {
    /// Generate new incident ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inc_{}", self.0)
    }
}

/// Drift severity, ordered `Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Aggregate status of one check cycle, ordered `Pass < Warn < Fail`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Warn => write!(f, "WARN"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Kind of detected anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftType {
    SnapshotMissing,
    SnapshotStale,
    SnapshotMismatch,
    KillSwitchActive,
    FailureInjectionActive,
    PermissionAnomaly,
    DataFreshnessWarn,
    DataFreshnessFail,
    AuditUnreachable,
    /// The workspace directory could not be listed
    DirectoryUnreachable,
}

impl DriftType {
    /// Stable wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SnapshotMissing => "SNAPSHOT_MISSING",
            Self::SnapshotStale => "SNAPSHOT_STALE",
            Self::SnapshotMismatch => "SNAPSHOT_MISMATCH",
            Self::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            Self::FailureInjectionActive => "FAILURE_INJECTION_ACTIVE",
            Self::PermissionAnomaly => "PERMISSION_ANOMALY",
            Self::DataFreshnessWarn => "DATA_FRESHNESS_WARN",
            Self::DataFreshnessFail => "DATA_FRESHNESS_FAIL",
            Self::AuditUnreachable => "AUDIT_UNREACHABLE",
            Self::DirectoryUnreachable => "DIRECTORY_UNREACHABLE",
        }
    }
}

impl std::fmt::Display for DriftType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence source a check queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Snapshots,
    KillSwitch,
    FailureInjection,
    Membership,
    Freshness,
    WorkspaceDirectory,
    AuditSink,
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Snapshots => "snapshots",
            Self::KillSwitch => "kill_switch",
            Self::FailureInjection => "failure_injection",
            Self::Membership => "membership",
            Self::Freshness => "freshness",
            Self::WorkspaceDirectory => "workspace_directory",
            Self::AuditSink => "audit_sink",
        };
        f.write_str(name)
    }
}

/// Scope of a kill-switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitchScope {
    Workspace,
    Global,
}

/// Forensic details carried by a drift item, one variant per check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftDetails {
    SnapshotMissing {
        platform: String,
    },
    SnapshotStale {
        snapshot_id: String,
        dataset_id: String,
        created_at: DateTime<Utc>,
        age_days: i64,
        max_age_days: i64,
    },
    SnapshotMismatch {
        snapshot_id: String,
        dataset_id: String,
        expected_checksum: String,
        actual_checksum: String,
    },
    KillSwitch {
        scope: KillSwitchScope,
        reason: Option<String>,
        activated_at: Option<DateTime<Utc>>,
    },
    FailureInjection {
        config_id: String,
        name: String,
    },
    Membership {
        owner_count: usize,
        owner_ids: Vec<String>,
    },
    DataFreshness {
        dataset_id: String,
        critical: bool,
        age_minutes: Option<i64>,
        warn_after_hours: u32,
        fail_after_hours: u32,
        last_success_at: Option<DateTime<Utc>>,
    },
    AuditProbe {
        error: String,
    },
    /// The check could not query its evidence source
    EvidenceUnavailable {
        source: EvidenceSource,
        error: String,
    },
}

/// One detected anomaly, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftItem {
    #[serde(rename = "type")]
    pub kind: DriftType,
    pub severity: Severity,
    pub message: String,
    /// Absent for global-scope items
    pub workspace_id: Option<String>,
    /// Correlation key for snapshot-related items
    pub snapshot_id: Option<String>,
    pub details: DriftDetails,
}

impl DriftItem {
    /// Create new drift item
    #[inline]
    #[must_use]
    pub fn new(
        kind: DriftType,
        severity: Severity,
        message: impl Into<String>,
        details: DriftDetails,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            workspace_id: None,
            snapshot_id: None,
            details,
        }
    }

    /// With workspace scope
    #[inline]
    #[must_use]
    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// With snapshot correlation key
    #[inline]
    #[must_use]
    pub fn with_snapshot(mut self, snapshot_id: impl Into<String>) -> Self {
        self.snapshot_id = Some(snapshot_id.into());
        self
    }

    /// Whether the item was synthesized from an evidence failure
    #[inline]
    #[must_use]
    pub fn is_evidence_failure(&self) -> bool {
        matches!(self.details, DriftDetails::EvidenceUnavailable { .. })
    }
}

/// Aggregate drift items into a status and overall severity
///
/// Any CRITICAL item fails the cycle. Otherwise any HIGH item warns at HIGH.
/// Otherwise any item at all warns at the first item's severity.
#[must_use]
pub fn aggregate(items: &[DriftItem]) -> (CheckStatus, Option<Severity>) {
    if items.iter().any(|i| i.severity == Severity::Critical) {
        return (CheckStatus::Fail, Some(Severity::Critical));
    }
    if items.iter().any(|i| i.severity == Severity::High) {
        return (CheckStatus::Warn, Some(Severity::High));
    }
    match items.first() {
        Some(first) => (CheckStatus::Warn, Some(first.severity)),
        None => (CheckStatus::Pass, None),
    }
}

/// Result of a single check cycle for one workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheckResult {
    pub status: CheckStatus,
    pub overall_severity: Option<Severity>,
    /// Insertion order equals check order
    pub drift_items: Vec<DriftItem>,
    pub timestamp: DateTime<Utc>,
    pub workspace_id: String,
    #[serde(with = "duration_ms")]
    pub check_duration: Duration,
}

impl ComplianceCheckResult {
    /// Build result from the items of one cycle
    #[must_use]
    pub fn from_items(
        workspace_id: impl Into<String>,
        drift_items: Vec<DriftItem>,
        timestamp: DateTime<Utc>,
        check_duration: Duration,
    ) -> Self {
        let (status, overall_severity) = aggregate(&drift_items);
        Self {
            status,
            overall_severity,
            drift_items,
            timestamp,
            workspace_id: workspace_id.into(),
            check_duration,
        }
    }

    /// No drift detected
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.status == CheckStatus::Pass
    }

    /// FAIL with CRITICAL overall severity
    #[inline]
    #[must_use]
    pub fn is_critical_failure(&self) -> bool {
        self.status == CheckStatus::Fail && self.overall_severity == Some(Severity::Critical)
    }

    /// Drift types in item order
    #[must_use]
    pub fn drift_types(&self) -> Vec<DriftType> {
        self.drift_items.iter().map(|i| i.kind).collect()
    }

    /// First snapshot id carried by any item
    #[must_use]
    pub fn first_snapshot_id(&self) -> Option<&str> {
        self.drift_items
            .iter()
            .find_map(|i| i.snapshot_id.as_deref())
    }
}

/// Result of a full run across all workspaces plus global checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalComplianceResult {
    pub status: CheckStatus,
    pub overall_severity: Option<Severity>,
    pub global_items: Vec<DriftItem>,
    pub workspace_results: Vec<ComplianceCheckResult>,
    pub total_workspaces: usize,
    pub passing: usize,
    pub warning: usize,
    pub failing: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub check_duration: Duration,
}

impl GlobalComplianceResult {
    /// Combine global items and per-workspace results
    #[must_use]
    pub fn from_parts(
        global_items: Vec<DriftItem>,
        workspace_results: Vec<ComplianceCheckResult>,
        timestamp: DateTime<Utc>,
        check_duration: Duration,
    ) -> Self {
        let (mut status, mut overall_severity) = aggregate(&global_items);
        let mut passing = 0;
        let mut warning = 0;
        let mut failing = 0;

        for result in &workspace_results {
            match result.status {
                CheckStatus::Pass => passing += 1,
                CheckStatus::Warn => warning += 1,
                CheckStatus::Fail => failing += 1,
            }
            status = status.max(result.status);
            overall_severity = overall_severity.max(result.overall_severity);
        }

        Self {
            status,
            overall_severity,
            global_items,
            total_workspaces: workspace_results.len(),
            workspace_results,
            passing,
            warning,
            failing,
            timestamp,
            check_duration,
        }
    }
}

/// Escalation tier, ordered `None < Notified < Paged < Critical`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationLevel {
    #[default]
    None,
    Notified,
    Paged,
    Critical,
}

impl EscalationLevel {
    /// Strictly more urgent than `other`
    #[inline]
    #[must_use]
    pub fn is_higher_than(self, other: Self) -> bool {
        self > other
    }

    /// Whether reaching this level dispatches an alert
    #[inline]
    #[must_use]
    pub fn dispatches_alert(self) -> bool {
        matches!(self, Self::Paged | Self::Critical)
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Notified => write!(f, "NOTIFIED"),
            Self::Paged => write!(f, "PAGED"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// The tracker's durable per-workspace drift state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub id: DriftId,
    /// Dedup key: one open record per workspace
    pub workspace_id: String,
    pub status: CheckStatus,
    pub severity: Option<Severity>,
    /// Latest snapshot, overwritten each cycle
    pub drift_items: Vec<DriftItem>,
    /// Set once at creation, defines drift age
    pub detected_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    pub escalation_level: EscalationLevel,
    pub escalated_at: Option<DateTime<Utc>>,
    pub incident_id: Option<IncidentId>,
}

impl DriftRecord {
    /// Open a new record at `now`
    #[must_use]
    pub fn open(
        workspace_id: impl Into<String>,
        status: CheckStatus,
        severity: Option<Severity>,
        drift_items: Vec<DriftItem>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DriftId::new(),
            workspace_id: workspace_id.into(),
            status,
            severity,
            drift_items,
            detected_at: now,
            last_checked_at: now,
            escalation_level: EscalationLevel::None,
            escalated_at: None,
            incident_id: None,
        }
    }

    /// Whole minutes elapsed since detection
    #[inline]
    #[must_use]
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.detected_at).num_minutes()
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
