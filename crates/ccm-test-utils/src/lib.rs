//! Testing utilities for the CCM workspace
//!
//! Shared fakes, fixtures, and helpers.

#![allow(missing_docs)]

use ccm_core::{
    AlertDeliveryResult, AlertPayload, AlertSender, AuditAction, AuditEntry, AuditError,
    AuditSink, ChannelKind, CheckStatus, Clock, ComplianceCheckResult, DatasetFreshness,
    DeliveryAttempt, DeliveryStatus, DriftDetails, DriftItem, DriftType, EvidenceError,
    EvidenceSource, FailureInjectionConfig, FailureInjectionEvidence, FreshnessEvidence,
    HttpRequest, HttpResponse, HttpTransport, KillSwitchEnableOutcome, KillSwitchEvidence,
    KillSwitchScope, KillSwitchState, MemberRole, Membership, MembershipEvidence, Severity,
    SnapshotEvidence, SnapshotFact, TransportError, WorkspaceDirectory, WorkspaceRef,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed start instant used by every fixture
#[must_use]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock at [`t0`] behind an `Arc`
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new(t0()))
    }

    pub fn advance_minutes(&self, minutes: i64) {
        *self.now.lock() += Duration::minutes(minutes);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// In-memory evidence for every source, with per-source failure injection
#[derive(Debug, Default)]
pub struct FakeEvidence {
    pub snapshots: DashMap<String, Vec<SnapshotFact>>,
    pub kill_switches: DashMap<String, KillSwitchState>,
    pub global_kill_switch: Mutex<KillSwitchState>,
    pub failure_configs: DashMap<String, Vec<FailureInjectionConfig>>,
    pub memberships: DashMap<String, Vec<Membership>>,
    pub datasets: DashMap<String, Vec<DatasetFreshness>>,
    pub workspaces: Mutex<Vec<WorkspaceRef>>,
    failing: DashSet<EvidenceSource>,
    enable_calls: AtomicUsize,
}

impl FakeEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workspace that passes every check at `now`
    pub fn with_healthy_workspace(self, workspace_id: &str, now: DateTime<Utc>) -> Self {
        self.add_workspace(workspace_id, "prod");
        self.snapshots.insert(
            workspace_id.to_string(),
            vec![snapshot("snap-1", "ds-1", now - Duration::days(1))],
        );
        self.memberships
            .insert(workspace_id.to_string(), vec![owner("owner-1")]);
        self
    }

    pub fn add_workspace(&self, workspace_id: &str, platform: &str) {
        self.workspaces.lock().push(WorkspaceRef {
            workspace_id: workspace_id.to_string(),
            platform: platform.to_string(),
        });
    }

    /// Make every query against `source` fail
    pub fn fail(&self, source: EvidenceSource) {
        self.failing.insert(source);
    }

    pub fn heal(&self, source: EvidenceSource) {
        self.failing.remove(&source);
    }

    /// Number of `enable` calls received
    pub fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }

    pub fn set_kill_switch(&self, workspace_id: &str, reason: &str, at: DateTime<Utc>) {
        self.kill_switches.insert(
            workspace_id.to_string(),
            KillSwitchState {
                enabled: true,
                reason: Some(reason.to_string()),
                activated_at: Some(at),
            },
        );
    }

    fn check(&self, source: EvidenceSource) -> Result<(), EvidenceError> {
        if self.failing.contains(&source) {
            return Err(EvidenceError::Unreachable(format!("{source} offline")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SnapshotEvidence for FakeEvidence {
    async fn active_snapshots(
        &self,
        workspace_id: &str,
        _platform: &str,
    ) -> Result<Vec<SnapshotFact>, EvidenceError> {
        self.check(EvidenceSource::Snapshots)?;
        Ok(self
            .snapshots
            .get(workspace_id)
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl KillSwitchEvidence for FakeEvidence {
    async fn workspace_status(&self, workspace_id: &str) -> Result<KillSwitchState, EvidenceError> {
        self.check(EvidenceSource::KillSwitch)?;
        Ok(self
            .kill_switches
            .get(workspace_id)
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn global_status(&self) -> Result<KillSwitchState, EvidenceError> {
        self.check(EvidenceSource::KillSwitch)?;
        Ok(self.global_kill_switch.lock().clone())
    }

    async fn enable(
        &self,
        workspace_id: &str,
        reason: &str,
        _actor_id: &str,
    ) -> Result<KillSwitchEnableOutcome, EvidenceError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.check(EvidenceSource::KillSwitch)?;
        let mut state = self.kill_switches.entry(workspace_id.to_string()).or_default();
        if state.enabled {
            return Ok(KillSwitchEnableOutcome::AlreadyEnabled);
        }
        state.enabled = true;
        state.reason = Some(reason.to_string());
        state.activated_at = Some(Utc::now());
        Ok(KillSwitchEnableOutcome::Enabled)
    }
}

#[async_trait::async_trait]
impl FailureInjectionEvidence for FakeEvidence {
    async fn enabled_configs(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<FailureInjectionConfig>, EvidenceError> {
        self.check(EvidenceSource::FailureInjection)?;
        Ok(self
            .failure_configs
            .get(workspace_id)
            .map(|c| c.clone())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl MembershipEvidence for FakeEvidence {
    async fn active_memberships(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<Membership>, EvidenceError> {
        self.check(EvidenceSource::Membership)?;
        Ok(self
            .memberships
            .get(workspace_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl FreshnessEvidence for FakeEvidence {
    async fn tracked_datasets(
        &self,
        workspace_id: &str,
        _platform: &str,
    ) -> Result<Vec<DatasetFreshness>, EvidenceError> {
        self.check(EvidenceSource::Freshness)?;
        Ok(self
            .datasets
            .get(workspace_id)
            .map(|d| d.clone())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl WorkspaceDirectory for FakeEvidence {
    async fn list_workspaces(&self) -> Result<Vec<WorkspaceRef>, EvidenceError> {
        self.check(EvidenceSource::WorkspaceDirectory)?;
        Ok(self.workspaces.lock().clone())
    }
}

pub fn snapshot(snapshot_id: &str, dataset_id: &str, created_at: DateTime<Utc>) -> SnapshotFact {
    SnapshotFact {
        snapshot_id: snapshot_id.to_string(),
        dataset_id: dataset_id.to_string(),
        created_at,
        checksum: None,
        manifest_checksum: None,
    }
}

pub fn owner(user_id: &str) -> Membership {
    Membership {
        user_id: user_id.to_string(),
        role: MemberRole::Owner,
    }
}

pub fn member(user_id: &str) -> Membership {
    Membership {
        user_id: user_id.to_string(),
        role: MemberRole::Member,
    }
}

pub fn chaos_config(id: &str) -> FailureInjectionConfig {
    FailureInjectionConfig {
        id: id.to_string(),
        name: format!("chaos {id}"),
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Sink that keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries.lock().iter().map(|e| e.action).collect()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .count()
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::SinkFailed("sink offline".to_string()));
        }
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One scripted transport outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Status(u16),
    Error(TransportError),
    /// Never completes; the caller's timeout must fire
    Hang,
}

/// Transport replaying scripted outcomes per URL, 200 once a script runs out
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: DashMap<String, VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, url: &str, outcomes: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .entry(url.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(
        &self,
        request: &HttpRequest,
        _timeout: std::time::Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let next = self
            .scripts
            .get_mut(&request.url)
            .and_then(|mut s| s.pop_front());
        match next.unwrap_or(Scripted::Status(200)) {
            Scripted::Status(status) => Ok(HttpResponse { status }),
            Scripted::Error(e) => Err(e),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Alert sender that records payloads and reports a fixed outcome
#[derive(Debug)]
pub struct RecordingAlertSender {
    sent: Mutex<Vec<AlertPayload>>,
    succeed: AtomicBool,
}

impl Default for RecordingAlertSender {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            succeed: AtomicBool::new(true),
        }
    }
}

impl RecordingAlertSender {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_succeed(&self, succeed: bool) {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<AlertPayload> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl AlertSender for RecordingAlertSender {
    async fn send_alert(&self, payload: AlertPayload) -> AlertDeliveryResult {
        let status = if self.succeed.load(Ordering::SeqCst) {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Failed
        };
        let attempt = DeliveryAttempt {
            channel: ChannelKind::Webhook,
            timestamp: payload.timestamp,
            status,
            status_code: Some(if status == DeliveryStatus::Sent { 200 } else { 500 }),
            error: None,
            retry_count: 0,
            not_configured: false,
        };
        let alert_id = payload.id;
        self.sent.lock().push(payload);
        AlertDeliveryResult::from_attempts(alert_id, vec![attempt])
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn drift_item(kind: DriftType, severity: Severity) -> DriftItem {
    DriftItem::new(
        kind,
        severity,
        format!("{kind} at {severity}"),
        DriftDetails::SnapshotMissing {
            platform: "prod".to_string(),
        },
    )
}

/// FAIL/CRITICAL result with a failure-injection item and a snapshot-correlated item
pub fn critical_result(workspace_id: &str, at: DateTime<Utc>) -> ComplianceCheckResult {
    let items = vec![
        DriftItem::new(
            DriftType::KillSwitchActive,
            Severity::High,
            "kill-switch enabled",
            DriftDetails::KillSwitch {
                scope: KillSwitchScope::Workspace,
                reason: Some("manual".to_string()),
                activated_at: Some(at),
            },
        )
        .with_workspace(workspace_id)
        .with_snapshot("snap-9"),
        DriftItem::new(
            DriftType::FailureInjectionActive,
            Severity::Critical,
            "failure injection 'latency' enabled",
            DriftDetails::FailureInjection {
                config_id: "fi-1".to_string(),
                name: "latency".to_string(),
            },
        )
        .with_workspace(workspace_id),
    ];
    let result = ComplianceCheckResult::from_items(workspace_id, items, at, std::time::Duration::ZERO);
    debug_assert_eq!(result.status, CheckStatus::Fail);
    result
}

/// WARN/MEDIUM result with a single stale-snapshot item
pub fn warn_result(workspace_id: &str, at: DateTime<Utc>) -> ComplianceCheckResult {
    let items = vec![drift_item(DriftType::SnapshotStale, Severity::Medium).with_workspace(workspace_id)];
    ComplianceCheckResult::from_items(workspace_id, items, at, std::time::Duration::ZERO)
}

/// PASS result
pub fn pass_result(workspace_id: &str, at: DateTime<Utc>) -> ComplianceCheckResult {
    ComplianceCheckResult::from_items(workspace_id, Vec::new(), at, std::time::Duration::ZERO)
}
