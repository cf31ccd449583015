//! Drift detector
//!
//! Runs the fixed battery of checks for one workspace, the global checks, and
//! the full run across every workspace in the directory.

use crate::checks;
use crate::freshness::{FreshnessEvaluator, ThresholdEvaluator};
use ccm_core::{
    AuditAction, AuditEmitter, AuditEntry, AuditScope, ComplianceCheckResult, DetectionConfig,
    DriftDetails, DriftItem, DriftType, EvidenceError, EvidenceSource, EvidenceSources,
    GlobalComplianceResult, KillSwitchScope, Severity, SharedClock,
};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Drift detector
#[derive(Debug, Clone)]
pub struct DriftDetector {
    sources: EvidenceSources,
    audit: AuditEmitter,
    clock: SharedClock,
    config: DetectionConfig,
    evaluator: Arc<dyn FreshnessEvaluator>,
}

impl DriftDetector {
    /// Create detector with the threshold freshness evaluator
    #[must_use]
    pub fn new(
        sources: EvidenceSources,
        audit: AuditEmitter,
        clock: SharedClock,
        config: DetectionConfig,
    ) -> Self {
        Self {
            sources,
            audit,
            clock,
            config,
            evaluator: Arc::new(ThresholdEvaluator),
        }
    }

    /// With custom freshness evaluator
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn FreshnessEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Check one workspace
    ///
    /// Never fails: a source that cannot be queried becomes a synthetic drift
    /// item. Emits exactly one `COMPLIANCE_CHECK` audit event.
    pub async fn check_workspace_compliance(
        &self,
        workspace_id: &str,
        platform: &str,
    ) -> ComplianceCheckResult {
        let started = Instant::now();
        let now = self.clock.now();

        // Queries are independent; items are assembled in check order below.
        let (snapshots, kill_switch, failure_configs, memberships, datasets) = tokio::join!(
            self.query(self.sources.snapshots.active_snapshots(workspace_id, platform)),
            self.query(self.sources.kill_switch.workspace_status(workspace_id)),
            self.query(self.sources.failure_injection.enabled_configs(workspace_id)),
            self.query(self.sources.membership.active_memberships(workspace_id)),
            self.query(self.sources.freshness.tracked_datasets(workspace_id, platform)),
        );

        let ws = Some(workspace_id);
        let mut items: Vec<DriftItem> = Vec::new();

        match snapshots {
            Ok(snaps) => items.extend(checks::snapshot_drift(
                workspace_id,
                platform,
                &snaps,
                now,
                self.config.stale_snapshot_days,
            )),
            Err(e) => items.push(checks::evidence_unavailable(
                ws,
                DriftType::SnapshotMissing,
                EvidenceSource::Snapshots,
                Severity::High,
                &e,
            )),
        }

        match kill_switch {
            Ok(state) => items.extend(checks::kill_switch_drift(
                ws,
                &state,
                KillSwitchScope::Workspace,
            )),
            Err(e) => items.push(checks::evidence_unavailable(
                ws,
                DriftType::KillSwitchActive,
                EvidenceSource::KillSwitch,
                Severity::High,
                &e,
            )),
        }

        match failure_configs {
            Ok(configs) => items.extend(checks::failure_injection_drift(workspace_id, &configs)),
            Err(e) => items.push(checks::evidence_unavailable(
                ws,
                DriftType::FailureInjectionActive,
                EvidenceSource::FailureInjection,
                Severity::Critical,
                &e,
            )),
        }

        match memberships {
            Ok(members) => items.extend(checks::membership_drift(workspace_id, &members)),
            Err(e) => items.push(checks::evidence_unavailable(
                ws,
                DriftType::PermissionAnomaly,
                EvidenceSource::Membership,
                Severity::Critical,
                &e,
            )),
        }

        match datasets {
            Ok(datasets) => items.extend(checks::freshness_drift(
                workspace_id,
                &datasets,
                self.evaluator.as_ref(),
                now,
            )),
            Err(e) => items.push(checks::evidence_unavailable(
                ws,
                DriftType::DataFreshnessFail,
                EvidenceSource::Freshness,
                Severity::High,
                &e,
            )),
        }

        let result = ComplianceCheckResult::from_items(workspace_id, items, now, started.elapsed());

        tracing::info!(
            workspace_id,
            status = %result.status,
            severity = ?result.overall_severity,
            drift_items = result.drift_items.len(),
            duration_ms = u64::try_from(result.check_duration.as_millis()).unwrap_or(u64::MAX),
            "compliance check completed"
        );
        metrics::counter!("ccm_compliance_checks_total", "status" => result.status.to_string())
            .increment(1);

        self.audit_check(&result);
        result
    }

    /// Global-scope checks: global kill-switch and audit sink reachability
    pub async fn check_global(&self) -> Vec<DriftItem> {
        let mut items = Vec::new();

        match self.query(self.sources.kill_switch.global_status()).await {
            Ok(state) => {
                items.extend(checks::kill_switch_drift(None, &state, KillSwitchScope::Global));
            }
            Err(e) => items.push(checks::evidence_unavailable(
                None,
                DriftType::KillSwitchActive,
                EvidenceSource::KillSwitch,
                Severity::Critical,
                &e,
            )),
        }

        let probe = tokio::time::timeout(self.config.evidence_timeout(), self.audit.probe()).await;
        let health = self.audit.health();
        let failure = match probe {
            Ok(Ok(())) if health.is_healthy() => None,
            Ok(Ok(())) => Some(format!(
                "{} consecutive queued writes failed: {}",
                health.consecutive_failures,
                health.last_error.as_deref().unwrap_or("unknown error")
            )),
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "write probe timed out after {}ms",
                self.config.evidence_timeout_ms
            )),
        };

        if let Some(error) = failure {
            tracing::error!(%error, "audit sink unreachable");
            items.push(DriftItem::new(
                DriftType::AuditUnreachable,
                Severity::Critical,
                format!("Audit sink unreachable: {error}"),
                DriftDetails::AuditProbe { error },
            ));
        }

        items
    }

    /// Check every workspace in the directory plus the global checks
    pub async fn run_global_compliance_check(&self) -> GlobalComplianceResult {
        let started = Instant::now();
        let now = self.clock.now();
        let mut global_items = Vec::new();

        let workspaces = match self.query(self.sources.directory.list_workspaces()).await {
            Ok(workspaces) => workspaces,
            Err(e) => {
                tracing::error!(error = %e, "workspace directory unavailable");
                global_items.push(checks::evidence_unavailable(
                    None,
                    DriftType::DirectoryUnreachable,
                    EvidenceSource::WorkspaceDirectory,
                    Severity::Critical,
                    &e,
                ));
                Vec::new()
            }
        };

        let checks = workspaces
            .iter()
            .map(|w| self.check_workspace_compliance(&w.workspace_id, &w.platform));
        let (workspace_results, global) = tokio::join!(join_all(checks), self.check_global());
        global_items.extend(global);

        let result =
            GlobalComplianceResult::from_parts(global_items, workspace_results, now, started.elapsed());

        tracing::info!(
            status = %result.status,
            total = result.total_workspaces,
            passing = result.passing,
            warning = result.warning,
            failing = result.failing,
            global_items = result.global_items.len(),
            "global compliance run completed"
        );
        result
    }

    async fn query<T>(
        &self,
        fut: impl Future<Output = Result<T, EvidenceError>>,
    ) -> Result<T, EvidenceError> {
        match tokio::time::timeout(self.config.evidence_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(EvidenceError::Timeout {
                timeout_ms: self.config.evidence_timeout_ms,
            }),
        }
    }

    fn audit_check(&self, result: &ComplianceCheckResult) {
        let metadata = serde_json::json!({
            "status": result.status,
            "severity": result.overall_severity,
            "drift_types": result.drift_types(),
            "drift_count": result.drift_items.len(),
            "duration_ms": u64::try_from(result.check_duration.as_millis()).unwrap_or(u64::MAX),
        });
        let entry = AuditEntry::new(
            self.audit.system_context(&result.workspace_id),
            AuditAction::ComplianceCheck,
            "workspace",
            &result.workspace_id,
        )
        .with_scope(AuditScope::Workspace)
        .with_metadata(metadata);
        self.audit.emit_logged(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccm_core::{AuditConfig, CheckStatus, Clock, KillSwitchState, SnapshotEvidence, SnapshotFact};
    use ccm_test_utils::{chaos_config, t0, FakeEvidence, ManualClock, MemoryAuditSink};
    use pretty_assertions::assert_eq;

    struct Fixture {
        evidence: Arc<FakeEvidence>,
        clock: Arc<ManualClock>,
        sink: Arc<MemoryAuditSink>,
        audit: AuditEmitter,
        detector: DriftDetector,
    }

    fn fixture(evidence: FakeEvidence) -> Fixture {
        let evidence = Arc::new(evidence);
        let sink = MemoryAuditSink::shared();
        let clock = ManualClock::shared();
        let audit = AuditEmitter::spawn(sink.clone(), &AuditConfig::default());
        let detector = DriftDetector::new(
            EvidenceSources::from_single(evidence.clone()),
            audit.clone(),
            clock.clone(),
            DetectionConfig::default(),
        );
        Fixture {
            evidence,
            clock,
            sink,
            audit,
            detector,
        }
    }

    #[tokio::test]
    async fn healthy_workspace_passes_and_is_audited_once() {
        let f = fixture(FakeEvidence::new().with_healthy_workspace("ws-1", t0()));

        let result = f.detector.check_workspace_compliance("ws-1", "prod").await;
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.overall_severity, None);

        f.audit.flush().await.unwrap();
        assert_eq!(f.sink.count(AuditAction::ComplianceCheck), 1);
    }

    #[tokio::test]
    async fn items_follow_check_order() {
        let evidence = FakeEvidence::new();
        evidence.set_kill_switch("ws-1", "freeze", t0());
        evidence
            .failure_configs
            .insert("ws-1".into(), vec![chaos_config("fi-1")]);
        let f = fixture(evidence);

        let result = f.detector.check_workspace_compliance("ws-1", "prod").await;
        assert_eq!(
            result.drift_types(),
            vec![
                DriftType::SnapshotMissing,
                DriftType::KillSwitchActive,
                DriftType::FailureInjectionActive,
                DriftType::PermissionAnomaly,
            ]
        );
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.overall_severity, Some(Severity::Critical));
    }

    #[tokio::test]
    async fn unreachable_source_degrades_to_item() {
        let f = fixture(FakeEvidence::new().with_healthy_workspace("ws-1", t0()));
        f.evidence.fail(EvidenceSource::Membership);

        let result = f.detector.check_workspace_compliance("ws-1", "prod").await;
        assert_eq!(result.drift_items.len(), 1);
        let item = &result.drift_items[0];
        assert!(item.is_evidence_failure());
        assert_eq!(item.severity, Severity::Critical);
        assert_eq!(result.status, CheckStatus::Fail);

        f.evidence.heal(EvidenceSource::Membership);
        let recovered = f.detector.check_workspace_compliance("ws-1", "prod").await;
        assert_eq!(recovered.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn snapshot_goes_stale_as_clock_moves() {
        let f = fixture(FakeEvidence::new().with_healthy_workspace("ws-1", t0()));

        f.clock.set(t0() + chrono::Duration::days(6) + chrono::Duration::hours(1));
        let result = f.detector.check_workspace_compliance("ws-1", "prod").await;
        assert_eq!(result.drift_types(), vec![DriftType::SnapshotStale]);
        assert_eq!(result.status, CheckStatus::Warn);
        assert_eq!(result.timestamp, f.clock.now());
    }

    #[tokio::test]
    async fn unreachable_snapshot_source_is_high() {
        let f = fixture(FakeEvidence::new().with_healthy_workspace("ws-1", t0()));
        f.evidence.fail(EvidenceSource::Snapshots);

        let result = f.detector.check_workspace_compliance("ws-1", "prod").await;
        assert_eq!(result.status, CheckStatus::Warn);
        assert_eq!(result.overall_severity, Some(Severity::High));
    }

    struct HangingSnapshots;

    #[async_trait::async_trait]
    impl SnapshotEvidence for HangingSnapshots {
        async fn active_snapshots(
            &self,
            _workspace_id: &str,
            _platform: &str,
        ) -> Result<Vec<SnapshotFact>, EvidenceError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out_into_item() {
        let evidence = Arc::new(FakeEvidence::new().with_healthy_workspace("ws-1", t0()));
        let mut sources = EvidenceSources::from_single(evidence);
        sources.snapshots = Arc::new(HangingSnapshots);
        let audit = AuditEmitter::spawn(MemoryAuditSink::shared(), &AuditConfig::default());
        let detector = DriftDetector::new(
            sources,
            audit,
            ManualClock::shared(),
            DetectionConfig::default(),
        );

        let result = detector.check_workspace_compliance("ws-1", "prod").await;
        assert_eq!(result.drift_items.len(), 1);
        assert!(matches!(
            &result.drift_items[0].details,
            DriftDetails::EvidenceUnavailable { source: EvidenceSource::Snapshots, error }
                if error.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn global_kill_switch_and_audit_probe() {
        let f = fixture(FakeEvidence::new());
        assert!(f.detector.check_global().await.is_empty());

        *f.evidence.global_kill_switch.lock() = KillSwitchState {
            enabled: true,
            reason: Some("incident".into()),
            activated_at: Some(t0()),
        };
        f.sink.set_failing(true);

        let items = f.detector.check_global().await;
        let kinds: Vec<_> = items.iter().map(|i| (i.kind, i.severity)).collect();
        assert_eq!(
            kinds,
            vec![
                (DriftType::KillSwitchActive, Severity::Critical),
                (DriftType::AuditUnreachable, Severity::Critical),
            ]
        );
    }

    #[tokio::test]
    async fn failing_queued_writes_raise_audit_item() {
        let f = fixture(FakeEvidence::new().with_healthy_workspace("ws-1", t0()));
        f.sink.set_failing(true);
        f.detector.check_workspace_compliance("ws-1", "prod").await;
        f.audit.flush().await.unwrap();
        f.sink.set_failing(false);

        let items = f.detector.check_global().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, DriftType::AuditUnreachable);
    }

    #[tokio::test]
    async fn global_run_counts_workspaces() {
        let evidence = FakeEvidence::new()
            .with_healthy_workspace("ok", t0())
            .with_healthy_workspace("warn", t0())
            .with_healthy_workspace("bad", t0());
        evidence.set_kill_switch("warn", "maintenance", t0());
        evidence.memberships.insert("bad".into(), vec![]);
        let f = fixture(evidence);

        let result = f.detector.run_global_compliance_check().await;
        assert_eq!(result.total_workspaces, 3);
        assert_eq!((result.passing, result.warning, result.failing), (1, 1, 1));
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.global_items.is_empty());
    }

    #[tokio::test]
    async fn directory_failure_yields_global_item() {
        let f = fixture(FakeEvidence::new());
        f.evidence.fail(EvidenceSource::WorkspaceDirectory);

        let result = f.detector.run_global_compliance_check().await;
        assert_eq!(result.total_workspaces, 0);
        assert_eq!(result.global_items.len(), 1);
        assert_eq!(result.global_items[0].kind, DriftType::DirectoryUnreachable);
        assert_eq!(result.overall_severity, Some(Severity::Critical));
    }
}
