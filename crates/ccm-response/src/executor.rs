//! Auto-response executor
//!
//! Runs the fixed playbook for FAIL/CRITICAL results outside the
//! per-workspace cooldown:
//! 1. Enable the workspace kill-switch
//! 2. Notify on-call
//! 3. Open an incident embedding the step outcomes
//!
//! Each step is independently fallible; failures are collected, never thrown.
//! Also owns the human side of the incident lifecycle.

use ccm_core::{
    AuditAction, AuditContext, AuditEmitter, AuditEntry, AutoActionRecord, AutoActionType,
    AutoResponseConfig, ComplianceCheckResult, HttpRequest, IncidentError, IncidentId,
    IncidentRecord, IncidentStatus, KillSwitchEnableOutcome, KillSwitchEvidence, SharedClock,
    SharedStore, SharedTransport, StoreError, TransportError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Attempts before an incident update is reported as contended
const MAX_CAS_ATTEMPTS: usize = 3;

/// Audit role recorded for human incident actions
const RESPONDER_ROLE: &str = "incident_responder";

/// Why the playbook did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Result was not FAIL/CRITICAL
    NotCritical,
    /// Workspace triggered within the cooldown window
    Cooldown,
    /// Auto-response switched off in configuration
    Disabled,
    /// Cooldown state could not be read or written
    CooldownUnavailable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotCritical => write!(f, "not_critical"),
            Self::Cooldown => write!(f, "cooldown"),
            Self::Disabled => write!(f, "disabled"),
            Self::CooldownUnavailable => write!(f, "cooldown_unavailable"),
        }
    }
}

/// Outcome of `execute_auto_response`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoResponseResult {
    pub triggered: bool,
    pub reason: Option<SkipReason>,
    pub incident_id: Option<IncidentId>,
    pub actions: Vec<AutoActionRecord>,
    pub errors: Vec<String>,
}

impl AutoResponseResult {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            triggered: false,
            reason: Some(reason),
            incident_id: None,
            actions: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Auto-response playbook and incident lifecycle
pub struct AutoResponseExecutor {
    kill_switch: Arc<dyn KillSwitchEvidence>,
    transport: SharedTransport,
    incidents: SharedStore<IncidentRecord>,
    cooldowns: SharedStore<DateTime<Utc>>,
    audit: AuditEmitter,
    clock: SharedClock,
    config: AutoResponseConfig,
}

impl std::fmt::Debug for AutoResponseExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoResponseExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AutoResponseExecutor {
    /// Create new executor
    #[must_use]
    pub fn new(
        kill_switch: Arc<dyn KillSwitchEvidence>,
        transport: SharedTransport,
        incidents: SharedStore<IncidentRecord>,
        cooldowns: SharedStore<DateTime<Utc>>,
        audit: AuditEmitter,
        clock: SharedClock,
        config: AutoResponseConfig,
    ) -> Self {
        Self {
            kill_switch,
            transport,
            incidents,
            cooldowns,
            audit,
            clock,
            config,
        }
    }

    /// Run the playbook if `result` is FAIL/CRITICAL and outside cooldown
    pub async fn execute_auto_response(&self, result: &ComplianceCheckResult) -> AutoResponseResult {
        let workspace_id = result.workspace_id.as_str();

        if !self.config.enabled {
            return AutoResponseResult::skipped(SkipReason::Disabled);
        }
        if !result.is_critical_failure() {
            return AutoResponseResult::skipped(SkipReason::NotCritical);
        }

        match self.claim_cooldown(workspace_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(workspace_id, "auto-response suppressed by cooldown");
                return AutoResponseResult::skipped(SkipReason::Cooldown);
            }
            Err(e) => {
                tracing::error!(workspace_id, error = %e, "cooldown store unavailable");
                let mut skipped = AutoResponseResult::skipped(SkipReason::CooldownUnavailable);
                skipped.errors.push(e.to_string());
                return skipped;
            }
        }

        let incident_id = IncidentId::new();
        tracing::warn!(workspace_id, %incident_id, "executing auto-response playbook");
        metrics::counter!("ccm_auto_response_triggered_total").increment(1);

        let mut actions = Vec::with_capacity(3);
        actions.push(self.enable_kill_switch(workspace_id, incident_id).await);
        actions.push(self.notify_oncall(result, incident_id).await);
        actions.push(self.open_incident(result, incident_id, &actions).await);

        let errors: Vec<String> = actions
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| format!("{}: {e}", a.action)))
            .collect();

        for error in &errors {
            tracing::error!(workspace_id, %incident_id, %error, "auto-response step failed");
        }

        let entry = AuditEntry::new(
            self.context(workspace_id),
            AuditAction::AutoResponseExecuted,
            "incident",
            incident_id.to_string(),
        )
        .with_reason(incident_reason(result))
        .with_metadata(serde_json::json!({
            "actions": actions,
            "errors": errors,
            "drift_types": result.drift_types(),
        }));
        self.audit.emit_logged(entry);

        AutoResponseResult {
            triggered: true,
            reason: None,
            incident_id: Some(incident_id),
            actions,
            errors,
        }
    }

    /// Enable the workspace kill-switch for `incident_id`
    ///
    /// Enabling an already-enabled switch is a success. Every call is audited.
    pub async fn enable_kill_switch(
        &self,
        workspace_id: &str,
        incident_id: IncidentId,
    ) -> AutoActionRecord {
        let reason = format!("Auto-response to critical compliance drift (incident {incident_id})");
        let timeout = self.config.notify_timeout();

        let outcome = tokio::time::timeout(
            timeout,
            self.kill_switch
                .enable(workspace_id, &reason, &self.config.actor_id),
        )
        .await;

        let now = self.clock.now();
        let record = match outcome {
            Ok(Ok(KillSwitchEnableOutcome::Enabled)) => {
                AutoActionRecord::succeeded(AutoActionType::EnableKillSwitch, now)
                    .with_details("kill-switch enabled")
            }
            Ok(Ok(KillSwitchEnableOutcome::AlreadyEnabled)) => {
                AutoActionRecord::succeeded(AutoActionType::EnableKillSwitch, now)
                    .with_details("kill-switch already enabled")
            }
            Ok(Err(e)) => AutoActionRecord::failed(AutoActionType::EnableKillSwitch, now, e.to_string()),
            Err(_) => AutoActionRecord::failed(
                AutoActionType::EnableKillSwitch,
                now,
                format!("kill-switch enable timed out after {}ms", self.config.notify_timeout_ms),
            ),
        };

        let entry = AuditEntry::new(
            self.context(workspace_id),
            AuditAction::KillSwitchEnabled,
            "kill_switch",
            workspace_id,
        )
        .with_reason(reason)
        .with_metadata(serde_json::json!({
            "incident_id": incident_id.to_string(),
            "success": record.success,
            "details": record.details,
            "error": record.error,
        }));
        self.audit.emit_logged(entry);

        record
    }

    async fn notify_oncall(
        &self,
        result: &ComplianceCheckResult,
        incident_id: IncidentId,
    ) -> AutoActionRecord {
        let Some(url) = self.config.oncall_webhook_url.as_deref() else {
            return AutoActionRecord::succeeded(AutoActionType::SendNotification, self.clock.now())
                .with_details("skipped: on-call webhook not configured");
        };

        let body = serde_json::json!({
            "event": "auto_response",
            "incident_id": incident_id.to_string(),
            "workspace_id": result.workspace_id,
            "severity": result.overall_severity,
            "reason": incident_reason(result),
            "snapshot_id": result.first_snapshot_id(),
            "drift_items": result.drift_items,
            "timestamp": result.timestamp,
        });
        let request = HttpRequest::post_json(url, body);
        let timeout = self.config.notify_timeout();

        let response = match tokio::time::timeout(timeout, self.transport.post(&request, timeout)).await {
            Ok(r) => r,
            Err(_) => Err(TransportError::Timeout {
                timeout_ms: self.config.notify_timeout_ms,
            }),
        };

        let now = self.clock.now();
        match response {
            Ok(resp) if resp.is_success() => {
                AutoActionRecord::succeeded(AutoActionType::SendNotification, now)
                    .with_details(format!("HTTP {}", resp.status))
            }
            Ok(resp) => AutoActionRecord::failed(
                AutoActionType::SendNotification,
                now,
                format!("on-call webhook returned HTTP {}", resp.status),
            ),
            Err(e) => AutoActionRecord::failed(AutoActionType::SendNotification, now, e.to_string()),
        }
    }

    async fn open_incident(
        &self,
        result: &ComplianceCheckResult,
        incident_id: IncidentId,
        prior: &[AutoActionRecord],
    ) -> AutoActionRecord {
        let now = self.clock.now();
        let opened = AutoActionRecord::succeeded(AutoActionType::OpenIncident, now)
            .with_details(format!("incident {incident_id} opened"));

        let mut auto_actions = prior.to_vec();
        auto_actions.push(opened.clone());

        let record = IncidentRecord {
            id: incident_id,
            workspace_id: result.workspace_id.clone(),
            snapshot_id: result.first_snapshot_id().map(str::to_string),
            severity: result
                .overall_severity
                .unwrap_or(ccm_core::Severity::Critical),
            reason: incident_reason(result),
            drift_items: result.drift_items.clone(),
            timestamp: now,
            auto_actions,
            status: IncidentStatus::Open,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_reason: None,
        };

        match self
            .incidents
            .compare_and_set(&incident_id.to_string(), None, Some(record))
            .await
        {
            Ok(true) => {
                tracing::info!(workspace_id = %result.workspace_id, %incident_id, "incident opened");
                opened
            }
            Ok(false) => AutoActionRecord::failed(
                AutoActionType::OpenIncident,
                now,
                format!("incident {incident_id} already exists"),
            ),
            Err(e) => AutoActionRecord::failed(AutoActionType::OpenIncident, now, e.to_string()),
        }
    }

    /// Atomically claim the workspace's trigger slot
    ///
    /// Returns `false` when the last trigger is within the cooldown window or
    /// a concurrent caller claimed it first.
    async fn claim_cooldown(&self, workspace_id: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let cooldown = chrono::Duration::minutes(self.config.cooldown_minutes);

        let last = self.cooldowns.get(workspace_id).await?;
        if let Some(last) = last {
            if now - last < cooldown {
                return Ok(false);
            }
        }
        self.cooldowns
            .compare_and_set(workspace_id, last.as_ref(), Some(now))
            .await
    }

    /// Acknowledge an open incident
    ///
    /// # Errors
    /// `ReasonRequired`/`ActorRequired` on empty input, `NotFound`,
    /// `InvalidTransition` unless the incident is OPEN
    pub async fn acknowledge_incident(
        &self,
        incident_id: IncidentId,
        actor_id: &str,
        reason: &str,
    ) -> Result<IncidentRecord, IncidentError> {
        self.transition(incident_id, actor_id, reason, AuditAction::IncidentAcknowledged, |record, now| {
            record.acknowledge(actor_id, now)
        })
        .await
    }

    /// Resolve an incident from OPEN or ACKNOWLEDGED
    ///
    /// # Errors
    /// `ReasonRequired`/`ActorRequired` on empty input, `NotFound`,
    /// `InvalidTransition` if already resolved
    pub async fn resolve_incident(
        &self,
        incident_id: IncidentId,
        actor_id: &str,
        reason: &str,
    ) -> Result<IncidentRecord, IncidentError> {
        self.transition(incident_id, actor_id, reason, AuditAction::IncidentResolved, |record, now| {
            record.resolve(actor_id, reason, now)
        })
        .await
    }

    async fn transition<F>(
        &self,
        incident_id: IncidentId,
        actor_id: &str,
        reason: &str,
        action: AuditAction,
        apply: F,
    ) -> Result<IncidentRecord, IncidentError>
    where
        F: Fn(&mut IncidentRecord, DateTime<Utc>) -> Result<(), IncidentError>,
    {
        if actor_id.trim().is_empty() {
            return Err(IncidentError::ActorRequired);
        }
        if reason.trim().is_empty() {
            return Err(IncidentError::ReasonRequired);
        }

        let key = incident_id.to_string();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .incidents
                .get(&key)
                .await?
                .ok_or(IncidentError::NotFound(incident_id))?;
            let from = current.status;

            let mut updated = current.clone();
            apply(&mut updated, self.clock.now())?;

            if self
                .incidents
                .compare_and_set(&key, Some(&current), Some(updated.clone()))
                .await?
            {
                tracing::info!(
                    %incident_id,
                    actor_id,
                    from = %from,
                    to = %updated.status,
                    "incident updated"
                );
                let entry = AuditEntry::new(
                    AuditContext::new(&updated.workspace_id, actor_id, RESPONDER_ROLE),
                    action,
                    "incident",
                    &key,
                )
                .with_reason(reason)
                .with_metadata(serde_json::json!({ "from": from, "to": updated.status }));
                self.audit.emit_logged(entry);
                return Ok(updated);
            }
        }
        Err(IncidentError::Contended(incident_id))
    }

    /// Incidents that are not RESOLVED, oldest first
    ///
    /// # Errors
    /// Store failures
    pub async fn get_open_incidents(&self) -> Result<Vec<IncidentRecord>, StoreError> {
        let mut open: Vec<_> = self
            .incidents
            .values()
            .await?
            .into_iter()
            .filter(|i| !i.status.is_terminal())
            .collect();
        open.sort_by_key(|i| i.timestamp);
        Ok(open)
    }

    /// Every incident, oldest first
    ///
    /// # Errors
    /// Store failures
    pub async fn get_all_incidents(&self) -> Result<Vec<IncidentRecord>, StoreError> {
        let mut all = self.incidents.values().await?;
        all.sort_by_key(|i| i.timestamp);
        Ok(all)
    }

    /// One incident by id
    ///
    /// # Errors
    /// Store failures
    pub async fn get_incident(
        &self,
        incident_id: IncidentId,
    ) -> Result<Option<IncidentRecord>, StoreError> {
        self.incidents.get(&incident_id.to_string()).await
    }

    fn context(&self, workspace_id: &str) -> AuditContext {
        AuditContext::new(workspace_id, &self.config.actor_id, "system")
    }
}

/// Drift messages joined with `"; "`
fn incident_reason(result: &ComplianceCheckResult) -> String {
    result
        .drift_items
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccm_core::{AuditConfig, EvidenceError, InMemoryStore, KillSwitchState};
    use ccm_test_utils::{
        critical_result, pass_result, t0, warn_result, FakeEvidence, ManualClock, MemoryAuditSink,
        Scripted, ScriptedTransport,
    };
    use mockall::{mock, Sequence};
    use pretty_assertions::assert_eq;

    mock! {
        pub KillSwitch {}

        #[async_trait::async_trait]
        impl KillSwitchEvidence for KillSwitch {
            async fn workspace_status(&self, workspace_id: &str) -> Result<KillSwitchState, EvidenceError>;
            async fn global_status(&self) -> Result<KillSwitchState, EvidenceError>;
            async fn enable(
                &self,
                workspace_id: &str,
                reason: &str,
                actor_id: &str,
            ) -> Result<KillSwitchEnableOutcome, EvidenceError>;
        }
    }

    const ONCALL: &str = "https://oncall.test/hook";

    struct Fixture {
        clock: Arc<ManualClock>,
        transport: Arc<ScriptedTransport>,
        sink: Arc<MemoryAuditSink>,
        audit: AuditEmitter,
        executor: AutoResponseExecutor,
    }

    fn fixture_with(kill_switch: Arc<dyn KillSwitchEvidence>, config: AutoResponseConfig) -> Fixture {
        let clock = ManualClock::shared();
        let transport = ScriptedTransport::shared();
        let sink = MemoryAuditSink::shared();
        let audit = AuditEmitter::spawn(sink.clone(), &AuditConfig::default());
        let executor = AutoResponseExecutor::new(
            kill_switch,
            transport.clone(),
            InMemoryStore::shared(),
            InMemoryStore::shared(),
            audit.clone(),
            clock.clone(),
            config,
        );
        Fixture {
            clock,
            transport,
            sink,
            audit,
            executor,
        }
    }

    fn fixture() -> (Fixture, Arc<FakeEvidence>) {
        let evidence = Arc::new(FakeEvidence::new());
        let config = AutoResponseConfig {
            oncall_webhook_url: Some(ONCALL.into()),
            ..AutoResponseConfig::default()
        };
        (fixture_with(evidence.clone(), config), evidence)
    }

    #[tokio::test]
    async fn non_critical_results_do_nothing() {
        let (f, evidence) = fixture();
        for result in [warn_result("ws", t0()), pass_result("ws", t0())] {
            let out = f.executor.execute_auto_response(&result).await;
            assert!(!out.triggered);
            assert_eq!(out.reason, Some(SkipReason::NotCritical));
        }
        assert_eq!(evidence.enable_calls(), 0);
        assert!(f.executor.get_all_incidents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn playbook_runs_all_steps_in_order() {
        let (f, evidence) = fixture();
        let result = critical_result("ws", t0());

        let out = f.executor.execute_auto_response(&result).await;
        assert!(out.triggered);
        assert!(out.errors.is_empty());
        let steps: Vec<_> = out.actions.iter().map(|a| (a.action, a.success)).collect();
        assert_eq!(
            steps,
            vec![
                (AutoActionType::EnableKillSwitch, true),
                (AutoActionType::SendNotification, true),
                (AutoActionType::OpenIncident, true),
            ]
        );

        assert!(evidence.kill_switches.get("ws").unwrap().enabled);
        assert_eq!(f.transport.requests_to(ONCALL).len(), 1);

        let incident = f
            .executor
            .get_incident(out.incident_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(incident.status, IncidentStatus::Open);
        assert_eq!(incident.snapshot_id.as_deref(), Some("snap-9"));
        assert_eq!(
            incident.reason,
            "kill-switch enabled; failure injection 'latency' enabled"
        );
        assert_eq!(incident.auto_actions.len(), 3);
        assert!(incident.fully_executed());

        f.audit.flush().await.unwrap();
        assert_eq!(f.sink.count(AuditAction::AutoResponseExecuted), 1);
        assert_eq!(f.sink.count(AuditAction::KillSwitchEnabled), 1);
    }

    #[tokio::test]
    async fn cooldown_suppresses_second_trigger() {
        let (f, evidence) = fixture();
        let result = critical_result("ws", t0());

        assert!(f.executor.execute_auto_response(&result).await.triggered);

        f.clock.advance_minutes(4);
        let second = f.executor.execute_auto_response(&result).await;
        assert!(!second.triggered);
        assert_eq!(second.reason, Some(SkipReason::Cooldown));
        assert_eq!(evidence.enable_calls(), 1);
        assert_eq!(f.executor.get_all_incidents().await.unwrap().len(), 1);

        f.clock.advance_minutes(1);
        assert!(f.executor.execute_auto_response(&result).await.triggered);
        assert_eq!(f.executor.get_all_incidents().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cooldown_is_per_workspace() {
        let (f, _) = fixture();
        assert!(f.executor.execute_auto_response(&critical_result("a", t0())).await.triggered);
        assert!(f.executor.execute_auto_response(&critical_result("b", t0())).await.triggered);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_claim_once() {
        let (f, evidence) = fixture();
        let f = Arc::new(f);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                f.executor
                    .execute_auto_response(&critical_result("ws", t0()))
                    .await
                    .triggered
            }));
        }
        let mut triggered = 0;
        for h in handles {
            if h.await.unwrap() {
                triggered += 1;
            }
        }
        assert_eq!(triggered, 1);
        assert_eq!(evidence.enable_calls(), 1);
    }

    #[tokio::test]
    async fn step_failures_are_collected() {
        let (f, evidence) = fixture();
        evidence.fail(ccm_core::EvidenceSource::KillSwitch);
        f.transport.script(ONCALL, [Scripted::Status(503)]);

        let out = f.executor.execute_auto_response(&critical_result("ws", t0())).await;
        assert!(out.triggered);
        assert_eq!(out.errors.len(), 2);
        assert!(!out.actions[0].success);
        assert!(!out.actions[1].success);
        assert!(out.actions[2].success);

        let incident = f.executor.get_incident(out.incident_id.unwrap()).await.unwrap().unwrap();
        assert!(!incident.fully_executed());
    }

    #[tokio::test]
    async fn missing_oncall_url_is_a_skip() {
        let evidence = Arc::new(FakeEvidence::new());
        let f = fixture_with(evidence, AutoResponseConfig::default());
        let out = f.executor.execute_auto_response(&critical_result("ws", t0())).await;
        assert!(out.errors.is_empty());
        assert!(out.actions[1].success);
        assert!(out.actions[1].details.as_deref().unwrap().starts_with("skipped"));
        assert!(f.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn enabling_twice_is_idempotent() {
        let (f, evidence) = fixture();
        let incident = IncidentId::new();

        let first = f.executor.enable_kill_switch("ws", incident).await;
        let second = f.executor.enable_kill_switch("ws", incident).await;

        assert!(first.success && second.success);
        assert_eq!(second.details.as_deref(), Some("kill-switch already enabled"));
        assert_eq!(evidence.enable_calls(), 2);
        assert!(evidence.kill_switches.get("ws").unwrap().enabled);

        f.audit.flush().await.unwrap();
        assert_eq!(f.sink.count(AuditAction::KillSwitchEnabled), 2);
    }

    #[tokio::test]
    async fn enable_passes_incident_reason_to_store() {
        let incident = IncidentId::new();
        let expected = incident.to_string();

        let mut mock = MockKillSwitch::new();
        let mut seq = Sequence::new();
        mock.expect_enable()
            .withf(move |ws, reason, actor| {
                ws.to_string() == "ws"
                    && reason.contains(&expected)
                    && actor.to_string() == "system:auto-response"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(KillSwitchEnableOutcome::Enabled));
        mock.expect_enable()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(KillSwitchEnableOutcome::AlreadyEnabled));

        let f = fixture_with(Arc::new(mock), AutoResponseConfig::default());
        assert!(f.executor.enable_kill_switch("ws", incident).await.success);
        assert!(f.executor.enable_kill_switch("ws", incident).await.success);
    }

    #[tokio::test]
    async fn rejected_enable_is_recorded_as_failure() {
        let mut mock = MockKillSwitch::new();
        mock.expect_enable()
            .returning(|_, _, _| Err(EvidenceError::Rejected("read-only workspace".into())));

        let f = fixture_with(Arc::new(mock), AutoResponseConfig::default());
        let record = f.executor.enable_kill_switch("ws", IncidentId::new()).await;
        assert!(!record.success);
        assert!(record.error.unwrap().contains("read-only"));
    }

    #[tokio::test]
    async fn incident_lifecycle_moves_forward_only() {
        let (f, _) = fixture();
        let out = f.executor.execute_auto_response(&critical_result("ws", t0())).await;
        let id = out.incident_id.unwrap();

        assert!(matches!(
            f.executor.acknowledge_incident(id, "alice", "  ").await,
            Err(IncidentError::ReasonRequired)
        ));

        let acked = f.executor.acknowledge_incident(id, "alice", "looking").await.unwrap();
        assert_eq!(acked.status, IncidentStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("alice"));
        assert_eq!(f.executor.get_open_incidents().await.unwrap().len(), 1);

        assert!(matches!(
            f.executor.acknowledge_incident(id, "bob", "again").await,
            Err(IncidentError::InvalidTransition { .. })
        ));

        let resolved = f.executor.resolve_incident(id, "alice", "chaos config removed").await.unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
        assert_eq!(resolved.resolution_reason.as_deref(), Some("chaos config removed"));
        assert!(f.executor.get_open_incidents().await.unwrap().is_empty());
        assert_eq!(f.executor.get_all_incidents().await.unwrap().len(), 1);

        assert!(matches!(
            f.executor.resolve_incident(id, "alice", "again").await,
            Err(IncidentError::InvalidTransition { .. })
        ));

        f.audit.flush().await.unwrap();
        assert_eq!(f.sink.count(AuditAction::IncidentAcknowledged), 1);
        assert_eq!(f.sink.count(AuditAction::IncidentResolved), 1);
    }

    #[tokio::test]
    async fn resolve_directly_from_open() {
        let (f, _) = fixture();
        let out = f.executor.execute_auto_response(&critical_result("ws", t0())).await;
        let resolved = f
            .executor
            .resolve_incident(out.incident_id.unwrap(), "alice", "false positive")
            .await
            .unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
    }

    #[tokio::test]
    async fn unknown_incident_is_not_found() {
        let (f, _) = fixture();
        assert!(matches!(
            f.executor.resolve_incident(IncidentId::new(), "alice", "x").await,
            Err(IncidentError::NotFound(_))
        ));
    }
}
