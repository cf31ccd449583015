//! Control loop wiring
//!
//! One workspace cycle:
//! detect -> PASS ? resolve : record + escalate, with auto-response run
//! alongside on the raw result and any opened incident linked back to the
//! drift record.

use ccm_alert::AlertDispatcher;
use ccm_core::{
    AuditEmitter, AuditSink, ComplianceCheckResult, DriftItem, DriftRecord, EngineConfig,
    EvidenceSources, IncidentRecord, InMemoryStore, SharedClock, SharedStore, SharedTransport,
    StoreError,
};
use ccm_detect::DriftDetector;
use ccm_escalation::{DriftTracker, EscalationResult};
use ccm_response::{AutoResponseExecutor, AutoResponseResult};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// Keyed stores backing the engine state
#[derive(Debug, Clone)]
pub struct EngineStores {
    pub drifts: SharedStore<DriftRecord>,
    pub cooldowns: SharedStore<DateTime<Utc>>,
    pub incidents: SharedStore<IncidentRecord>,
}

impl EngineStores {
    /// Process-local stores
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            drifts: InMemoryStore::shared(),
            cooldowns: InMemoryStore::shared(),
            incidents: InMemoryStore::shared(),
        }
    }
}

impl Default for EngineStores {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Outcome of one workspace cycle
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceCycle {
    pub result: ComplianceCheckResult,
    /// Open record after the cycle; `None` on PASS
    pub drift: Option<DriftRecord>,
    pub escalation: Option<EscalationResult>,
    pub auto_response: AutoResponseResult,
    /// Store failures hit during the cycle
    pub errors: Vec<String>,
}

/// Outcome of `run_cycle`
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub workspaces: Vec<WorkspaceCycle>,
    pub global_items: Vec<DriftItem>,
}

impl CycleReport {
    /// Workspaces whose cycle triggered the auto-response playbook
    #[must_use]
    pub fn triggered(&self) -> Vec<&str> {
        self.workspaces
            .iter()
            .filter(|w| w.auto_response.triggered)
            .map(|w| w.result.workspace_id.as_str())
            .collect()
    }
}

/// Compliance engine
pub struct ComplianceEngine {
    detector: DriftDetector,
    tracker: DriftTracker,
    dispatcher: Arc<AlertDispatcher>,
    executor: AutoResponseExecutor,
    audit: AuditEmitter,
}

impl std::fmt::Debug for ComplianceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceEngine")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl ComplianceEngine {
    /// Wire an engine over in-memory stores
    ///
    /// Spawns the audit worker, so it must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        sources: EvidenceSources,
        transport: SharedTransport,
        audit_sink: Arc<dyn AuditSink>,
        clock: SharedClock,
    ) -> Self {
        Self::with_stores(
            config,
            sources,
            transport,
            audit_sink,
            clock,
            EngineStores::in_memory(),
        )
    }

    /// Wire an engine over the given stores
    #[must_use]
    pub fn with_stores(
        config: EngineConfig,
        sources: EvidenceSources,
        transport: SharedTransport,
        audit_sink: Arc<dyn AuditSink>,
        clock: SharedClock,
        stores: EngineStores,
    ) -> Self {
        let audit = AuditEmitter::spawn(audit_sink, &config.audit);

        let dispatcher = Arc::new(AlertDispatcher::new(
            Arc::clone(&transport),
            config.alerts.clone(),
            audit.clone(),
            Arc::clone(&clock),
        ));

        let tracker = DriftTracker::new(
            stores.drifts,
            dispatcher.clone(),
            audit.clone(),
            Arc::clone(&clock),
            config.escalation.clone(),
        )
        .with_alert_source(config.alerts.source.clone());

        let executor = AutoResponseExecutor::new(
            Arc::clone(&sources.kill_switch),
            transport,
            stores.incidents,
            stores.cooldowns,
            audit.clone(),
            Arc::clone(&clock),
            config.auto_response.clone(),
        );

        let detector = DriftDetector::new(sources, audit.clone(), clock, config.detection);

        Self {
            detector,
            tracker,
            dispatcher,
            executor,
            audit,
        }
    }

    /// Run one cycle for a workspace
    ///
    /// Never fails: store errors are logged and reported in
    /// [`WorkspaceCycle::errors`].
    pub async fn run_workspace_cycle(&self, workspace_id: &str, platform: &str) -> WorkspaceCycle {
        let result = self
            .detector
            .check_workspace_compliance(workspace_id, platform)
            .await;

        let (tracked, auto_response) =
            tokio::join!(self.track(&result), self.executor.execute_auto_response(&result));
        let (drift, escalation, mut errors) = tracked;

        if let (Some(_), Some(incident_id)) = (&drift, auto_response.incident_id) {
            match self.tracker.link_incident(workspace_id, incident_id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(workspace_id, %incident_id, "no open drift to link");
                }
                Err(e) => {
                    tracing::error!(workspace_id, %incident_id, error = %e, "failed to link incident");
                    errors.push(e.to_string());
                }
            }
        }

        // Reload so the escalation and incident link are reflected.
        let drift = match drift {
            Some(recorded) => match self.tracker.get_drift(workspace_id).await {
                Ok(Some(current)) if current.id == recorded.id => Some(current),
                Ok(_) => Some(recorded),
                Err(e) => {
                    tracing::error!(workspace_id, error = %e, "failed to reload drift");
                    errors.push(e.to_string());
                    Some(recorded)
                }
            },
            None => None,
        };

        WorkspaceCycle {
            result,
            drift,
            escalation,
            auto_response,
            errors,
        }
    }

    async fn track(
        &self,
        result: &ComplianceCheckResult,
    ) -> (Option<DriftRecord>, Option<EscalationResult>, Vec<String>) {
        let workspace_id = result.workspace_id.as_str();
        let mut errors = Vec::new();

        if result.is_pass() {
            if let Err(e) = self.tracker.resolve_drift(workspace_id).await {
                tracing::error!(workspace_id, error = %e, "failed to resolve drift");
                errors.push(e.to_string());
            }
            return (None, None, errors);
        }

        let record = match self
            .tracker
            .record_drift(
                workspace_id,
                result.status,
                result.overall_severity,
                result.drift_items.clone(),
            )
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return (None, None, errors),
            Err(e) => {
                tracing::error!(workspace_id, error = %e, "failed to record drift");
                errors.push(e.to_string());
                return (None, None, errors);
            }
        };

        let escalation = match self.tracker.check_and_escalate(&record).await {
            Ok(escalation) => Some(escalation),
            Err(e) => {
                tracing::error!(workspace_id, error = %e, "escalation check failed");
                errors.push(e.to_string());
                None
            }
        };

        (Some(record), escalation, errors)
    }

    /// Run workspace cycles concurrently, then the global checks
    pub async fn run_cycle<'a, I>(&self, workspaces: I) -> CycleReport
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let workspaces = join_all(
            workspaces
                .into_iter()
                .map(|(ws, platform)| self.run_workspace_cycle(ws, platform)),
        )
        .await;
        let global_items = self.detector.check_global().await;

        tracing::info!(
            workspaces = workspaces.len(),
            global_items = global_items.len(),
            "compliance cycle complete"
        );

        CycleReport {
            workspaces,
            global_items,
        }
    }

    /// Re-evaluate every open drift against the SLA
    ///
    /// # Errors
    /// Store failures while listing open drifts
    pub async fn sweep_escalations(&self) -> Result<Vec<EscalationResult>, StoreError> {
        self.tracker.check_all_escalations().await
    }

    /// Wait for queued audit entries to reach the sink
    pub async fn flush_audit(&self) {
        if let Err(e) = self.audit.flush().await {
            tracing::warn!(error = %e, "audit flush failed");
        }
    }

    #[inline]
    #[must_use]
    pub fn detector(&self) -> &DriftDetector {
        &self.detector
    }

    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &DriftTracker {
        &self.tracker
    }

    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    #[inline]
    #[must_use]
    pub fn executor(&self) -> &AutoResponseExecutor {
        &self.executor
    }

    #[inline]
    #[must_use]
    pub fn audit(&self) -> &AuditEmitter {
        &self.audit
    }
}
