//! Drift tracker
//!
//! Keeps exactly one open [`DriftRecord`] per workspace and escalates it as it
//! ages. Transitions for one workspace are serialized by a per-workspace lane
//! and written with compare-and-set, so overlapping cycles cannot lose an
//! update or lower a level.

use crate::policy::{next_level, required_level};
use ccm_core::{
    AlertDeliveryResult, AlertPayload, AlertSender, AlertSeverity, AuditAction, AuditEmitter,
    AuditEntry, CheckStatus, DriftId, DriftItem, DriftRecord, EscalationConfig, EscalationLevel,
    IncidentId, Severity, SharedClock, SharedStore, StoreError,
};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Attempts before a compare-and-set is reported as contended
const MAX_CAS_ATTEMPTS: usize = 3;

/// Outcome of one escalation check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationResult {
    pub workspace_id: String,
    pub drift_id: DriftId,
    pub escalated: bool,
    pub previous_level: EscalationLevel,
    pub new_level: EscalationLevel,
    pub age_minutes: i64,
    /// Delivery outcome when the new level dispatches an alert
    pub alert: Option<AlertDeliveryResult>,
}

impl EscalationResult {
    fn unchanged(record: &DriftRecord, age_minutes: i64) -> Self {
        Self {
            workspace_id: record.workspace_id.clone(),
            drift_id: record.id,
            escalated: false,
            previous_level: record.escalation_level,
            new_level: record.escalation_level,
            age_minutes,
            alert: None,
        }
    }
}

/// Per-workspace drift state and escalation
pub struct DriftTracker {
    store: SharedStore<DriftRecord>,
    lanes: DashMap<String, Arc<Mutex<()>>>,
    alerts: Arc<dyn AlertSender>,
    audit: AuditEmitter,
    clock: SharedClock,
    config: EscalationConfig,
    alert_source: String,
}

impl std::fmt::Debug for DriftTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftTracker")
            .field("config", &self.config)
            .field("lanes", &self.lanes.len())
            .finish_non_exhaustive()
    }
}

impl DriftTracker {
    /// Create new tracker
    #[must_use]
    pub fn new(
        store: SharedStore<DriftRecord>,
        alerts: Arc<dyn AlertSender>,
        audit: AuditEmitter,
        clock: SharedClock,
        config: EscalationConfig,
    ) -> Self {
        Self {
            store,
            lanes: DashMap::new(),
            alerts,
            audit,
            clock,
            config,
            alert_source: "compliance-monitor".to_string(),
        }
    }

    /// With alert source name
    #[must_use]
    pub fn with_alert_source(mut self, source: impl Into<String>) -> Self {
        self.alert_source = source.into();
        self
    }

    fn lane(&self, workspace_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.lanes.entry(workspace_id.to_string()).or_default().value())
    }

    /// Create or refresh the workspace's open drift record
    ///
    /// Never changes the escalation level. A PASS status resolves the record
    /// instead and returns `None`.
    ///
    /// # Errors
    /// Store failures, or `StoreError::Unavailable` if the record kept
    /// changing underneath the write
    pub async fn record_drift(
        &self,
        workspace_id: &str,
        status: CheckStatus,
        severity: Option<Severity>,
        drift_items: Vec<DriftItem>,
    ) -> Result<Option<DriftRecord>, StoreError> {
        if status == CheckStatus::Pass {
            self.resolve_drift(workspace_id).await?;
            return Ok(None);
        }

        let lane = self.lane(workspace_id);
        let _guard = lane.lock().await;
        let now = self.clock.now();

        for _ in 0..MAX_CAS_ATTEMPTS {
            match self.store.get(workspace_id).await? {
                Some(current) => {
                    let mut updated = current.clone();
                    updated.status = status;
                    updated.severity = severity;
                    updated.drift_items.clone_from(&drift_items);
                    updated.last_checked_at = now;

                    if self
                        .store
                        .compare_and_set(workspace_id, Some(&current), Some(updated.clone()))
                        .await?
                    {
                        tracing::debug!(
                            workspace_id,
                            drift_id = %updated.id,
                            %status,
                            "drift refreshed"
                        );
                        return Ok(Some(updated));
                    }
                }
                None => {
                    let record =
                        DriftRecord::open(workspace_id, status, severity, drift_items.clone(), now);

                    if self
                        .store
                        .compare_and_set(workspace_id, None, Some(record.clone()))
                        .await?
                    {
                        tracing::info!(
                            workspace_id,
                            drift_id = %record.id,
                            %status,
                            severity = ?severity,
                            "drift detected"
                        );
                        metrics::counter!("ccm_drift_detected_total").increment(1);
                        self.audit_record(&record, AuditAction::DriftDetected, None);
                        return Ok(Some(record));
                    }
                }
            }
        }

        Err(StoreError::Unavailable(format!(
            "drift record for {workspace_id} is contended"
        )))
    }

    /// Close the workspace's open drift record
    ///
    /// Returns whether a record existed. The next detection starts a fresh
    /// record at level NONE.
    ///
    /// # Errors
    /// Store failures
    pub async fn resolve_drift(&self, workspace_id: &str) -> Result<bool, StoreError> {
        let lane = self.lane(workspace_id);
        let _guard = lane.lock().await;

        let Some(record) = self.store.delete(workspace_id).await? else {
            return Ok(false);
        };

        let age = record.age_minutes(self.clock.now());
        tracing::info!(
            workspace_id,
            drift_id = %record.id,
            level = %record.escalation_level,
            age_minutes = age,
            "drift resolved"
        );
        self.audit_record(
            &record,
            AuditAction::DriftResolved,
            Some(serde_json::json!({ "age_minutes": age })),
        );
        Ok(true)
    }

    /// Escalate `record` if its age now requires a higher level
    ///
    /// The stored record is authoritative. If it no longer exists, or has been
    /// replaced by a newer drift, nothing happens. The level is written before
    /// any alert is sent.
    ///
    /// # Errors
    /// Store failures
    pub async fn check_and_escalate(
        &self,
        record: &DriftRecord,
    ) -> Result<EscalationResult, StoreError> {
        let now = self.clock.now();
        if !self.config.enabled {
            return Ok(EscalationResult::unchanged(record, record.age_minutes(now)));
        }

        let escalated = {
            let lane = self.lane(&record.workspace_id);
            let _guard = lane.lock().await;

            let current = match self.store.get(&record.workspace_id).await? {
                Some(current) if current.id == record.id => current,
                _ => {
                    tracing::debug!(
                        workspace_id = %record.workspace_id,
                        drift_id = %record.id,
                        "drift record superseded, skipping escalation"
                    );
                    return Ok(EscalationResult::unchanged(record, record.age_minutes(now)));
                }
            };

            let age = current.age_minutes(now);
            let required = required_level(current.status, current.severity, age, &self.config.sla);
            let Some(level) = next_level(current.escalation_level, required) else {
                return Ok(EscalationResult::unchanged(&current, age));
            };

            let mut updated = current.clone();
            updated.escalation_level = level;
            updated.escalated_at = Some(now);

            if !self
                .store
                .compare_and_set(&current.workspace_id, Some(&current), Some(updated.clone()))
                .await?
            {
                return Ok(EscalationResult::unchanged(&current, age));
            }

            tracing::warn!(
                workspace_id = %updated.workspace_id,
                drift_id = %updated.id,
                from = %current.escalation_level,
                to = %level,
                age_minutes = age,
                "drift escalated"
            );
            metrics::counter!("ccm_drift_escalations_total", "level" => level.to_string())
                .increment(1);
            self.audit_record(
                &updated,
                AuditAction::DriftEscalated,
                Some(serde_json::json!({
                    "from": current.escalation_level,
                    "to": level,
                    "age_minutes": age,
                })),
            );

            let result = EscalationResult {
                workspace_id: updated.workspace_id.clone(),
                drift_id: updated.id,
                escalated: true,
                previous_level: current.escalation_level,
                new_level: level,
                age_minutes: age,
                alert: None,
            };
            (result, updated)
        };

        let (mut result, record) = escalated;
        if result.new_level.dispatches_alert() {
            let delivery = self
                .alerts
                .send_alert(self.escalation_alert(&record, result.age_minutes))
                .await;
            tracing::info!(
                workspace_id = %record.workspace_id,
                final_status = %delivery.final_status,
                "escalation alert dispatched"
            );
            result.alert = Some(delivery);
        }
        Ok(result)
    }

    /// Run [`DriftTracker::check_and_escalate`] for every open record
    ///
    /// Returns only the records that escalated. A failure on one record is
    /// logged and does not stop the others.
    ///
    /// # Errors
    /// Store failure while listing records
    pub async fn check_all_escalations(&self) -> Result<Vec<EscalationResult>, StoreError> {
        let records = self.store.values().await?;
        let results = join_all(records.iter().map(|r| self.check_and_escalate(r))).await;

        let mut escalated = Vec::new();
        for (record, result) in records.iter().zip(results) {
            match result {
                Ok(r) if r.escalated => escalated.push(r),
                Ok(_) => {}
                Err(e) => tracing::error!(
                    workspace_id = %record.workspace_id,
                    error = %e,
                    "escalation check failed"
                ),
            }
        }
        Ok(escalated)
    }

    /// Open drift record for a workspace
    ///
    /// # Errors
    /// Store failures
    pub async fn get_drift(&self, workspace_id: &str) -> Result<Option<DriftRecord>, StoreError> {
        self.store.get(workspace_id).await
    }

    /// All open drift records, oldest first
    ///
    /// # Errors
    /// Store failures
    pub async fn get_all_active_drifts(&self) -> Result<Vec<DriftRecord>, StoreError> {
        let mut records = self.store.values().await?;
        records.sort_by_key(|r| r.detected_at);
        Ok(records)
    }

    /// Attach an auto-response incident to the open record
    ///
    /// Returns whether a record was updated.
    ///
    /// # Errors
    /// Store failures
    pub async fn link_incident(
        &self,
        workspace_id: &str,
        incident_id: IncidentId,
    ) -> Result<bool, StoreError> {
        let lane = self.lane(workspace_id);
        let _guard = lane.lock().await;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(current) = self.store.get(workspace_id).await? else {
                return Ok(false);
            };
            let mut updated = current.clone();
            updated.incident_id = Some(incident_id);
            if self
                .store
                .compare_and_set(workspace_id, Some(&current), Some(updated))
                .await?
            {
                tracing::debug!(workspace_id, %incident_id, "incident linked to drift");
                return Ok(true);
            }
        }
        Err(StoreError::Unavailable(format!(
            "drift record for {workspace_id} is contended"
        )))
    }

    fn escalation_alert(&self, record: &DriftRecord, age_minutes: i64) -> AlertPayload {
        let summary = record
            .drift_items
            .iter()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let severity = record
            .severity
            .map_or_else(|| "unknown".to_string(), |s| s.to_string());

        let mut payload = AlertPayload::new(
            AlertSeverity::Critical,
            format!(
                "Compliance drift escalated to {} for {}",
                record.escalation_level, record.workspace_id
            ),
            format!(
                "Workspace {} has been {} ({severity}) for {age_minutes} minutes: {summary}",
                record.workspace_id, record.status
            ),
            &self.alert_source,
            self.clock.now(),
        )
        .with_workspace(&record.workspace_id)
        .with_drift_items(record.drift_items.clone())
        .with_metadata("drift_id", record.id.to_string())
        .with_metadata("escalation_level", record.escalation_level.to_string());

        if let Some(incident_id) = record.incident_id {
            payload = payload.with_incident(incident_id);
        }
        payload
    }

    fn audit_record(
        &self,
        record: &DriftRecord,
        action: AuditAction,
        extra: Option<serde_json::Value>,
    ) {
        let mut metadata = serde_json::json!({
            "status": record.status,
            "severity": record.severity,
            "escalation_level": record.escalation_level,
            "drift_types": record.drift_items.iter().map(|i| i.kind).collect::<Vec<_>>(),
        });
        if let (Some(serde_json::Value::Object(extra)), Some(map)) = (extra, metadata.as_object_mut()) {
            map.extend(extra);
        }
        let entry = AuditEntry::new(
            self.audit.system_context(&record.workspace_id),
            action,
            "drift",
            record.id.to_string(),
        )
        .with_metadata(metadata);
        self.audit.emit_logged(entry);
    }
}
