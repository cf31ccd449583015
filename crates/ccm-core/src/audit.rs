//! Audit emitter
//!
//! Provides the append-only audit trail for every state-changing operation:
//! - Synchronous entry validation (the caller sees programming errors)
//! - Bounded background queue drained by a single worker task
//! - Health snapshot of sink delivery, used by the global audit check
//! - Direct write-probe that bypasses the queue

use crate::config::AuditConfig;
use crate::error::AuditError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Who performed an action, and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub workspace_id: String,
    pub actor_id: String,
    pub actor_role: String,
}

impl AuditContext {
    /// Create new context
    #[must_use]
    pub fn new(
        workspace_id: impl Into<String>,
        actor_id: impl Into<String>,
        actor_role: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            actor_id: actor_id.into(),
            actor_role: actor_role.into(),
        }
    }
}

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ComplianceCheck,
    DriftDetected,
    DriftEscalated,
    DriftResolved,
    AlertSent,
    AlertFailed,
    AutoResponseExecuted,
    KillSwitchEnabled,
    IncidentAcknowledged,
    IncidentResolved,
    Rollback,
    AuditProbe,
}

/// Scope of an audited action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditScope {
    #[default]
    Workspace,
    Global,
}

/// One audit-trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub context: AuditContext,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub scope: AuditScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEntry {
    /// Workspace-scoped entry
    #[must_use]
    pub fn new(
        context: AuditContext,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            context,
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            scope: AuditScope::Workspace,
            reason: None,
            metadata: None,
        }
    }

    /// With scope
    #[inline]
    #[must_use]
    pub fn with_scope(mut self, scope: AuditScope) -> Self {
        self.scope = scope;
        self
    }

    /// With reason
    #[inline]
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// With structured metadata
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check required fields
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::MissingContext`] for an empty context field and
    /// [`AuditError::MissingRollbackReason`] for a rollback without a reason.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.context.workspace_id.trim().is_empty() {
            return Err(AuditError::MissingContext("workspace_id"));
        }
        if self.context.actor_id.trim().is_empty() {
            return Err(AuditError::MissingContext("actor_id"));
        }
        if self.context.actor_role.trim().is_empty() {
            return Err(AuditError::MissingContext("actor_role"));
        }
        if self.action == AuditAction::Rollback
            && self.reason.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(AuditError::MissingRollbackReason);
        }
        Ok(())
    }
}

/// Append-only audit store
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one entry
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Sink that writes entries to the `audit` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAuditSink;

#[async_trait::async_trait]
impl AuditSink for LogAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let json = serde_json::to_string(entry).map_err(|e| AuditError::SinkFailed(e.to_string()))?;
        tracing::info!(target: "audit", action = ?entry.action, entry = %json);
        Ok(())
    }
}

/// Point-in-time view of sink delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditHealth {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
}

impl AuditHealth {
    /// Most recent write succeeded (or nothing has been written yet)
    #[inline]
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

#[derive(Debug, Default)]
struct HealthCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    consecutive_failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl HealthCounters {
    fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        metrics::counter!("ccm_audit_delivered_total").increment(1);
    }

    fn record_failed(&self, error: &AuditError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
        metrics::counter!("ccm_audit_failed_total").increment(1);
    }

    fn record_dropped(&self, error: &AuditError) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
        metrics::counter!("ccm_audit_dropped_total").increment(1);
    }

    fn snapshot(&self) -> AuditHealth {
        AuditHealth {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Messages for the audit worker
#[derive(Debug)]
enum AuditCommand {
    Append(Box<AuditEntry>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit queue, cheap to clone
#[derive(Clone)]
pub struct AuditEmitter {
    sender: mpsc::Sender<AuditCommand>,
    sink: Arc<dyn AuditSink>,
    health: Arc<HealthCounters>,
    capacity: usize,
    actor_id: String,
    actor_role: String,
}

impl std::fmt::Debug for AuditEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditEmitter")
            .field("capacity", &self.capacity)
            .field("actor_id", &self.actor_id)
            .finish_non_exhaustive()
    }
}

impl AuditEmitter {
    /// Start the background worker
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(sink: Arc<dyn AuditSink>, config: &AuditConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let health = Arc::new(HealthCounters::default());

        tokio::spawn(audit_worker(Arc::clone(&sink), Arc::clone(&health), rx));

        Self {
            sender: tx,
            sink,
            health,
            capacity,
            actor_id: config.actor_id.clone(),
            actor_role: config.actor_role.clone(),
        }
    }

    /// Context for actions the engine takes on its own behalf
    #[must_use]
    pub fn system_context(&self, workspace_id: impl Into<String>) -> AuditContext {
        AuditContext::new(workspace_id, &self.actor_id, &self.actor_role)
    }

    /// Validate and enqueue an entry
    ///
    /// Sink failures and a full queue are counted in [`AuditEmitter::health`]
    /// and never reach the caller.
    ///
    /// # Errors
    ///
    /// Returns the validation error when the entry is malformed.
    pub fn emit(&self, entry: AuditEntry) -> Result<(), AuditError> {
        entry.validate()?;

        match self.sender.try_send(AuditCommand::Append(Box::new(entry))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.health.record_dropped(&AuditError::QueueFull(self.capacity));
                tracing::warn!(capacity = self.capacity, "audit queue full, entry dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.health.record_dropped(&AuditError::WorkerStopped);
                tracing::error!("audit worker stopped, entry dropped");
            }
        }
        Ok(())
    }

    /// Emit, logging a validation failure instead of returning it
    pub fn emit_logged(&self, entry: AuditEntry) {
        let action = entry.action;
        if let Err(e) = self.emit(entry) {
            tracing::error!(?action, error = %e, "rejected audit entry");
        }
    }

    /// Wait until every entry queued before this call has been processed
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::WorkerStopped`] if the worker is gone.
    pub async fn flush(&self) -> Result<(), AuditError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AuditCommand::Flush(tx))
            .await
            .map_err(|_| AuditError::WorkerStopped)?;
        rx.await.map_err(|_| AuditError::WorkerStopped)
    }

    /// Write a probe entry straight to the sink
    ///
    /// # Errors
    ///
    /// Returns the sink's error when the probe write fails.
    pub async fn probe(&self) -> Result<(), AuditError> {
        let entry = AuditEntry::new(
            self.system_context("global"),
            AuditAction::AuditProbe,
            "audit_sink",
            "write_probe",
        )
        .with_scope(AuditScope::Global);

        self.sink.append(&entry).await
    }

    /// Delivery health snapshot
    #[must_use]
    pub fn health(&self) -> AuditHealth {
        self.health.snapshot()
    }

    /// Queue capacity
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Worker task draining the queue into the sink
async fn audit_worker(
    sink: Arc<dyn AuditSink>,
    health: Arc<HealthCounters>,
    mut rx: mpsc::Receiver<AuditCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            AuditCommand::Append(entry) => match sink.append(&entry).await {
                Ok(()) => health.record_delivered(),
                Err(e) => {
                    tracing::warn!(
                        action = ?entry.action,
                        entity_id = %entry.entity_id,
                        error = %e,
                        "audit sink write failed"
                    );
                    health.record_failed(&e);
                }
            },
            AuditCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("audit worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct VecSink {
        entries: Mutex<Vec<AuditEntry>>,
        failing: AtomicBool,
    }

    #[async_trait::async_trait]
    impl AuditSink for VecSink {
        async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AuditError::SinkFailed("disk full".to_string()));
            }
            self.entries.lock().push(entry.clone());
            Ok(())
        }
    }

    fn ctx() -> AuditContext {
        AuditContext::new("ws-1", "user-1", "admin")
    }

    #[test]
    fn validation_rejects_missing_context() {
        let entry = AuditEntry::new(
            AuditContext::new("ws-1", "", "admin"),
            AuditAction::DriftDetected,
            "drift",
            "d1",
        );
        assert_eq!(entry.validate(), Err(AuditError::MissingContext("actor_id")));

        let entry = AuditEntry::new(
            AuditContext::new(" ", "u", "r"),
            AuditAction::DriftDetected,
            "drift",
            "d1",
        );
        assert_eq!(
            entry.validate(),
            Err(AuditError::MissingContext("workspace_id"))
        );
    }

    #[test]
    fn rollback_requires_reason() {
        let entry = AuditEntry::new(ctx(), AuditAction::Rollback, "snapshot", "s1");
        assert_eq!(entry.validate(), Err(AuditError::MissingRollbackReason));
        assert!(entry.with_reason("bad deploy").validate().is_ok());
    }

    #[tokio::test]
    async fn emit_surfaces_validation_synchronously() {
        let sink = Arc::new(VecSink::default());
        let emitter = AuditEmitter::spawn(sink.clone(), &AuditConfig::default());

        let bad = AuditEntry::new(ctx(), AuditAction::Rollback, "snapshot", "s1");
        assert!(emitter.emit(bad).unwrap_err().is_validation());

        emitter.flush().await.unwrap();
        assert!(sink.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn flush_waits_for_queued_entries() {
        let sink = Arc::new(VecSink::default());
        let emitter = AuditEmitter::spawn(sink.clone(), &AuditConfig::default());

        for i in 0..10 {
            let entry = AuditEntry::new(ctx(), AuditAction::ComplianceCheck, "workspace", i.to_string());
            emitter.emit(entry).unwrap();
        }
        emitter.flush().await.unwrap();

        let entries = sink.entries.lock();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[9].entity_id, "9");
        drop(entries);
        assert_eq!(emitter.health().delivered, 10);
    }

    #[tokio::test]
    async fn sink_failures_are_counted_not_propagated() {
        let sink = Arc::new(VecSink::default());
        sink.failing.store(true, Ordering::SeqCst);
        let emitter = AuditEmitter::spawn(sink.clone(), &AuditConfig::default());

        emitter
            .emit(AuditEntry::new(ctx(), AuditAction::DriftDetected, "drift", "a"))
            .unwrap();
        emitter
            .emit(AuditEntry::new(ctx(), AuditAction::DriftDetected, "drift", "b"))
            .unwrap();
        emitter.flush().await.unwrap();

        let health = emitter.health();
        assert_eq!(health.failed, 2);
        assert_eq!(health.consecutive_failures, 2);
        assert!(!health.is_healthy());
        assert!(health.last_error.unwrap().contains("disk full"));

        sink.failing.store(false, Ordering::SeqCst);
        emitter
            .emit(AuditEntry::new(ctx(), AuditAction::DriftDetected, "drift", "c"))
            .unwrap();
        emitter.flush().await.unwrap();
        assert!(emitter.health().is_healthy());
    }

    #[tokio::test]
    async fn full_queue_drops_and_reports() {
        let sink = Arc::new(VecSink::default());
        let config = AuditConfig {
            queue_capacity: 1,
            ..AuditConfig::default()
        };
        let emitter = AuditEmitter::spawn(sink.clone(), &config);

        // The worker cannot run before the next await on this runtime.
        for id in ["a", "b", "c"] {
            emitter
                .emit(AuditEntry::new(ctx(), AuditAction::DriftDetected, "drift", id))
                .unwrap();
        }

        let health = emitter.health();
        assert_eq!(health.dropped, 2);
        assert_eq!(health.last_error.as_deref(), Some("audit queue full (capacity: 1)"));
        assert!(health.is_healthy());

        emitter.flush().await.unwrap();
        assert_eq!(sink.entries.lock().len(), 1);
    }

    #[tokio::test]
    async fn probe_bypasses_queue() {
        let sink = Arc::new(VecSink::default());
        let emitter = AuditEmitter::spawn(sink.clone(), &AuditConfig::default());

        emitter.probe().await.unwrap();
        {
            let entries = sink.entries.lock();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].action, AuditAction::AuditProbe);
            assert_eq!(entries[0].scope, AuditScope::Global);
        }

        sink.failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            emitter.probe().await,
            Err(AuditError::SinkFailed(_))
        ));
    }

    #[test]
    fn entry_serializes_action_in_screaming_case() {
        let entry = AuditEntry::new(ctx(), AuditAction::AutoResponseExecuted, "incident", "inc_1");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "AUTO_RESPONSE_EXECUTED");
        assert!(json.get("reason").is_none());
    }
}
