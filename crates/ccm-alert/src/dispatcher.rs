//! Alert dispatcher
//!
//! Fans an alert out to the channel set selected by its severity. Channels are
//! sent concurrently and reported in selection order; a failing channel never
//! affects the others.

use crate::channels::{build_request, channels_for, ChannelError};
use crate::retry::fetch_with_retry;
use ccm_core::{
    AlertConfig, AlertDeliveryResult, AlertPayload, AlertSender, AuditAction, AuditEmitter,
    AuditEntry, AuditScope, ChannelKind, DeliveryAttempt, DeliveryStatus, FinalStatus,
    SharedClock, SharedTransport,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;

/// Multi-channel alert dispatcher
#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    transport: SharedTransport,
    config: AlertConfig,
    audit: AuditEmitter,
    clock: SharedClock,
}

impl AlertDispatcher {
    /// Create new dispatcher
    #[must_use]
    pub fn new(
        transport: SharedTransport,
        config: AlertConfig,
        audit: AuditEmitter,
        clock: SharedClock,
    ) -> Self {
        Self {
            transport,
            config,
            audit,
            clock,
        }
    }

    /// Configured alert source name
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.config.source
    }

    /// Deliver `payload` across its channel set
    pub async fn send_alert(&self, payload: &AlertPayload) -> AlertDeliveryResult {
        let channels = channels_for(payload.severity);
        tracing::info!(
            alert_id = %payload.id,
            severity = %payload.severity,
            channels = channels.len(),
            title = %payload.title,
            "dispatching alert"
        );

        let attempts: Vec<DeliveryAttempt> =
            join_all(channels.iter().map(|&channel| self.send_channel(channel, payload))).await;

        let result = AlertDeliveryResult::from_attempts(payload.id, attempts);
        match result.final_status {
            FinalStatus::Success => tracing::info!(alert_id = %payload.id, "alert delivered"),
            FinalStatus::Partial => tracing::warn!(
                alert_id = %payload.id,
                failed = ?result.failed_channels,
                "alert partially delivered"
            ),
            FinalStatus::Failed => tracing::error!(alert_id = %payload.id, "alert delivery failed"),
        }
        result
    }

    async fn send_channel(&self, channel: ChannelKind, payload: &AlertPayload) -> DeliveryAttempt {
        let request = match build_request(channel, payload, &self.config) {
            Ok(request) => request,
            Err(e) => {
                let attempt = build_failure(channel, &e, self.clock.now());
                self.audit_attempt(payload, &attempt);
                return attempt;
            }
        };

        let outcome = fetch_with_retry(self.transport.as_ref(), &request, &self.config.retry).await;

        let status = if outcome.success {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Failed
        };
        let attempt = DeliveryAttempt {
            channel,
            timestamp: self.clock.now(),
            status,
            status_code: outcome.status_code,
            error: outcome.error,
            retry_count: outcome.retry_count,
            not_configured: false,
        };

        metrics::counter!(
            "ccm_alert_deliveries_total",
            "channel" => channel.to_string(),
            "status" => if outcome.success { "sent" } else { "failed" }
        )
        .increment(1);

        self.audit_attempt(payload, &attempt);
        attempt
    }

    fn audit_attempt(&self, payload: &AlertPayload, attempt: &DeliveryAttempt) {
        let (workspace, scope) = match &payload.workspace_id {
            Some(ws) => (ws.as_str(), AuditScope::Workspace),
            None => ("global", AuditScope::Global),
        };
        let action = match attempt.status {
            DeliveryStatus::Sent => AuditAction::AlertSent,
            DeliveryStatus::Failed => AuditAction::AlertFailed,
        };
        let metadata = serde_json::json!({
            "channel": attempt.channel,
            "severity": payload.severity,
            "status_code": attempt.status_code,
            "retry_count": attempt.retry_count,
            "error": attempt.error,
            "not_configured": attempt.not_configured,
            "incident_id": payload.incident_id.map(|i| i.to_string()),
        });
        let entry = AuditEntry::new(
            self.audit.system_context(workspace),
            action,
            "alert",
            payload.id.to_string(),
        )
        .with_scope(scope)
        .with_metadata(metadata);
        self.audit.emit_logged(entry);
    }
}

/// Attempt recorded when no request could be built for `channel`
///
/// Only a missing endpoint is excluded from the success/failure counts.
fn build_failure(channel: ChannelKind, error: &ChannelError, now: DateTime<Utc>) -> DeliveryAttempt {
    match error {
        ChannelError::NotConfigured => {
            tracing::debug!(%channel, "channel not configured, skipping");
            DeliveryAttempt::not_configured(channel, now)
        }
        ChannelError::Payload(_) => {
            tracing::error!(%channel, error = %error, "alert request could not be built");
            DeliveryAttempt::failed(channel, now, error.to_string())
        }
    }
}

#[async_trait::async_trait]
impl AlertSender for AlertDispatcher {
    async fn send_alert(&self, payload: AlertPayload) -> AlertDeliveryResult {
        AlertDispatcher::send_alert(self, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccm_core::{AlertSeverity, AuditConfig};
    use ccm_test_utils::{t0, ManualClock, MemoryAuditSink, Scripted, ScriptedTransport};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const CHAT: &str = "https://chat.test/hook";
    const PAGER: &str = "https://pager.test/v2/enqueue";
    const WEBHOOK: &str = "https://ops.test/alerts";

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        sink: Arc<MemoryAuditSink>,
        audit: AuditEmitter,
        dispatcher: AlertDispatcher,
    }

    fn fixture(config: AlertConfig) -> Fixture {
        let transport = ScriptedTransport::shared();
        let sink = MemoryAuditSink::shared();
        let audit = AuditEmitter::spawn(sink.clone(), &AuditConfig::default());
        let dispatcher =
            AlertDispatcher::new(transport.clone(), config, audit.clone(), ManualClock::shared());
        Fixture {
            transport,
            sink,
            audit,
            dispatcher,
        }
    }

    fn all_channels() -> AlertConfig {
        AlertConfig {
            chat_webhook_url: Some(CHAT.into()),
            pager_events_url: Some(PAGER.into()),
            pager_routing_key: Some("rk".into()),
            webhook_url: Some(WEBHOOK.into()),
            ..AlertConfig::default()
        }
    }

    fn payload(severity: AlertSeverity) -> AlertPayload {
        AlertPayload::new(severity, "title", "message", "ccm", t0()).with_workspace("ws-1")
    }

    #[tokio::test(start_paused = true)]
    async fn critical_reaches_every_channel_in_order() {
        let f = fixture(all_channels());
        let result = f.dispatcher.send_alert(&payload(AlertSeverity::Critical)).await;

        assert_eq!(result.final_status, FinalStatus::Success);
        let channels: Vec<_> = result.attempts.iter().map(|a| a.channel).collect();
        assert_eq!(
            channels,
            vec![ChannelKind::Chat, ChannelKind::Pager, ChannelKind::Webhook]
        );

        f.audit.flush().await.unwrap();
        assert_eq!(f.sink.count(AuditAction::AlertSent), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn info_only_goes_to_chat() {
        let f = fixture(all_channels());
        let result = f.dispatcher.send_alert(&payload(AlertSeverity::Info)).await;

        assert_eq!(result.attempts.len(), 1);
        assert_eq!(f.transport.requests().len(), 1);
        assert_eq!(f.transport.requests()[0].url, CHAT);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_channel_is_partial() {
        let f = fixture(all_channels());
        f.transport.script(PAGER, [Scripted::Status(404)]);
        f.transport.script(
            WEBHOOK,
            [Scripted::Status(500), Scripted::Status(500), Scripted::Status(500), Scripted::Status(200)],
        );

        let result = f.dispatcher.send_alert(&payload(AlertSeverity::Critical)).await;

        assert_eq!(result.final_status, FinalStatus::Partial);
        assert_eq!(result.failed_channels, vec![ChannelKind::Pager]);
        assert_eq!(
            result.successful_channels,
            vec![ChannelKind::Chat, ChannelKind::Webhook]
        );
        let pager = &result.attempts[1];
        assert_eq!((pager.status_code, pager.retry_count), (Some(404), 0));
        let webhook = &result.attempts[2];
        assert_eq!(
            (webhook.status, webhook.retry_count),
            (DeliveryStatus::Sent, 3)
        );

        f.audit.flush().await.unwrap();
        assert_eq!(f.sink.count(AuditAction::AlertFailed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_channels_are_not_failures() {
        let config = AlertConfig {
            chat_webhook_url: Some(CHAT.into()),
            ..AlertConfig::default()
        };
        let f = fixture(config);
        let result = f.dispatcher.send_alert(&payload(AlertSeverity::Critical)).await;

        assert_eq!(result.final_status, FinalStatus::Success);
        assert!(result.failed_channels.is_empty());
        assert_eq!(result.attempts.len(), 3);
        assert!(result.attempts[1].not_configured);
        assert_eq!(result.attempts[1].status, DeliveryStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_configured_is_failed() {
        let f = fixture(AlertConfig::default());
        let result = f.dispatcher.send_alert(&payload(AlertSeverity::Warn)).await;
        assert_eq!(result.final_status, FinalStatus::Failed);
        assert!(f.transport.requests().is_empty());
    }

    #[test]
    fn encoding_failure_counts_as_failed_channel() {
        let alert_id = payload(AlertSeverity::Warn).id;
        let error = ChannelError::Payload("key must be a string".into());
        let attempt = build_failure(ChannelKind::Webhook, &error, t0());

        assert_eq!(attempt.status, DeliveryStatus::Failed);
        assert!(!attempt.not_configured);
        assert!(attempt.error.as_deref().unwrap().contains("key must be a string"));

        let result = AlertDeliveryResult::from_attempts(alert_id, vec![attempt]);
        assert_eq!(result.failed_channels, vec![ChannelKind::Webhook]);
        assert_eq!(result.final_status, FinalStatus::Failed);

        let skipped = build_failure(ChannelKind::Webhook, &ChannelError::NotConfigured, t0());
        assert!(skipped.not_configured);
        assert!(AlertDeliveryResult::from_attempts(alert_id, vec![skipped])
            .failed_channels
            .is_empty());
    }
}
