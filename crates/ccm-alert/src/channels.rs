//! Channel selection and per-channel request shaping

use ccm_core::{AlertConfig, AlertPayload, AlertSeverity, ChannelKind, HttpRequest};
use serde_json::{json, Value};

/// Channels an alert of `severity` fans out to, in dispatch order
#[must_use]
pub fn channels_for(severity: AlertSeverity) -> &'static [ChannelKind] {
    match severity {
        AlertSeverity::Critical => &[ChannelKind::Chat, ChannelKind::Pager, ChannelKind::Webhook],
        AlertSeverity::Warn => &[ChannelKind::Chat, ChannelKind::Webhook],
        AlertSeverity::Info => &[ChannelKind::Chat],
    }
}

/// Why a channel request could not be built
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Endpoint (or pager routing key) missing from configuration
    #[error("channel not configured")]
    NotConfigured,

    /// Alert payload could not be encoded
    #[error("payload encoding failed: {0}")]
    Payload(String),
}

/// Build the request for `channel`
///
/// # Errors
/// `NotConfigured` if the channel has no endpoint, `Payload` if the alert
/// cannot be encoded
pub fn build_request(
    channel: ChannelKind,
    payload: &AlertPayload,
    config: &AlertConfig,
) -> Result<HttpRequest, ChannelError> {
    match channel {
        ChannelKind::Chat => {
            let url = config
                .chat_webhook_url
                .as_deref()
                .ok_or(ChannelError::NotConfigured)?;
            Ok(HttpRequest::post_json(url, chat_message(payload)))
        }
        ChannelKind::Pager => {
            let (Some(url), Some(routing_key)) = (
                config.pager_events_url.as_deref(),
                config.pager_routing_key.as_deref(),
            ) else {
                return Err(ChannelError::NotConfigured);
            };
            Ok(HttpRequest::post_json(url, pager_event(payload, routing_key)))
        }
        ChannelKind::Webhook => {
            let url = config
                .webhook_url
                .as_deref()
                .ok_or(ChannelError::NotConfigured)?;
            let body = serde_json::to_value(payload)
                .map_err(|e| ChannelError::Payload(e.to_string()))?;
            Ok(HttpRequest::post_json(url, body)
                .with_header("X-Alert-Id", payload.id.to_string())
                .with_header("X-Alert-Severity", payload.severity.to_string()))
        }
    }
}

fn colour(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Critical => "#d32f2f",
        AlertSeverity::Warn => "#f9a825",
        AlertSeverity::Info => "#1976d2",
    }
}

/// Chat message with a colour-coded attachment and structured fields
#[must_use]
pub fn chat_message(payload: &AlertPayload) -> Value {
    let mut fields = vec![
        json!({"title": "Severity", "value": payload.severity.to_string(), "short": true}),
        json!({"title": "Source", "value": payload.source, "short": true}),
    ];
    if let Some(ws) = &payload.workspace_id {
        fields.push(json!({"title": "Workspace", "value": ws, "short": true}));
    }
    if let Some(incident) = &payload.incident_id {
        fields.push(json!({"title": "Incident", "value": incident.to_string(), "short": true}));
    }
    if let Some(items) = &payload.drift_items {
        let kinds: Vec<&str> = items.iter().map(|i| i.kind.as_str()).collect();
        fields.push(json!({"title": "Drift", "value": kinds.join(", "), "short": false}));
    }

    json!({
        "text": format!("[{}] {}", payload.severity, payload.title),
        "attachments": [{
            "color": colour(payload.severity),
            "title": payload.title,
            "text": payload.message,
            "fields": fields,
            "ts": payload.timestamp.timestamp(),
        }],
    })
}

/// Pager trigger event, deduplicated on incident id or alert id
#[must_use]
pub fn pager_event(payload: &AlertPayload, routing_key: &str) -> Value {
    let severity = match payload.severity {
        AlertSeverity::Critical => "critical",
        AlertSeverity::Warn => "warning",
        AlertSeverity::Info => "info",
    };
    json!({
        "routing_key": routing_key,
        "event_action": "trigger",
        "dedup_key": payload.dedup_key(),
        "payload": {
            "summary": payload.title,
            "severity": severity,
            "source": payload.source,
            "timestamp": payload.timestamp.to_rfc3339(),
            "custom_details": {
                "message": payload.message,
                "workspace_id": payload.workspace_id,
                "incident_id": payload.incident_id.map(|i| i.to_string()),
                "metadata": payload.metadata,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccm_core::IncidentId;
    use ccm_test_utils::t0;

    fn payload(severity: AlertSeverity) -> AlertPayload {
        AlertPayload::new(severity, "Drift escalated", "ws-1 at PAGED", "ccm", t0())
            .with_workspace("ws-1")
    }

    fn full_config() -> AlertConfig {
        AlertConfig {
            chat_webhook_url: Some("https://chat.test/hook".into()),
            pager_events_url: Some("https://pager.test/v2/enqueue".into()),
            pager_routing_key: Some("rk".into()),
            webhook_url: Some("https://ops.test/alerts".into()),
            ..AlertConfig::default()
        }
    }

    #[test]
    fn channel_selection_by_severity() {
        assert_eq!(
            channels_for(AlertSeverity::Critical),
            &[ChannelKind::Chat, ChannelKind::Pager, ChannelKind::Webhook]
        );
        assert_eq!(
            channels_for(AlertSeverity::Warn),
            &[ChannelKind::Chat, ChannelKind::Webhook]
        );
        assert_eq!(channels_for(AlertSeverity::Info), &[ChannelKind::Chat]);
    }

    #[test]
    fn pager_event_dedups_on_incident() {
        let incident = IncidentId::new();
        let p = payload(AlertSeverity::Critical).with_incident(incident);
        let event = pager_event(&p, "rk");
        assert_eq!(event["event_action"], "trigger");
        assert_eq!(event["dedup_key"], incident.to_string());
        assert_eq!(event["payload"]["severity"], "critical");

        let p = payload(AlertSeverity::Warn);
        assert_eq!(pager_event(&p, "rk")["dedup_key"], p.id.to_string());
    }

    #[test]
    fn chat_message_is_colour_coded() {
        let msg = chat_message(&payload(AlertSeverity::Critical));
        assert_eq!(msg["attachments"][0]["color"], "#d32f2f");
        let fields = msg["attachments"][0]["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["title"] == "Workspace"));
    }

    #[test]
    fn webhook_receives_raw_payload() {
        let p = payload(AlertSeverity::Warn);
        let req = build_request(ChannelKind::Webhook, &p, &full_config()).unwrap();
        assert_eq!(req.body, serde_json::to_value(&p).unwrap());
    }

    #[test]
    fn missing_endpoint_yields_none() {
        let p = payload(AlertSeverity::Critical);
        let mut config = full_config();
        config.pager_routing_key = None;
        assert_eq!(
            build_request(ChannelKind::Pager, &p, &config).unwrap_err(),
            ChannelError::NotConfigured
        );
        assert_eq!(
            build_request(ChannelKind::Chat, &p, &AlertConfig::default()).unwrap_err(),
            ChannelError::NotConfigured
        );
    }
}
