//! Engine configuration
//!
//! Every section has defaults, so an empty TOML document is a valid
//! configuration. Values are checked by [`EngineConfig::validate`] after
//! parsing.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub escalation: EscalationConfig,
    pub alerts: AlertConfig,
    pub auto_response: AutoResponseConfig,
    pub detection: DetectionConfig,
    pub audit: AuditConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML, `ConfigError::InvalidValue` on
    /// out-of-range values
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`EngineConfig::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// With escalation SLA
    #[inline]
    #[must_use]
    pub fn with_sla(mut self, sla: EscalationSla) -> Self {
        self.escalation.sla = sla;
        self
    }

    /// With escalation enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_escalation_enabled(mut self, enabled: bool) -> Self {
        self.escalation.enabled = enabled;
        self
    }

    /// With auto-response cooldown
    #[inline]
    #[must_use]
    pub fn with_cooldown_minutes(mut self, minutes: i64) -> Self {
        self.auto_response.cooldown_minutes = minutes;
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sla = &self.escalation.sla;
        if sla.warn_threshold_minutes < 0 {
            return Err(ConfigError::invalid("escalation.sla.warn_threshold_minutes", "must not be negative"));
        }
        if sla.fail_threshold_minutes < 0 {
            return Err(ConfigError::invalid("escalation.sla.fail_threshold_minutes", "must not be negative"));
        }
        if sla.critical_threshold_minutes < 0 {
            return Err(ConfigError::invalid("escalation.sla.critical_threshold_minutes", "must not be negative"));
        }

        let retry = &self.alerts.retry;
        if retry.timeout_ms == 0 {
            return Err(ConfigError::invalid("alerts.retry.timeout_ms", "must be positive"));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(ConfigError::invalid(
                "alerts.retry.max_delay_ms",
                format!("must be >= base_delay_ms ({})", retry.base_delay_ms),
            ));
        }

        if self.auto_response.cooldown_minutes < 0 {
            return Err(ConfigError::invalid("auto_response.cooldown_minutes", "must not be negative"));
        }
        if self.auto_response.notify_timeout_ms == 0 {
            return Err(ConfigError::invalid("auto_response.notify_timeout_ms", "must be positive"));
        }
        if self.detection.stale_snapshot_days <= 0 {
            return Err(ConfigError::invalid("detection.stale_snapshot_days", "must be positive"));
        }
        if self.detection.evidence_timeout_ms == 0 {
            return Err(ConfigError::invalid("detection.evidence_timeout_ms", "must be positive"));
        }
        if self.audit.queue_capacity == 0 {
            return Err(ConfigError::invalid("audit.queue_capacity", "must be positive"));
        }
        Ok(())
    }
}

/// Escalation switch and thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// When false, `check_and_escalate` never escalates
    pub enabled: bool,
    pub sla: EscalationSla,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sla: EscalationSla::default(),
        }
    }
}

/// Age thresholds (minutes) after which open drift must escalate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationSla {
    /// WARN escalates to NOTIFIED after this age
    pub warn_threshold_minutes: i64,
    /// FAIL escalates to PAGED after this age
    pub fail_threshold_minutes: i64,
    /// FAIL+CRITICAL escalates to CRITICAL after this age
    pub critical_threshold_minutes: i64,
}

impl Default for EscalationSla {
    fn default() -> Self {
        Self {
            warn_threshold_minutes: 30,
            fail_threshold_minutes: 10,
            critical_threshold_minutes: 5,
        }
    }
}

/// Outbound alert channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Value of `source` on alerts raised by the engine
    pub source: String,
    pub chat_webhook_url: Option<String>,
    pub pager_events_url: Option<String>,
    pub pager_routing_key: Option<String>,
    pub webhook_url: Option<String>,
    pub retry: RetryConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            source: "compliance-monitor".to_string(),
            chat_webhook_url: None,
            pager_events_url: None,
            pager_routing_key: None,
            webhook_url: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Up to `max_retries + 1` attempts
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Per-attempt deadline
    pub timeout_ms: u64,
}

impl RetryConfig {
    /// Backoff after the zero-based failed `attempt`: `min(base * 2^attempt, max)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Per-attempt timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            timeout_ms: 10_000,
        }
    }
}

/// Auto-response playbook settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoResponseConfig {
    pub enabled: bool,
    /// Minimum minutes between two triggers for one workspace
    pub cooldown_minutes: i64,
    /// Dedicated on-call webhook, distinct from the alert channels
    pub oncall_webhook_url: Option<String>,
    pub notify_timeout_ms: u64,
    /// Actor recorded on kill-switch mutations and audit entries
    pub actor_id: String,
}

impl AutoResponseConfig {
    /// On-call notification timeout
    #[inline]
    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

impl Default for AutoResponseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_minutes: 5,
            oncall_webhook_url: None,
            notify_timeout_ms: 10_000,
            actor_id: "system:auto-response".to_string(),
        }
    }
}

/// Drift detector settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Snapshots older than this are stale
    pub stale_snapshot_days: i64,
    /// Deadline for each evidence query
    pub evidence_timeout_ms: u64,
}

impl DetectionConfig {
    /// Evidence query timeout
    #[inline]
    #[must_use]
    pub fn evidence_timeout(&self) -> Duration {
        Duration::from_millis(self.evidence_timeout_ms)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            stale_snapshot_days: 7,
            evidence_timeout_ms: 10_000,
        }
    }
}

/// Audit emitter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Bounded background queue size
    pub queue_capacity: usize,
    /// Actor recorded on system-originated entries
    pub actor_id: String,
    pub actor_role: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            actor_id: "system:compliance-monitor".to_string(),
            actor_role: "system".to_string(),
        }
    }
}
