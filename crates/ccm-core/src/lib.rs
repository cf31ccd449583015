//! CCM Core - Continuous Compliance Monitoring
//!
//! Shared foundation for the compliance engine:
//! - Drift, compliance-result and escalation data model
//! - Incident and alert records
//! - Engine configuration loaded from TOML
//! - Injected clock and keyed stores with compare-and-set
//! - Background audit emitter with health reporting
//! - Traits for evidence sources, HTTP transport and alert sending
//!
//! # Example
//!
//! ```rust,ignore
//! use ccm_core::prelude::*;
//!
//! let config = EngineConfig::new().with_cooldown_minutes(10);
//! config.validate()?;
//!
//! let drifts: SharedStore<DriftRecord> = InMemoryStore::shared();
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod alert;
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod evidence;
pub mod incident;
pub mod store;
pub mod transport;
pub mod types;

pub use alert::{
    AlertDeliveryResult, AlertPayload, AlertSeverity, ChannelKind, DeliveryAttempt,
    DeliveryStatus, FinalStatus,
};
pub use audit::{
    AuditAction, AuditContext, AuditEmitter, AuditEntry, AuditHealth, AuditScope, AuditSink,
    LogAuditSink,
};
pub use clock::{system_clock, Clock, SharedClock, SystemClock};
pub use config::{
    AlertConfig, AuditConfig, AutoResponseConfig, DetectionConfig, EngineConfig,
    EscalationConfig, EscalationSla, RetryConfig,
};
pub use error::{
    AuditError, ConfigError, EvidenceError, IncidentError, StoreError, TransportError,
};
pub use evidence::{
    DatasetFreshness, EvidenceSources, FailureInjectionConfig, FailureInjectionEvidence,
    FreshnessEvidence, FreshnessPolicy, KillSwitchEnableOutcome, KillSwitchEvidence,
    KillSwitchState, MemberRole, Membership, MembershipEvidence, SnapshotEvidence, SnapshotFact,
    WorkspaceDirectory, WorkspaceRef,
};
pub use incident::{AutoActionRecord, AutoActionType, IncidentRecord, IncidentStatus};
pub use store::{InMemoryStore, KeyedStore, SharedStore};
pub use transport::{AlertSender, HttpRequest, HttpResponse, HttpTransport, SharedTransport};
pub use types::{
    aggregate, CheckStatus, ComplianceCheckResult, DriftDetails, DriftId, DriftItem, DriftRecord,
    DriftType, EscalationLevel, EvidenceSource, GlobalComplianceResult, IncidentId,
    KillSwitchScope, Severity,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with CCM Core
    pub use crate::{
        AlertPayload, AlertSeverity, AuditEmitter, CheckStatus, Clock, ComplianceCheckResult,
        DriftItem, DriftRecord, DriftType, EngineConfig, EscalationLevel, InMemoryStore,
        IncidentId, IncidentRecord, KeyedStore, Severity, SharedClock, SharedStore,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
