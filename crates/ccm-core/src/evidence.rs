//! Contracts for the external evidence sources
//!
//! The engine only reads these stores, except for the idempotent
//! kill-switch enable used by the auto-response playbook.

use crate::error::EvidenceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Active snapshot as reported by the snapshot store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFact {
    pub snapshot_id: String,
    pub dataset_id: String,
    pub created_at: DateTime<Utc>,
    /// Checksum recorded when the snapshot was taken
    pub checksum: Option<String>,
    /// Checksum the dataset manifest expects
    pub manifest_checksum: Option<String>,
}

/// Kill-switch state for one scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchState {
    pub enabled: bool,
    pub reason: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Outcome of an enable request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitchEnableOutcome {
    /// This call flipped the switch
    Enabled,
    /// Switch was already on
    AlreadyEnabled,
}

/// Enabled failure-injection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInjectionConfig {
    pub id: String,
    pub name: String,
}

/// Workspace role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

/// Active workspace membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub role: MemberRole,
}

/// Warn/fail thresholds for one dataset, workspace override already applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    pub warn_after_hours: u32,
    pub fail_after_hours: u32,
}

/// Freshness facts for one tracked dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFreshness {
    pub dataset_id: String,
    /// `None` when the dataset never ingested successfully
    pub last_success_at: Option<DateTime<Utc>>,
    /// Failing critical datasets are CRITICAL drift
    pub critical: bool,
    pub policy: FreshnessPolicy,
}

/// Workspace known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub workspace_id: String,
    pub platform: String,
}

/// Snapshot store
#[async_trait::async_trait]
pub trait SnapshotEvidence: Send + Sync {
    /// Active snapshots for the workspace on a platform
    async fn active_snapshots(
        &self,
        workspace_id: &str,
        platform: &str,
    ) -> Result<Vec<SnapshotFact>, EvidenceError>;
}

/// Kill-switch store
#[async_trait::async_trait]
pub trait KillSwitchEvidence: Send + Sync {
    /// Workspace-scoped switch
    async fn workspace_status(&self, workspace_id: &str) -> Result<KillSwitchState, EvidenceError>;

    /// Global switch
    async fn global_status(&self) -> Result<KillSwitchState, EvidenceError>;

    /// Enable the workspace switch; enabling an enabled switch is not an error
    async fn enable(
        &self,
        workspace_id: &str,
        reason: &str,
        actor_id: &str,
    ) -> Result<KillSwitchEnableOutcome, EvidenceError>;
}

/// Failure-injection (chaos testing) store
#[async_trait::async_trait]
pub trait FailureInjectionEvidence: Send + Sync {
    /// Enabled configurations for the workspace
    async fn enabled_configs(
        &self,
        workspace_id: &str,
    ) -> Result<Vec<FailureInjectionConfig>, EvidenceError>;
}

/// Membership store
#[async_trait::async_trait]
pub trait MembershipEvidence: Send + Sync {
    /// Active memberships with roles
    async fn active_memberships(&self, workspace_id: &str)
        -> Result<Vec<Membership>, EvidenceError>;
}

/// Dataset freshness store
#[async_trait::async_trait]
pub trait FreshnessEvidence: Send + Sync {
    /// Tracked datasets for the workspace on a platform
    async fn tracked_datasets(
        &self,
        workspace_id: &str,
        platform: &str,
    ) -> Result<Vec<DatasetFreshness>, EvidenceError>;
}

/// Directory of workspaces to check
#[async_trait::async_trait]
pub trait WorkspaceDirectory: Send + Sync {
    /// All workspaces with their platform
    async fn list_workspaces(&self) -> Result<Vec<WorkspaceRef>, EvidenceError>;
}

/// Bundle of evidence sources handed to the detector
#[derive(Clone)]
pub struct EvidenceSources {
    pub snapshots: Arc<dyn SnapshotEvidence>,
    pub kill_switch: Arc<dyn KillSwitchEvidence>,
    pub failure_injection: Arc<dyn FailureInjectionEvidence>,
    pub membership: Arc<dyn MembershipEvidence>,
    pub freshness: Arc<dyn FreshnessEvidence>,
    pub directory: Arc<dyn WorkspaceDirectory>,
}

impl std::fmt::Debug for EvidenceSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceSources").finish_non_exhaustive()
    }
}

impl EvidenceSources {
    /// All sources served by one object
    pub fn from_single<E>(source: Arc<E>) -> Self
    where
        E: SnapshotEvidence
            + KillSwitchEvidence
            + FailureInjectionEvidence
            + MembershipEvidence
            + FreshnessEvidence
            + WorkspaceDirectory
            + 'static,
    {
        Self {
            snapshots: source.clone(),
            kill_switch: source.clone(),
            failure_injection: source.clone(),
            membership: source.clone(),
            freshness: source.clone(),
            directory: source,
        }
    }
}
