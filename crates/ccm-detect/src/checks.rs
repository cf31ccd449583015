//! Individual drift checks
//!
//! Each check turns evidence facts into drift items. Checks are pure so the
//! detector can query sources concurrently and still assemble items in the
//! fixed check order.

use crate::freshness::{FreshnessEvaluator, FreshnessStatus};
use ccm_core::{
    DatasetFreshness, DriftDetails, DriftItem, DriftType, EvidenceError, EvidenceSource,
    FailureInjectionConfig, KillSwitchScope, KillSwitchState, MemberRole, Membership, Severity,
    SnapshotFact,
};
use chrono::{DateTime, Duration, Utc};

/// Synthetic item for a check whose source could not be queried
///
/// Severity is never lower than HIGH.
#[must_use]
pub fn evidence_unavailable(
    workspace_id: Option<&str>,
    kind: DriftType,
    source: EvidenceSource,
    severity: Severity,
    error: &EvidenceError,
) -> DriftItem {
    let item = DriftItem::new(
        kind,
        severity.max(Severity::High),
        format!("Unable to query {source} evidence: {error}"),
        DriftDetails::EvidenceUnavailable {
            source,
            error: error.to_string(),
        },
    );
    match workspace_id {
        Some(ws) => item.with_workspace(ws),
        None => item,
    }
}

/// Missing, stale and mismatched snapshots
#[must_use]
pub fn snapshot_drift(
    workspace_id: &str,
    platform: &str,
    snapshots: &[SnapshotFact],
    now: DateTime<Utc>,
    stale_after_days: i64,
) -> Vec<DriftItem> {
    if snapshots.is_empty() {
        return vec![DriftItem::new(
            DriftType::SnapshotMissing,
            Severity::High,
            format!("No active snapshot for workspace {workspace_id} on {platform}"),
            DriftDetails::SnapshotMissing {
                platform: platform.to_string(),
            },
        )
        .with_workspace(workspace_id)];
    }

    let mut items = Vec::new();
    for snap in snapshots {
        let age = now - snap.created_at;
        if age > Duration::days(stale_after_days) {
            let age_days = age.num_days();
            items.push(
                DriftItem::new(
                    DriftType::SnapshotStale,
                    Severity::Medium,
                    format!(
                        "Snapshot {} for dataset {} is {age_days} days old (max {stale_after_days})",
                        snap.snapshot_id, snap.dataset_id
                    ),
                    DriftDetails::SnapshotStale {
                        snapshot_id: snap.snapshot_id.clone(),
                        dataset_id: snap.dataset_id.clone(),
                        created_at: snap.created_at,
                        age_days,
                        max_age_days: stale_after_days,
                    },
                )
                .with_workspace(workspace_id)
                .with_snapshot(&snap.snapshot_id),
            );
        }

        if let (Some(actual), Some(expected)) = (&snap.checksum, &snap.manifest_checksum) {
            if actual != expected {
                items.push(
                    DriftItem::new(
                        DriftType::SnapshotMismatch,
                        Severity::High,
                        format!(
                            "Snapshot {} checksum does not match dataset {} manifest",
                            snap.snapshot_id, snap.dataset_id
                        ),
                        DriftDetails::SnapshotMismatch {
                            snapshot_id: snap.snapshot_id.clone(),
                            dataset_id: snap.dataset_id.clone(),
                            expected_checksum: expected.clone(),
                            actual_checksum: actual.clone(),
                        },
                    )
                    .with_workspace(workspace_id)
                    .with_snapshot(&snap.snapshot_id),
                );
            }
        }
    }
    items
}

/// Enabled kill-switch at either scope
#[must_use]
pub fn kill_switch_drift(
    workspace_id: Option<&str>,
    state: &KillSwitchState,
    scope: KillSwitchScope,
) -> Option<DriftItem> {
    if !state.enabled {
        return None;
    }
    let reason = state.reason.as_deref().unwrap_or("no reason recorded");
    let (severity, message) = match scope {
        KillSwitchScope::Workspace => (
            Severity::High,
            format!("Workspace kill-switch is active: {reason}"),
        ),
        KillSwitchScope::Global => (
            Severity::Critical,
            format!("Global kill-switch is active: {reason}"),
        ),
    };
    let item = DriftItem::new(
        DriftType::KillSwitchActive,
        severity,
        message,
        DriftDetails::KillSwitch {
            scope,
            reason: state.reason.clone(),
            activated_at: state.activated_at,
        },
    );
    Some(match workspace_id {
        Some(ws) => item.with_workspace(ws),
        None => item,
    })
}

/// One CRITICAL item per enabled failure-injection config
#[must_use]
pub fn failure_injection_drift(
    workspace_id: &str,
    configs: &[FailureInjectionConfig],
) -> Vec<DriftItem> {
    configs
        .iter()
        .map(|config| {
            DriftItem::new(
                DriftType::FailureInjectionActive,
                Severity::Critical,
                format!("Failure injection '{}' is enabled", config.name),
                DriftDetails::FailureInjection {
                    config_id: config.id.clone(),
                    name: config.name.clone(),
                },
            )
            .with_workspace(workspace_id)
        })
        .collect()
}

/// Owner count must be exactly one
#[must_use]
pub fn membership_drift(workspace_id: &str, memberships: &[Membership]) -> Option<DriftItem> {
    let owner_ids: Vec<String> = memberships
        .iter()
        .filter(|m| m.role == MemberRole::Owner)
        .map(|m| m.user_id.clone())
        .collect();

    let (severity, message) = match owner_ids.len() {
        0 => (
            Severity::Critical,
            format!("Workspace {workspace_id} has no active owner"),
        ),
        1 => return None,
        n => (
            Severity::Medium,
            format!("Workspace {workspace_id} has {n} owners"),
        ),
    };

    Some(
        DriftItem::new(
            DriftType::PermissionAnomaly,
            severity,
            message,
            DriftDetails::Membership {
                owner_count: owner_ids.len(),
                owner_ids,
            },
        )
        .with_workspace(workspace_id),
    )
}

/// Per-dataset freshness items
#[must_use]
pub fn freshness_drift(
    workspace_id: &str,
    datasets: &[DatasetFreshness],
    evaluator: &dyn FreshnessEvaluator,
    now: DateTime<Utc>,
) -> Vec<DriftItem> {
    let mut items = Vec::new();
    for dataset in datasets {
        let verdict = evaluator.evaluate(dataset, now);
        let (kind, severity) = match verdict.status {
            FreshnessStatus::Fresh => continue,
            FreshnessStatus::Warn => (DriftType::DataFreshnessWarn, Severity::Medium),
            FreshnessStatus::Fail if dataset.critical => {
                (DriftType::DataFreshnessFail, Severity::Critical)
            }
            FreshnessStatus::Fail => (DriftType::DataFreshnessFail, Severity::High),
        };

        let message = match verdict.age_minutes {
            Some(age) => format!(
                "Dataset {} last ingested {}h{:02}m ago (warn {}h, fail {}h)",
                dataset.dataset_id,
                age / 60,
                age % 60,
                dataset.policy.warn_after_hours,
                dataset.policy.fail_after_hours
            ),
            None => format!("Dataset {} has never ingested successfully", dataset.dataset_id),
        };

        items.push(
            DriftItem::new(
                kind,
                severity,
                message,
                DriftDetails::DataFreshness {
                    dataset_id: dataset.dataset_id.clone(),
                    critical: dataset.critical,
                    age_minutes: verdict.age_minutes,
                    warn_after_hours: dataset.policy.warn_after_hours,
                    fail_after_hours: dataset.policy.fail_after_hours,
                    last_success_at: dataset.last_success_at,
                },
            )
            .with_workspace(workspace_id),
        );
    }
    items
}
