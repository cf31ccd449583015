//! Dataset freshness evaluation

use ccm_core::DatasetFreshness;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Freshness verdict for one dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FreshnessStatus {
    Fresh,
    Warn,
    Fail,
}

/// Verdict plus the age it was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessVerdict {
    pub status: FreshnessStatus,
    /// `None` when the dataset never ingested successfully
    pub age_minutes: Option<i64>,
}

/// Classifies a dataset's age against its policy
pub trait FreshnessEvaluator: Send + Sync + std::fmt::Debug {
    /// Evaluate at `now`
    fn evaluate(&self, dataset: &DatasetFreshness, now: DateTime<Utc>) -> FreshnessVerdict;
}

/// Age thresholds in whole hours, inclusive
///
/// `age >= fail_after_hours` fails, `age >= warn_after_hours` warns.
/// A dataset with no successful ingestion fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdEvaluator;

impl FreshnessEvaluator for ThresholdEvaluator {
    fn evaluate(&self, dataset: &DatasetFreshness, now: DateTime<Utc>) -> FreshnessVerdict {
        let Some(last_success) = dataset.last_success_at else {
            return FreshnessVerdict {
                status: FreshnessStatus::Fail,
                age_minutes: None,
            };
        };

        let age_minutes = (now - last_success).num_minutes().max(0);
        let fail_after = i64::from(dataset.policy.fail_after_hours) * 60;
        let warn_after = i64::from(dataset.policy.warn_after_hours) * 60;

        let status = if age_minutes >= fail_after {
            FreshnessStatus::Fail
        } else if age_minutes >= warn_after {
            FreshnessStatus::Warn
        } else {
            FreshnessStatus::Fresh
        };

        FreshnessVerdict {
            status,
            age_minutes: Some(age_minutes),
        }
    }
}
