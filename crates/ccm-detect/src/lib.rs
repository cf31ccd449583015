//! CCM Detect - Drift Detection
//!
//! Runs the fixed battery of compliance checks against the evidence sources:
//! - Snapshot presence, age and checksum
//! - Workspace and global kill-switches
//! - Failure-injection configs
//! - Owner membership
//! - Dataset freshness
//! - Audit sink reachability
//!
//! Every check degrades to a synthetic drift item when its source cannot be
//! queried, so a detector call never fails.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod checks;
pub mod detector;
pub mod freshness;

pub use detector::DriftDetector;
pub use freshness::{FreshnessEvaluator, FreshnessStatus, FreshnessVerdict, ThresholdEvaluator};
