//! CCM Response - Automated Remediation
//!
//! Runs the containment playbook for critical compliance failures and
//! manages the incidents it opens:
//! - Per-workspace cooldown claimed atomically through the keyed store
//! - Idempotent kill-switch enablement
//! - On-call notification with a bounded timeout
//! - Forward-only incident lifecycle with audited human actions

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod executor;

pub use executor::{AutoResponseExecutor, AutoResponseResult, SkipReason};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
