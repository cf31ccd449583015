//! CCM Escalation - Drift Tracking
//!
//! Tracks one open drift record per workspace and escalates it through
//! `NONE < NOTIFIED < PAGED < CRITICAL` as it outlives the SLA thresholds.
//! Levels only move up while a drift stays open; resolving the drift
//! discards the record.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod policy;
pub mod tracker;

pub use policy::{next_level, required_level};
pub use tracker::{DriftTracker, EscalationResult};
