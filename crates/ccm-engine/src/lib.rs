//! CCM Engine - Continuous Compliance Control Loop
//!
//! Wires detection, drift tracking, alert dispatch and auto-response into a
//! single [`ComplianceEngine`]. The engine has no scheduler of its own: the
//! host calls [`ComplianceEngine::run_cycle`] and
//! [`ComplianceEngine::sweep_escalations`] on whatever cadence it runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use ccm_engine::ComplianceEngine;
//!
//! let engine = ComplianceEngine::new(config, sources, transport, sink, clock);
//! let report = engine.run_cycle([("ws-1", "prod")]).await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod engine;

pub use engine::{ComplianceEngine, CycleReport, EngineStores, WorkspaceCycle};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
