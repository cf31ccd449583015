//! Injected time source
//!
//! Every age and cooldown computation reads time through a [`Clock`] so the
//! thresholds can be tested deterministically.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Current-time capability
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock behind a shared handle
#[must_use]
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
