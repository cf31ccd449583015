//! SLA escalation policy
//!
//! Pure mapping from drift state and age to the escalation level it
//! requires. The tracker only ever moves a record's level up to this value.

use ccm_core::{CheckStatus, EscalationLevel, EscalationSla, Severity};

/// Level required by a drift of `status`/`severity` that is `age_minutes` old
///
/// FAIL escalates to CRITICAL when the drift is CRITICAL and older than the
/// critical threshold, to PAGED once older than the fail threshold, and is
/// NOTIFIED before that. WARN is NOTIFIED once older than the warn threshold.
#[must_use]
pub fn required_level(
    status: CheckStatus,
    severity: Option<Severity>,
    age_minutes: i64,
    sla: &EscalationSla,
) -> EscalationLevel {
    match status {
        CheckStatus::Fail => {
            if severity == Some(Severity::Critical)
                && age_minutes >= sla.critical_threshold_minutes
            {
                EscalationLevel::Critical
            } else if age_minutes >= sla.fail_threshold_minutes {
                EscalationLevel::Paged
            } else {
                EscalationLevel::Notified
            }
        }
        CheckStatus::Warn if age_minutes >= sla.warn_threshold_minutes => EscalationLevel::Notified,
        CheckStatus::Warn | CheckStatus::Pass => EscalationLevel::None,
    }
}

/// Level to move to, if `required` is strictly above `current`
#[inline]
#[must_use]
pub fn next_level(current: EscalationLevel, required: EscalationLevel) -> Option<EscalationLevel> {
    required.is_higher_than(current).then_some(required)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sla() -> EscalationSla {
        EscalationSla::default()
    }

    #[test]
    fn fail_critical_thresholds() {
        let crit = Some(Severity::Critical);
        assert_eq!(
            required_level(CheckStatus::Fail, crit, 0, &sla()),
            EscalationLevel::Notified
        );
        assert_eq!(
            required_level(CheckStatus::Fail, crit, 4, &sla()),
            EscalationLevel::Notified
        );
        assert_eq!(
            required_level(CheckStatus::Fail, crit, 5, &sla()),
            EscalationLevel::Critical
        );
    }

    #[test]
    fn fail_non_critical_pages_after_fail_threshold() {
        let high = Some(Severity::High);
        assert_eq!(
            required_level(CheckStatus::Fail, high, 9, &sla()),
            EscalationLevel::Notified
        );
        assert_eq!(
            required_level(CheckStatus::Fail, high, 10, &sla()),
            EscalationLevel::Paged
        );
        assert_eq!(
            required_level(CheckStatus::Fail, high, 10_000, &sla()),
            EscalationLevel::Paged
        );
    }

    #[test]
    fn warn_notifies_after_warn_threshold() {
        let med = Some(Severity::Medium);
        assert_eq!(
            required_level(CheckStatus::Warn, med, 29, &sla()),
            EscalationLevel::None
        );
        assert_eq!(
            required_level(CheckStatus::Warn, med, 30, &sla()),
            EscalationLevel::Notified
        );
    }

    #[test]
    fn pass_never_escalates() {
        assert_eq!(
            required_level(CheckStatus::Pass, None, 1_000, &sla()),
            EscalationLevel::None
        );
    }

    #[test]
    fn next_level_only_moves_up() {
        use EscalationLevel::{Critical, None as Lvl0, Notified, Paged};
        assert_eq!(next_level(Lvl0, Notified), Some(Notified));
        assert_eq!(next_level(Paged, Notified), None);
        assert_eq!(next_level(Paged, Paged), None);
        assert_eq!(next_level(Paged, Critical), Some(Critical));
    }
}
