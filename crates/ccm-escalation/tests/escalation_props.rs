use ccm_core::{
    AuditConfig, AuditEmitter, CheckStatus, DriftType, EscalationConfig, EscalationLevel,
    EscalationSla, InMemoryStore, Severity,
};
use ccm_escalation::{required_level, DriftTracker};
use ccm_test_utils::{drift_item, ManualClock, MemoryAuditSink, RecordingAlertSender};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Advance(i64),
    Record(CheckStatus, Severity),
    Escalate,
}

fn status() -> impl Strategy<Value = CheckStatus> {
    prop_oneof![Just(CheckStatus::Warn), Just(CheckStatus::Fail)]
}

fn severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Low),
        Just(Severity::Medium),
        Just(Severity::High),
        Just(Severity::Critical),
    ]
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0i64..20).prop_map(Step::Advance),
        (status(), severity()).prop_map(|(st, sev)| Step::Record(st, sev)),
        Just(Step::Escalate),
    ]
}

proptest! {
    #[test]
    fn prop_required_level_is_monotone_in_age(
        status in status(),
        severity in severity(),
        age in 0i64..120,
        extra in 0i64..120,
    ) {
        let sla = EscalationSla::default();
        let earlier = required_level(status, Some(severity), age, &sla);
        let later = required_level(status, Some(severity), age + extra, &sla);
        prop_assert!(later >= earlier);
    }

    #[test]
    fn prop_level_never_decreases_while_open(
        first in (status(), severity()),
        steps in prop::collection::vec(step(), 1..40),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async move {
            let clock = ManualClock::shared();
            let audit = AuditEmitter::spawn(MemoryAuditSink::shared(), &AuditConfig::default());
            let tracker = DriftTracker::new(
                InMemoryStore::shared(),
                RecordingAlertSender::shared(),
                audit,
                clock.clone(),
                EscalationConfig::default(),
            );

            let ws = "ws-prop";
            let item = |sev| vec![drift_item(DriftType::SnapshotStale, sev)];
            let record = tracker
                .record_drift(ws, first.0, Some(first.1), item(first.1))
                .await
                .unwrap()
                .unwrap();

            let mut highest = EscalationLevel::None;
            for step in steps {
                match step {
                    Step::Advance(minutes) => clock.advance_minutes(minutes),
                    Step::Record(st, sev) => {
                        tracker.record_drift(ws, st, Some(sev), item(sev)).await.unwrap();
                    }
                    Step::Escalate => {
                        let result = tracker.check_and_escalate(&record).await.unwrap();
                        assert!(result.new_level >= result.previous_level);
                    }
                }
                let stored = tracker.get_drift(ws).await.unwrap().unwrap();
                assert_eq!(stored.id, record.id);
                assert!(stored.escalation_level >= highest);
                highest = stored.escalation_level;
            }
        });
    }
}

#[tokio::test]
async fn escalation_path_for_persistent_critical_failure() {
    let clock = ManualClock::shared();
    let alerts = RecordingAlertSender::shared();
    let audit = AuditEmitter::spawn(MemoryAuditSink::shared(), &AuditConfig::default());
    let tracker = DriftTracker::new(
        InMemoryStore::shared(),
        alerts.clone(),
        audit,
        clock.clone(),
        EscalationConfig::default(),
    );

    let mut levels = Vec::new();
    for _ in 0..12 {
        let record = tracker
            .record_drift(
                "ws",
                CheckStatus::Fail,
                Some(Severity::Critical),
                vec![drift_item(DriftType::FailureInjectionActive, Severity::Critical)],
            )
            .await
            .unwrap()
            .unwrap();
        let result = tracker.check_and_escalate(&record).await.unwrap();
        if result.escalated {
            levels.push((result.age_minutes, result.new_level));
        }
        clock.advance_minutes(1);
    }

    assert_eq!(
        levels,
        vec![(0, EscalationLevel::Notified), (5, EscalationLevel::Critical)]
    );
    assert_eq!(alerts.sent().len(), 1);
}
