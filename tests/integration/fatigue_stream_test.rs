//! Integration tests for live fatigue sessions.

use chrono::{Duration, Utc};
use mobility_cds::fatigue::{
    run_session, FatigueDetector, FatigueMonitor, FatigueSeverity, MetricSample,
};
use mobility_cds::storage::{Database, FatigueSettings, FatigueStore, PersonalizationStore};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

fn declining(count: usize) -> Vec<MetricSample> {
    let start = Utc::now();
    (0..count)
        .map(|i| {
            MetricSample::new(
                start + Duration::seconds(i as i64 * 10),
                60.0 - i as f64 * 2.0,
                50.0,
            )
        })
        .collect()
}

/// Test fewer than twelve samples never detect fatigue.
#[test]
fn test_short_window_never_detects() {
    let detector = FatigueDetector::default();
    let mut session = detector.open_session(Uuid::new_v4(), Uuid::new_v4(), None);

    for sample in declining(11) {
        assert!(!detector.ingest(&mut session, sample).detected);
    }
    assert_eq!(detector.close_session(session).detections, 0);
}

/// Test concurrent sessions stay independent.
#[tokio::test]
async fn test_parallel_sessions_are_independent() {
    let detector = FatigueDetector::default();

    let mut tasks = Vec::new();
    let mut sample_senders = Vec::new();
    for fatiguing in [true, false] {
        let session = detector.open_session(Uuid::new_v4(), Uuid::new_v4(), None);
        let (sample_tx, sample_rx) = mpsc::channel(16);
        let (detection_tx, _detection_rx) = mpsc::channel(64);
        tasks.push(tokio::spawn(run_session(
            detector.clone(),
            None,
            session,
            sample_rx,
            detection_tx,
        )));
        sample_senders.push((fatiguing, sample_tx));
    }

    let start = Utc::now();
    for i in 0..20 {
        for (fatiguing, tx) in &sample_senders {
            let power = if *fatiguing { 60.0 - i as f64 * 2.0 } else { 45.0 };
            tx.send(MetricSample::new(start + Duration::seconds(i * 10), power, 50.0))
                .await
                .unwrap();
        }
    }
    drop(sample_senders);

    let mut summaries = Vec::new();
    for task in tasks {
        summaries.push(task.await.unwrap());
    }

    assert!(summaries[0].detections > 0);
    assert_eq!(summaries[0].peak_severity, Some(FatigueSeverity::Severe));
    assert_eq!(summaries[1].detections, 0);
    assert_eq!(summaries[1].samples_seen, 20);
}

/// Test a streamed session stores its episode for the patient.
#[tokio::test]
async fn test_streamed_session_is_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cds.db");
    let patient_id = Uuid::new_v4();
    let detector = FatigueDetector::default();

    let database = Database::open(&path).unwrap();
    let session = FatigueMonitor::new(database.connection(), detector.clone())
        .open_session(Uuid::new_v4(), patient_id);
    let session_id = session.session_id();

    let (sample_tx, sample_rx) = mpsc::channel(16);
    let (detection_tx, _detection_rx) = mpsc::channel(64);
    let task = tokio::spawn(run_session(
        detector,
        Some(database),
        session,
        sample_rx,
        detection_tx,
    ));

    for sample in declining(25) {
        sample_tx.send(sample).await.unwrap();
    }
    drop(sample_tx);
    let summary = task.await.unwrap();
    assert!(summary.detections > 1);

    let db = Database::open(&path).unwrap();
    let events = FatigueStore::new(db.connection())
        .events_for_session(session_id)
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].patient_id, patient_id);

    let profile = PersonalizationStore::new(db.connection())
        .get(patient_id)
        .unwrap()
        .unwrap();
    assert_eq!(profile.avg_fatigue_onset_minutes, Some(events[0].elapsed_minutes));
}

/// Test stored fatigue history personalizes the next session.
#[test]
fn test_history_lowers_next_session_thresholds() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("cds.db")).unwrap();
    let patient_id = Uuid::new_v4();
    let monitor = FatigueMonitor::new(db.connection(), FatigueDetector::default());

    let mut first = monitor.open_session(Uuid::new_v4(), patient_id);
    let default_mild = first.thresholds().power_decline_mild;
    assert_eq!(default_mild, FatigueSettings::default().power_decline_mild);

    let mut written = 0;
    for sample in declining(15) {
        let result = monitor.process_sample(&mut first, sample);
        assert!(!result.persist_failed);
        if result.event_id.is_some() {
            written += 1;
        }
    }
    let first_id = first.session_id();
    monitor.close_session(first);

    let events = FatigueStore::new(db.connection())
        .events_for_session(first_id)
        .unwrap();
    assert_eq!(events.len(), written);
    assert!(written > 0);

    let profile = PersonalizationStore::new(db.connection())
        .get(patient_id)
        .unwrap()
        .unwrap();
    assert!(profile.fatigue_decay_rate.unwrap() > FatigueSettings::default().reference_decay_rate);

    let second = monitor.open_session(Uuid::new_v4(), patient_id);
    assert!(second.thresholds().power_decline_mild < default_mild);
}
