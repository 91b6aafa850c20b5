//! Drive a fatigue session from a live sample channel.

use tokio::sync::mpsc;

use super::detector::FatigueDetector;
use super::monitor::FatigueMonitor;
use super::session::{FatigueSession, SessionSummary};
use super::types::{FatigueDetection, MetricSample};
use crate::storage::Database;

/// Consume samples until the sender side closes, forwarding detections.
///
/// The task owns the session, so a session has exactly one writer. With a
/// database every sample goes through [`FatigueMonitor`], which stores
/// events and updates personalization; without one detections are only
/// forwarded. The buffer is released when the stream ends. If the detection
/// receiver is dropped, analysis continues and results are discarded.
pub async fn run_session(
    detector: FatigueDetector,
    database: Option<Database>,
    mut session: FatigueSession,
    mut samples: mpsc::Receiver<MetricSample>,
    detections: mpsc::Sender<FatigueDetection>,
) -> SessionSummary {
    let mut receiver_open = true;

    while let Some(sample) = samples.recv().await {
        let detection = match database.as_ref() {
            Some(db) => {
                FatigueMonitor::new(db.connection(), detector.clone())
                    .process_sample(&mut session, sample)
                    .detection
            }
            None => detector.ingest(&mut session, sample),
        };
        if !detection.detected || !receiver_open {
            continue;
        }

        if detections.send(detection).await.is_err() {
            tracing::warn!(
                session_id = %session.session_id(),
                "Detection receiver dropped; continuing without forwarding"
            );
            receiver_open = false;
        }
    }

    detector.close_session(session)
}
