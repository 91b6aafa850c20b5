//! Per-session sample buffer.
//!
//! A [`FatigueSession`] is owned by whoever drives the session. Writes go
//! through `&mut`, so a session has exactly one writer; distinct sessions
//! share nothing and can run on different threads. The buffer is released
//! when the session is closed through [`super::FatigueDetector::close_session`].

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{FatigueSeverity, FatigueThresholds, MetricSample};

/// Live state for one exercise session.
#[derive(Debug, Clone)]
pub struct FatigueSession {
    session_id: Uuid,
    patient_id: Uuid,
    samples: VecDeque<MetricSample>,
    capacity: usize,
    thresholds: FatigueThresholds,
    started_at: Option<DateTime<Utc>>,
    samples_seen: u64,
    detections: u32,
    peak_severity: Option<FatigueSeverity>,
    /// Highest severity already written to storage
    reported_severity: Option<FatigueSeverity>,
}

impl FatigueSession {
    pub(crate) fn new(
        session_id: Uuid,
        patient_id: Uuid,
        capacity: usize,
        thresholds: FatigueThresholds,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            session_id,
            patient_id,
            samples: VecDeque::with_capacity(capacity),
            capacity,
            thresholds,
            started_at: None,
            samples_seen: 0,
            detections: 0,
            peak_severity: None,
            reported_severity: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    pub fn thresholds(&self) -> &FatigueThresholds {
        &self.thresholds
    }

    /// Samples currently buffered.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Append a sample, evicting the oldest when full.
    pub(crate) fn push(&mut self, sample: MetricSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        if self.started_at.is_none() {
            self.started_at = Some(sample.timestamp);
        }
        self.samples.push_back(sample);
        self.samples_seen += 1;
    }

    /// Samples within `window_secs` of the newest sample, oldest first.
    pub fn window(&self, window_secs: u32) -> Vec<MetricSample> {
        let Some(latest) = self.samples.back() else {
            return Vec::new();
        };
        let cutoff = latest.timestamp - Duration::seconds(window_secs as i64);

        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .copied()
            .collect()
    }

    /// Minutes from the first sample to `at`.
    pub fn elapsed_minutes(&self, at: DateTime<Utc>) -> f64 {
        self.started_at
            .map(|start| (at - start).num_milliseconds().max(0) as f64 / 60_000.0)
            .unwrap_or(0.0)
    }

    pub(crate) fn record_detection(&mut self, severity: FatigueSeverity) {
        self.detections += 1;
        self.peak_severity = Some(match self.peak_severity {
            Some(peak) => peak.max(severity),
            None => severity,
        });
    }

    pub fn reported_severity(&self) -> Option<FatigueSeverity> {
        self.reported_severity
    }

    /// Whether `severity` is the first or a worse episode than any reported.
    pub fn is_escalation(&self, severity: FatigueSeverity) -> bool {
        self.reported_severity.map_or(true, |reported| severity > reported)
    }

    pub(crate) fn mark_reported(&mut self, severity: FatigueSeverity) {
        self.reported_severity = Some(match self.reported_severity {
            Some(reported) => reported.max(severity),
            None => severity,
        });
    }

    pub(crate) fn into_summary(self) -> SessionSummary {
        let duration_minutes = self
            .samples
            .back()
            .map(|last| self.elapsed_minutes(last.timestamp))
            .unwrap_or(0.0);

        SessionSummary {
            session_id: self.session_id,
            patient_id: self.patient_id,
            samples_seen: self.samples_seen,
            detections: self.detections,
            peak_severity: self.peak_severity,
            duration_minutes,
        }
    }
}

/// What a closed session reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub patient_id: Uuid,
    pub samples_seen: u64,
    pub detections: u32,
    pub peak_severity: Option<FatigueSeverity>,
    pub duration_minutes: f64,
}
