//! Real-time fatigue detection over a trailing sample window.
//!
//! Markers, computed once the window holds enough samples:
//! - power decline: first-quartile vs last-quartile mean power
//! - cadence coefficient of variation
//! - bilateral asymmetry change, first vs last quartile of bilateral samples
//! - force-pattern degradation: decline with irregular cadence, or very
//!   variable power overall

use uuid::Uuid;

use super::session::{FatigueSession, SessionSummary};
use super::types::{
    FatigueAction, FatigueDetection, FatigueMarkers, FatigueSeverity, FatigueThresholds,
    FatigueType, MetricSample,
};
use crate::metrics::stats::{coefficient_of_variation, mean};
use crate::patient::PersonalizationProfile;
use crate::storage::config::FatigueSettings;

/// Largest resistance reduction recommended, in levels.
pub const MAX_RESISTANCE_REDUCTION: f64 = 3.0;

/// Stateless detector; all per-session state lives in [`FatigueSession`].
#[derive(Debug, Clone, Default)]
pub struct FatigueDetector {
    settings: FatigueSettings,
}

impl FatigueDetector {
    pub fn new(settings: FatigueSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FatigueSettings {
        &self.settings
    }

    /// Threshold multiplier from a patient's historical decay rate.
    ///
    /// Patients who fatigue faster than the reference rate get lower
    /// thresholds, bounded to ±`personalization_bound`.
    pub fn personalization_factor(&self, decay_rate: Option<f64>) -> f64 {
        let bound = self.settings.personalization_bound;
        match decay_rate {
            Some(rate) if rate > 0.0 && rate.is_finite() => {
                (self.settings.reference_decay_rate / rate).clamp(1.0 - bound, 1.0 + bound)
            }
            _ => 1.0,
        }
    }

    /// Thresholds for a patient.
    pub fn thresholds_for(&self, profile: Option<&PersonalizationProfile>) -> FatigueThresholds {
        let base = FatigueThresholds::from_settings(&self.settings);
        let factor = self.personalization_factor(profile.and_then(|p| p.fatigue_decay_rate));
        if factor == 1.0 {
            base
        } else {
            base.scaled(factor)
        }
    }

    /// Start a session with an empty buffer.
    pub fn open_session(
        &self,
        session_id: Uuid,
        patient_id: Uuid,
        profile: Option<&PersonalizationProfile>,
    ) -> FatigueSession {
        let thresholds = self.thresholds_for(profile);
        tracing::debug!(
            session_id = %session_id,
            patient_id = %patient_id,
            decline_mild = thresholds.power_decline_mild,
            "Fatigue session opened"
        );
        FatigueSession::new(
            session_id,
            patient_id,
            self.settings.buffer_capacity,
            thresholds,
        )
    }

    /// Add a sample and analyse the trailing window.
    pub fn ingest(&self, session: &mut FatigueSession, sample: MetricSample) -> FatigueDetection {
        if !sample.is_valid() {
            tracing::warn!(
                session_id = %session.session_id(),
                "Ignoring sample with non-finite values"
            );
            return FatigueDetection::none();
        }

        session.push(sample);

        let window = session.window(self.settings.window_secs);
        if window.len() < self.settings.min_samples {
            return FatigueDetection::none();
        }

        let mut detection = self.analyze(&window, session.thresholds());
        detection.elapsed_minutes = session.elapsed_minutes(sample.timestamp);

        if let Some(severity) = detection.severity {
            detection.detected_at = Some(sample.timestamp);
            session.record_detection(severity);
            tracing::info!(
                session_id = %session.session_id(),
                patient_id = %session.patient_id(),
                fatigue_type = ?detection.fatigue_type,
                severity = %severity,
                markers = detection.marker_count,
                "Fatigue detected"
            );
        }

        detection
    }

    /// End a session and release its buffer.
    pub fn close_session(&self, session: FatigueSession) -> SessionSummary {
        let summary = session.into_summary();
        tracing::debug!(
            session_id = %summary.session_id,
            samples = summary.samples_seen,
            detections = summary.detections,
            "Fatigue session closed"
        );
        summary
    }

    /// Classify a window. Callers guarantee the minimum sample count.
    pub fn analyze(
        &self,
        window: &[MetricSample],
        thresholds: &FatigueThresholds,
    ) -> FatigueDetection {
        let markers = compute_markers(window, thresholds, self.settings.min_bilateral_samples);

        let decline_hit = markers.power_decline >= thresholds.power_decline_mild;
        let cadence_hit = markers.cadence_cv >= thresholds.cadence_cv;
        let asymmetry_hit = markers
            .asymmetry_change
            .map_or(false, |change| change >= thresholds.asymmetry_change);
        let force_hit = markers.force_degradation;

        let marker_count = [decline_hit, cadence_hit, asymmetry_hit, force_hit]
            .iter()
            .filter(|hit| **hit)
            .count() as u8;

        if marker_count == 0 {
            return FatigueDetection::with_markers(markers);
        }

        let fatigue_type = if asymmetry_hit {
            FatigueType::BilateralLoss
        } else if cadence_hit && !decline_hit {
            FatigueType::CadenceIrregular
        } else if force_hit {
            FatigueType::ForceDegradation
        } else {
            FatigueType::PowerDecline
        };

        let severity = if marker_count >= 3 || markers.power_decline >= thresholds.power_decline_severe
        {
            FatigueSeverity::Severe
        } else if marker_count >= 2
            || markers.power_decline >= thresholds.power_decline_moderate
        {
            FatigueSeverity::Moderate
        } else {
            FatigueSeverity::Mild
        };

        let (action, resistance_reduction, message) = match severity {
            FatigueSeverity::Severe => (
                FatigueAction::EndSession,
                Some(resistance_reduction(markers.power_decline, marker_count)),
                format!("Severe fatigue ({}): recommend ending the session", fatigue_type.label()),
            ),
            FatigueSeverity::Moderate => {
                let reduction = resistance_reduction(markers.power_decline, marker_count);
                (
                    FatigueAction::ReduceResistance,
                    Some(reduction),
                    format!(
                        "Moderate fatigue ({}): reduce resistance by {:.1} levels",
                        fatigue_type.label(),
                        reduction
                    ),
                )
            }
            FatigueSeverity::Mild => (
                FatigueAction::Informational,
                None,
                format!("Mild fatigue ({}): monitor closely", fatigue_type.label()),
            ),
        };

        FatigueDetection {
            detected: true,
            fatigue_type: Some(fatigue_type),
            severity: Some(severity),
            markers,
            marker_count,
            action,
            resistance_reduction,
            message,
            elapsed_minutes: 0.0,
            detected_at: None,
        }
    }
}

/// Levels to drop: 1 plus 0.5 per 10 % of decline, plus 0.5 with three or
/// more markers, capped at [`MAX_RESISTANCE_REDUCTION`].
pub fn resistance_reduction(power_decline: f64, marker_count: u8) -> f64 {
    let mut reduction = 1.0 + (power_decline.max(0.0) * 10.0).floor() * 0.5;
    if marker_count >= 3 {
        reduction += 0.5;
    }
    reduction.min(MAX_RESISTANCE_REDUCTION)
}

/// Compute marker values for a window.
pub fn compute_markers(
    window: &[MetricSample],
    thresholds: &FatigueThresholds,
    min_bilateral_samples: usize,
) -> FatigueMarkers {
    let powers: Vec<f64> = window.iter().map(|s| s.power).collect();
    let rpms: Vec<f64> = window.iter().map(|s| s.rpm).collect();

    let power_decline = quartile_change(&powers)
        .map(|(first, last)| {
            if first > 0.0 {
                ((first - last) / first).max(0.0)
            } else {
                0.0
            }
        })
        .unwrap_or(0.0);

    let cadence_cv = coefficient_of_variation(&rpms).unwrap_or(0.0);
    let power_cv = coefficient_of_variation(&powers).unwrap_or(0.0);

    let asymmetries: Vec<f64> = window.iter().filter_map(MetricSample::asymmetry).collect();
    let asymmetry_change = if asymmetries.len() >= min_bilateral_samples.max(1) {
        quartile_change(&asymmetries).map(|(first, last)| (last - first).abs())
    } else {
        None
    };

    let force_degradation = (power_decline >= thresholds.power_decline_mild
        && cadence_cv >= thresholds.cadence_cv)
        || power_cv > thresholds.power_cv;

    FatigueMarkers {
        power_decline,
        cadence_cv,
        asymmetry_change,
        power_cv,
        force_degradation,
        samples_in_window: window.len(),
    }
}

/// Means of the first and last quartiles.
fn quartile_change(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let quarter = (values.len() / 4).max(1);
    let first = mean(&values[..quarter])?;
    let last = mean(&values[values.len() - quarter..])?;
    Some((first, last))
}
