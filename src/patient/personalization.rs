//! Per-patient personalization state.
//!
//! One mutable row per patient, updated after every completed session and
//! every fatigue or setback event. Rows are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::stats::ema;

/// Smoothing factor for fatigue onset and decay averages.
pub const FATIGUE_EMA_ALPHA: f64 = 0.3;

/// Learned progression and fatigue state for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationProfile {
    pub patient_id: Uuid,
    /// Progression level, never below 1
    pub current_progression_level: u32,
    pub days_at_current_level: u32,
    pub consecutive_successful_sessions: u32,
    pub in_setback_recovery: bool,
    pub setback_start_date: Option<DateTime<Utc>>,
    pub pre_setback_level: Option<u32>,
    /// Smoothed minutes into a session at which fatigue appears
    pub avg_fatigue_onset_minutes: Option<f64>,
    /// Smoothed power decline per minute of exercise
    pub fatigue_decay_rate: Option<f64>,
    /// When the current level was entered
    pub level_started_at: DateTime<Utc>,
    pub last_progression_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PersonalizationProfile {
    pub fn new(patient_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            patient_id,
            current_progression_level: 1,
            days_at_current_level: 0,
            consecutive_successful_sessions: 0,
            in_setback_recovery: false,
            setback_start_date: None,
            pre_setback_level: None,
            avg_fatigue_onset_minutes: None,
            fatigue_decay_rate: None,
            level_started_at: now,
            last_progression_date: None,
            updated_at: now,
        }
    }

    /// Fold one fatigue detection into the onset and decay averages.
    pub fn record_fatigue(&mut self, onset_minutes: f64, power_decline: f64, now: DateTime<Utc>) {
        let onset_minutes = onset_minutes.max(0.0);
        self.avg_fatigue_onset_minutes = Some(ema(
            self.avg_fatigue_onset_minutes,
            onset_minutes,
            FATIGUE_EMA_ALPHA,
        ));

        if onset_minutes > 0.0 {
            let decay = power_decline.max(0.0) / onset_minutes;
            self.fatigue_decay_rate = Some(ema(self.fatigue_decay_rate, decay, FATIGUE_EMA_ALPHA));
        }
        self.updated_at = now;
    }

    /// Enter setback recovery, dropping one level (floor 1).
    pub fn enter_setback(&mut self, now: DateTime<Utc>) {
        self.pre_setback_level = Some(self.current_progression_level);
        self.current_progression_level = self.current_progression_level.saturating_sub(1).max(1);
        self.in_setback_recovery = true;
        self.setback_start_date = Some(now);
        self.consecutive_successful_sessions = 0;
        self.level_started_at = now;
        self.days_at_current_level = 0;
        self.updated_at = now;
    }

    /// Leave setback recovery. The level is kept, not restored.
    pub fn complete_recovery(&mut self, now: DateTime<Utc>) {
        self.in_setback_recovery = false;
        self.setback_start_date = None;
        self.pre_setback_level = None;
        self.updated_at = now;
    }

    /// Move up one level and reset the success counter.
    pub fn apply_progression(&mut self, now: DateTime<Utc>) {
        self.current_progression_level += 1;
        self.consecutive_successful_sessions = 0;
        self.days_at_current_level = 0;
        self.level_started_at = now;
        self.last_progression_date = Some(now);
        self.updated_at = now;
    }

    /// Record a completed session outcome.
    pub fn record_session(&mut self, successful: bool, now: DateTime<Utc>) {
        if successful {
            self.consecutive_successful_sessions += 1;
        } else {
            self.consecutive_successful_sessions = 0;
        }
        self.days_at_current_level = (now - self.level_started_at).num_days().max(0) as u32;
        self.updated_at = now;
    }
}
