//! Progressive overload and setback rules.
//!
//! Pure functions over session history (oldest first), active goals and the
//! personalization profile. [`super::ProgressionService`] owns the
//! read-evaluate-write cycle.

use chrono::{DateTime, Duration, Utc};

use super::types::{
    ExerciseSession, PlateauCheck, ProgressionDecision, ProgressionParameter, RecoveryCheck,
    SetbackCheck, SetbackSeverity, SetbackType,
};
use crate::goals::{active_goal, GoalMetric, TherapyGoal};
use crate::metrics::stats::{mean, relative_trend};
use crate::patient::PersonalizationProfile;
use crate::storage::config::ProgressionSettings;

const CONFIDENCE_COUNT_WEIGHT: f64 = 0.30;
const CONFIDENCE_DURATION_WEIGHT: f64 = 0.35;
const CONFIDENCE_POWER_WEIGHT: f64 = 0.35;

/// Progression and setback rules.
#[derive(Debug, Clone, Default)]
pub struct ProgressionEngine {
    settings: ProgressionSettings,
}

impl ProgressionEngine {
    pub fn new(settings: ProgressionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProgressionSettings {
        &self.settings
    }

    // ========== Setbacks ==========

    /// Run the setback checks in order; the first hit wins.
    pub fn check_setback(&self, sessions: &[ExerciseSession], now: DateTime<Utc>) -> SetbackCheck {
        self.check_performance_decline(sessions)
            .or_else(|| self.check_adherence(sessions, now))
            .or_else(|| self.check_bilateral_imbalance(sessions))
            .unwrap_or_else(SetbackCheck::none)
    }

    /// Recent average power against the window just before it.
    pub fn check_performance_decline(&self, sessions: &[ExerciseSession]) -> Option<SetbackCheck> {
        let recent_len = self.settings.decline_recent_window;
        let baseline_len = self.settings.decline_baseline_window;
        if recent_len == 0 || baseline_len == 0 || sessions.len() < recent_len + baseline_len {
            return None;
        }

        let tail = &sessions[sessions.len() - recent_len - baseline_len..];
        let (baseline, recent) = tail.split_at(baseline_len);
        let baseline_avg = mean(&baseline.iter().map(|s| s.avg_power).collect::<Vec<_>>())?;
        let recent_avg = mean(&recent.iter().map(|s| s.avg_power).collect::<Vec<_>>())?;
        if baseline_avg <= 0.0 {
            return None;
        }

        let decline = (baseline_avg - recent_avg) / baseline_avg;
        let tier = highest_tier(decline, &self.settings.decline_tiers)?;
        let severity = SetbackSeverity::from_tier(tier);

        Some(SetbackCheck::detected(
            SetbackType::PerformanceDecline,
            severity,
            decline,
            format!(
                "Average power fell {:.0}% ({:.1} W to {:.1} W) over the last {} sessions",
                decline * 100.0,
                baseline_avg,
                recent_avg,
                recent_len
            ),
        ))
    }

    /// Days between `now` and the latest session before it.
    pub fn check_adherence(
        &self,
        sessions: &[ExerciseSession],
        now: DateTime<Utc>,
    ) -> Option<SetbackCheck> {
        let last = sessions
            .iter()
            .filter(|s| s.started_at < now)
            .map(|s| s.started_at)
            .max()?;

        let days = (now - last).num_days();
        let tiers = self.settings.adherence_tiers_days.map(|d| d as f64);
        let tier = highest_tier(days as f64, &tiers)?;
        let severity = SetbackSeverity::from_tier(tier);

        Some(SetbackCheck::detected(
            SetbackType::AdherenceDrop,
            severity,
            days as f64,
            format!("No session for {} days", days),
        ))
    }

    /// Left/right imbalance across sessions.
    // TODO: needs clinically agreed per-session asymmetry thresholds before
    // this can report anything.
    pub fn check_bilateral_imbalance(&self, _sessions: &[ExerciseSession]) -> Option<SetbackCheck> {
        None
    }

    // ========== Recovery ==========

    /// Whether a patient in setback recovery has recovered.
    pub fn check_recovery_completion(
        &self,
        profile: &PersonalizationProfile,
        sessions: &[ExerciseSession],
        goals: &[TherapyGoal],
        now: DateTime<Utc>,
    ) -> RecoveryCheck {
        // The session that triggered the setback does not count
        let start = profile.setback_start_date.unwrap_or(profile.level_started_at);
        let days_in_recovery = (now - start).num_days().max(0);

        let since: Vec<&ExerciseSession> =
            sessions.iter().filter(|s| s.started_at > start).collect();
        let recent = &since[since.len().saturating_sub(self.settings.required_sessions)..];
        let avg_power = mean(&recent.iter().map(|s| s.avg_power).collect::<Vec<_>>());

        let required_power = active_goal(goals, GoalMetric::Power)
            .map(|g| g.pre_setback_target.unwrap_or(g.target_value) * self.settings.recovery_power_ratio);

        let power_met = match (required_power, avg_power) {
            (None, _) => true,
            (Some(required), Some(avg)) => avg >= required,
            (Some(_), None) => false,
        };

        RecoveryCheck {
            complete: profile.in_setback_recovery
                && days_in_recovery >= self.settings.recovery_min_days
                && since.len() >= self.settings.required_sessions
                && power_met,
            days_in_recovery,
            sessions_since_setback: since.len(),
            avg_power,
            required_power,
        }
    }

    // ========== Plateau ==========

    /// Trend regression over the last `plateau_window` sessions.
    ///
    /// `None` when there are too few sessions to judge.
    pub fn detect_plateau(&self, sessions: &[ExerciseSession]) -> Option<PlateauCheck> {
        let window = self.settings.plateau_window;
        if window < 2 || sessions.len() < window {
            return None;
        }

        let recent = &sessions[sessions.len() - window..];
        let powers: Vec<f64> = recent.iter().map(|s| s.avg_power).collect();
        let durations: Vec<f64> = recent.iter().map(|s| s.duration_min).collect();

        let power_trend = relative_trend(&powers).unwrap_or(0.0);
        let duration_trend = relative_trend(&durations).unwrap_or(0.0);
        let threshold = self.settings.plateau_trend_threshold;

        Some(PlateauCheck {
            detected: power_trend.abs() < threshold && duration_trend.abs() < threshold,
            power_trend,
            duration_trend,
        })
    }

    // ========== Progression ==========

    /// Sessions within the trailing window ending at `now`.
    pub fn sessions_in_window<'s>(
        &self,
        sessions: &'s [ExerciseSession],
        now: DateTime<Utc>,
    ) -> Vec<&'s ExerciseSession> {
        let start = now - Duration::days(self.settings.trailing_days);
        sessions
            .iter()
            .filter(|s| s.started_at >= start && s.started_at <= now)
            .collect()
    }

    /// Whether a single session met its duration target.
    ///
    /// Without a duration goal nothing counts as met.
    pub fn session_successful(&self, session: &ExerciseSession, goals: &[TherapyGoal]) -> bool {
        active_goal(goals, GoalMetric::Duration)
            .map(|g| g.achievement(session.duration_min) >= self.settings.duration_success_ratio)
            .unwrap_or(false)
    }

    /// Propose the next overload step.
    ///
    /// Only sessions after `last_progression` count, so each step needs a
    /// fresh run of qualifying sessions.
    pub fn evaluate_progression(
        &self,
        sessions: &[ExerciseSession],
        goals: &[TherapyGoal],
        last_progression: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ProgressionDecision {
        let required = self.settings.required_sessions.max(1);
        let in_window: Vec<&ExerciseSession> = self
            .sessions_in_window(sessions, now)
            .into_iter()
            .filter(|s| last_progression.map_or(true, |at| s.started_at > at))
            .collect();
        let count_score = (in_window.len() as f64 / required as f64).min(1.0);

        if in_window.len() < required {
            let scope = match last_progression {
                Some(_) => "since the last progression".to_string(),
                None => format!("in the last {} days", self.settings.trailing_days),
            };
            return ProgressionDecision::maintain(
                CONFIDENCE_COUNT_WEIGHT * count_score,
                format!("{} of {} required sessions {}", in_window.len(), required, scope),
            );
        }

        let last = &in_window[in_window.len() - required..];
        let duration_goal = active_goal(goals, GoalMetric::Duration);
        let power_goal = active_goal(goals, GoalMetric::Power);

        let duration_achievements: Option<Vec<f64>> =
            duration_goal.map(|g| last.iter().map(|s| g.achievement(s.duration_min)).collect());
        let power_achievement = power_goal.and_then(|g| {
            mean(&last.iter().map(|s| g.achievement(s.avg_power)).collect::<Vec<_>>())
        });

        let duration_met = duration_achievements.as_ref().map_or(false, |a| {
            a.iter().all(|v| *v >= self.settings.duration_success_ratio)
        });
        let power_met =
            power_achievement.map_or(false, |a| a >= self.settings.power_success_ratio);

        let duration_score = duration_achievements
            .as_deref()
            .and_then(mean)
            .map_or(0.0, |a| a.clamp(0.0, 1.0));
        let power_score = power_achievement.map_or(0.0, |a| a.clamp(0.0, 1.0));
        let confidence = CONFIDENCE_COUNT_WEIGHT * count_score
            + CONFIDENCE_DURATION_WEIGHT * duration_score
            + CONFIDENCE_POWER_WEIGHT * power_score;

        if duration_met && power_met {
            let current = active_goal(goals, GoalMetric::Resistance)
                .map(|g| g.target_value)
                .or_else(|| last.last().map(|s| s.resistance))
                .unwrap_or(1.0);
            let proposed = (current + self.settings.resistance_step).min(self.settings.max_resistance);

            if proposed > current {
                return ProgressionDecision {
                    should_progress: true,
                    parameter: ProgressionParameter::Resistance,
                    current_value: Some(current),
                    proposed_value: Some(proposed),
                    confidence,
                    reason: format!(
                        "Duration and power targets met for {} sessions; resistance {:.1} to {:.1}",
                        required, current, proposed
                    ),
                };
            }

            // Duration only steps up while power lags
            return ProgressionDecision::maintain(
                confidence,
                format!("Resistance already at the maximum of {:.1}", current),
            );
        }

        if duration_met {
            if let Some(goal) = duration_goal {
                let current = goal.target_value;
                let proposed =
                    (current + self.settings.duration_step_min).min(self.settings.max_duration_min);

                if proposed > current {
                    return ProgressionDecision {
                        should_progress: true,
                        parameter: ProgressionParameter::Duration,
                        current_value: Some(current),
                        proposed_value: Some(proposed),
                        confidence,
                        reason: format!(
                            "Duration target met for {} sessions; duration {:.0} to {:.0} min",
                            required, current, proposed
                        ),
                    };
                }
            }
        }

        let reason = if duration_goal.is_none() {
            "No active duration target"
        } else if !duration_met {
            "Duration target not met consistently"
        } else {
            "Already at the maximum for this parameter"
        };
        ProgressionDecision::maintain(confidence, reason)
    }
}

/// Index of the highest tier `value` reaches, if any.
fn highest_tier(value: f64, tiers: &[f64]) -> Option<usize> {
    tiers.iter().rposition(|threshold| value >= *threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session_at(now: DateTime<Utc>, days_ago: i64, duration: f64, power: f64) -> ExerciseSession {
        ExerciseSession::new(
            Uuid::nil(),
            now - Duration::days(days_ago),
            duration,
            power,
            45.0,
            3.0,
        )
    }

    fn goals(duration: f64, power: f64) -> Vec<TherapyGoal> {
        vec![
            TherapyGoal::new(Uuid::nil(), GoalMetric::Duration, duration),
            TherapyGoal::new(Uuid::nil(), GoalMetric::Power, power),
        ]
    }

    #[test]
    fn test_three_successful_sessions_progress_resistance() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions = vec![
            session_at(now, 3, 14.0, 31.0),
            session_at(now, 2, 15.0, 30.0),
            session_at(now, 1, 13.5, 32.0),
        ];

        let decision = engine.evaluate_progression(&sessions, &goals(15.0, 30.0), None, now);
        assert!(decision.should_progress);
        assert_eq!(decision.parameter, ProgressionParameter::Resistance);
        assert_eq!(decision.current_value, Some(3.0));
        assert_eq!(decision.proposed_value, Some(3.5));
        assert!(decision.confidence > 0.95);
    }

    #[test]
    fn test_duration_met_power_not_progresses_duration() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions: Vec<_> = (1..=3).map(|d| session_at(now, d, 15.0, 25.0)).collect();

        let decision = engine.evaluate_progression(&sessions, &goals(15.0, 30.0), None, now);
        assert!(decision.should_progress);
        assert_eq!(decision.parameter, ProgressionParameter::Duration);
        assert_eq!(decision.proposed_value, Some(17.0));
    }

    #[test]
    fn test_duration_capped_at_max() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions: Vec<_> = (1..=3).map(|d| session_at(now, d, 30.0, 20.0)).collect();

        let decision = engine.evaluate_progression(&sessions, &goals(30.0, 30.0), None, now);
        assert!(!decision.should_progress);
        assert_eq!(decision.parameter, ProgressionParameter::Maintain);
    }

    #[test]
    fn test_one_short_session_maintains() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions = vec![
            session_at(now, 3, 15.0, 31.0),
            session_at(now, 2, 10.0, 31.0),
            session_at(now, 1, 15.0, 31.0),
        ];

        let decision = engine.evaluate_progression(&sessions, &goals(15.0, 30.0), None, now);
        assert!(!decision.should_progress);
    }

    #[test]
    fn test_sessions_outside_window_do_not_count() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions = vec![
            session_at(now, 10, 15.0, 31.0),
            session_at(now, 2, 15.0, 31.0),
            session_at(now, 1, 15.0, 31.0),
        ];

        let decision = engine.evaluate_progression(&sessions, &goals(15.0, 30.0), None, now);
        assert!(!decision.should_progress);
        assert!(decision.reason.contains("2 of 3"));
    }

    #[test]
    fn test_missing_goals_never_progress() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions: Vec<_> = (1..=3).map(|d| session_at(now, d, 15.0, 31.0)).collect();

        let decision = engine.evaluate_progression(&sessions, &[], None, now);
        assert!(!decision.should_progress);
    }

    #[test]
    fn test_sessions_before_last_progression_do_not_count() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions: Vec<_> = (1..=4).rev().map(|d| session_at(now, d, 15.0, 31.0)).collect();
        let last_progression = Some(sessions[2].started_at);

        let decision =
            engine.evaluate_progression(&sessions, &goals(15.0, 30.0), last_progression, now);
        assert!(!decision.should_progress);
        assert!(decision.reason.contains("1 of 3"));

        let earlier = Some(now - Duration::days(5));
        let decision = engine.evaluate_progression(&sessions, &goals(15.0, 30.0), earlier, now);
        assert!(decision.should_progress);
    }

    #[test]
    fn test_resistance_at_cap_maintains() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions: Vec<_> = (1..=3).map(|d| session_at(now, d, 15.0, 31.0)).collect();
        let mut capped = goals(15.0, 30.0);
        capped.push(TherapyGoal::new(Uuid::nil(), GoalMetric::Resistance, 9.0));

        let decision = engine.evaluate_progression(&sessions, &capped, None, now);
        assert!(!decision.should_progress);
        assert_eq!(decision.parameter, ProgressionParameter::Maintain);
        assert!(decision.reason.contains("maximum"));
    }

    #[test]
    fn test_eight_days_without_session_is_major_adherence_drop() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let sessions = vec![session_at(now, 9, 15.0, 30.0), session_at(now, 8, 15.0, 30.0)];

        let check = engine.check_setback(&sessions, now);
        assert!(check.detected);
        assert_eq!(check.setback_type, Some(SetbackType::AdherenceDrop));
        assert_eq!(check.severity, Some(SetbackSeverity::Major));
    }

    #[test]
    fn test_adherence_tiers() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let severity = |days| {
            engine
                .check_adherence(&[session_at(now, days, 15.0, 30.0)], now)
                .and_then(|c| c.severity)
        };

        assert_eq!(severity(2), None);
        assert_eq!(severity(3), Some(SetbackSeverity::Minor));
        assert_eq!(severity(5), Some(SetbackSeverity::Moderate));
        assert_eq!(severity(7), Some(SetbackSeverity::Major));
    }

    #[test]
    fn test_performance_decline_tiers() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let history = |recent_power: f64| -> Vec<ExerciseSession> {
            (0..7)
                .map(|i| {
                    let power = if i < 4 { 40.0 } else { recent_power };
                    session_at(now, 7 - i, 15.0, power)
                })
                .collect()
        };

        assert!(engine.check_performance_decline(&history(36.0)).is_none());
        assert_eq!(
            engine.check_performance_decline(&history(34.0)).unwrap().severity,
            Some(SetbackSeverity::Minor)
        );
        assert_eq!(
            engine.check_performance_decline(&history(31.0)).unwrap().severity,
            Some(SetbackSeverity::Moderate)
        );
        assert_eq!(
            engine.check_performance_decline(&history(26.0)).unwrap().severity,
            Some(SetbackSeverity::Major)
        );
        // Six sessions are not enough to compare
        assert!(engine.check_performance_decline(&history(20.0)[1..]).is_none());
    }

    #[test]
    fn test_decline_takes_precedence_over_adherence() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let mut sessions: Vec<_> = (0..7)
            .map(|i| session_at(now, 20 - i, 15.0, if i < 4 { 40.0 } else { 20.0 }))
            .collect();
        sessions.sort_by_key(|s| s.started_at);

        let check = engine.check_setback(&sessions, now);
        assert_eq!(check.setback_type, Some(SetbackType::PerformanceDecline));
    }

    #[test]
    fn test_bilateral_hook_never_fires() {
        let engine = ProgressionEngine::default();
        assert!(engine.check_bilateral_imbalance(&[]).is_none());
    }

    #[test]
    fn test_plateau() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let flat: Vec<_> = (0..6)
            .map(|i| session_at(now, 6 - i, 15.0 + (i % 2) as f64 * 0.2, 30.0))
            .collect();
        assert!(engine.detect_plateau(&flat).unwrap().detected);

        let rising: Vec<_> = (0..6)
            .map(|i| session_at(now, 6 - i, 15.0, 30.0 + i as f64 * 2.0))
            .collect();
        assert!(!engine.detect_plateau(&rising).unwrap().detected);

        assert!(engine.detect_plateau(&flat[..5]).is_none());
    }

    #[test]
    fn test_recovery_completion() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let mut profile = PersonalizationProfile::new(Uuid::nil());
        profile.enter_setback(now - Duration::days(4));

        let mut power_goal = TherapyGoal::new(Uuid::nil(), GoalMetric::Power, 30.0);
        power_goal.pre_setback_target = Some(40.0);
        power_goal.target_value = 30.0;
        let goals = vec![power_goal];

        let strong: Vec<_> = (1..=3).map(|d| session_at(now, d, 15.0, 35.0)).collect();
        let check = engine.check_recovery_completion(&profile, &strong, &goals, now);
        assert!(check.complete);
        assert_eq!(check.required_power, Some(34.0));

        let weak: Vec<_> = (1..=3).map(|d| session_at(now, d, 15.0, 33.0)).collect();
        assert!(!engine.check_recovery_completion(&profile, &weak, &goals, now).complete);

        // Too soon
        let mut recent = profile.clone();
        recent.setback_start_date = Some(now - Duration::days(2));
        let soon: Vec<_> = [25, 13, 1]
            .iter()
            .map(|hours| {
                let mut s = session_at(now, 0, 15.0, 35.0);
                s.started_at = now - Duration::hours(*hours);
                s
            })
            .collect();
        assert!(!engine.check_recovery_completion(&recent, &soon, &goals, now).complete);
    }

    #[test]
    fn test_setback_session_not_counted_toward_recovery() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let start = now - Duration::days(4);
        let mut profile = PersonalizationProfile::new(Uuid::nil());
        profile.enter_setback(start);

        let mut sessions = vec![session_at(now, 4, 15.0, 10.0)];
        sessions[0].started_at = start;
        sessions.extend((1..=2).map(|d| session_at(now, d, 15.0, 10.0)));

        let check = engine.check_recovery_completion(&profile, &sessions, &[], now);
        assert_eq!(check.sessions_since_setback, 2);
        assert!(!check.complete);

        sessions.push(session_at(now, 0, 15.0, 10.0));
        assert!(engine.check_recovery_completion(&profile, &sessions, &[], now).complete);
    }

    #[test]
    fn test_recovery_without_power_goal_needs_days_and_sessions() {
        let engine = ProgressionEngine::default();
        let now = Utc::now();
        let mut profile = PersonalizationProfile::new(Uuid::nil());
        profile.enter_setback(now - Duration::days(5));

        let two: Vec<_> = (1..=2).map(|d| session_at(now, d, 15.0, 10.0)).collect();
        assert!(!engine.check_recovery_completion(&profile, &two, &[], now).complete);

        let three: Vec<_> = (1..=3).map(|d| session_at(now, d, 15.0, 10.0)).collect();
        assert!(engine.check_recovery_completion(&profile, &three, &[], now).complete);
    }
}
