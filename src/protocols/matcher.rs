//! Protocol scoring and phase progression checks.
//!
//! Each component earns points toward its own maximum. The final score is
//! `round(earned / possible × 100)`, so disabling a component removes its
//! maximum as well as its points.

use super::types::{
    ClinicalProtocol, MatchContext, PatientProtocolAssignment, PhaseProgressCheck,
    ProtocolCriteria, ProtocolMatch,
};
use crate::metrics::stats::mean;
use crate::progression::ExerciseSession;
use crate::storage::MatchingSettings;

const DIAGNOSIS_MAX: f64 = 40.0;
const DIAGNOSIS_CODE_POINTS: f64 = 35.0;
const DIAGNOSIS_KEYWORD_POINTS: f64 = 30.0;
const CONTRAINDICATION_PENALTY: f64 = 50.0;
const AGE_MAX: f64 = 15.0;
/// Years outside the age range that still earn partial credit
const AGE_GRACE_YEARS: f64 = 5.0;
const MOBILITY_MAX: f64 = 15.0;
const MOBILITY_EXCLUDED_PENALTY: f64 = 10.0;
const FALL_RISK_MAX: f64 = 10.0;
const DECONDITIONING_MAX: f64 = 20.0;
const FATIGUE_MAX: f64 = 5.0;
const LEVEL_MAX: f64 = 10.0;
/// Shortest first-phase duration a fatigue override may propose
const MIN_OVERRIDE_MINUTES: f64 = 5.0;

/// Indication words too common to count as keywords.
const STOPWORDS: &[&str] = &[
    "with", "from", "after", "following", "patients", "patient", "acute", "and", "for", "the",
    "post", "related",
];

/// Running tally for one protocol.
#[derive(Default)]
struct Tally {
    earned: f64,
    possible: f64,
    reasons: Vec<String>,
    suggestions: Vec<String>,
}

impl Tally {
    fn add(&mut self, earned: f64, possible: f64) {
        self.earned += earned;
        self.possible += possible;
    }

    fn score(&self) -> u8 {
        if self.possible <= 0.0 {
            return 0;
        }
        (self.earned.max(0.0) / self.possible * 100.0)
            .round()
            .clamp(0.0, 100.0) as u8
    }
}

/// Scores protocols against a patient.
#[derive(Debug, Clone, Default)]
pub struct ProtocolMatcher {
    settings: MatchingSettings,
}

impl ProtocolMatcher {
    pub fn new(settings: MatchingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MatchingSettings {
        &self.settings
    }

    /// Score one protocol. Never filters; see [`Self::rank`].
    pub fn score(
        &self,
        protocol: &ClinicalProtocol,
        criteria: Option<&ProtocolCriteria>,
        ctx: &MatchContext<'_>,
    ) -> ProtocolMatch {
        let default_criteria = ProtocolCriteria::default();
        let criteria = criteria.unwrap_or(&default_criteria);
        let mut tally = Tally::default();

        score_diagnosis(protocol, ctx, &mut tally);
        let active_contraindications = contraindication_hits(protocol, ctx.comorbidities);
        if !active_contraindications.is_empty() {
            tally.earned -= CONTRAINDICATION_PENALTY;
            tally.reasons.push(format!(
                "Contraindicated: {}",
                active_contraindications.join(", ")
            ));
        }
        score_age(criteria, ctx, &mut tally);
        score_mobility(criteria, ctx, &mut tally);

        if self.settings.risk_based {
            if let Some(assessment) = ctx.assessment {
                score_fall_risk(criteria, assessment.falls.probability, &mut tally);
                score_deconditioning(criteria, assessment.deconditioning.probability, &mut tally);
            }
        }

        let mut suggested_start_phase = 0;
        let mut duration_override_min = None;
        if self.settings.personalization {
            if let Some(profile) = ctx.personalization {
                duration_override_min =
                    score_fatigue(protocol, profile.avg_fatigue_onset_minutes, &mut tally);
                suggested_start_phase =
                    score_level(protocol, profile.current_progression_level, &mut tally);
            }
        }

        ProtocolMatch {
            protocol_id: protocol.id,
            name: protocol.name.clone(),
            score: tally.score(),
            reasons: tally.reasons,
            active_contraindications,
            adjustment_suggestions: tally.suggestions,
            suggested_start_phase,
            duration_override_min,
        }
    }

    /// Score active protocols, keep those at or above `min_score`, best first.
    pub fn rank(
        &self,
        candidates: &[(ClinicalProtocol, Option<ProtocolCriteria>)],
        ctx: &MatchContext<'_>,
    ) -> Vec<ProtocolMatch> {
        let mut matches: Vec<ProtocolMatch> = candidates
            .iter()
            .filter(|(protocol, _)| protocol.is_active)
            .map(|(protocol, criteria)| self.score(protocol, criteria.as_ref(), ctx))
            .filter(|m| m.score >= self.settings.min_score)
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(self.settings.result_limit);
        matches
    }

    /// Whether the assignment's current phase is complete.
    ///
    /// Only sessions since the phase started count. The latest
    /// `phase_min_sessions` of them must average at least
    /// `phase_duration_ratio` of the phase's target duration.
    pub fn check_phase_progression(
        &self,
        assignment: &PatientProtocolAssignment,
        protocol: &ClinicalProtocol,
        sessions: &[ExerciseSession],
    ) -> PhaseProgressCheck {
        let Some(phase) = assignment.state.phase().and_then(|i| protocol.phase(i)) else {
            return PhaseProgressCheck {
                ready: false,
                sessions_counted: 0,
                avg_duration_min: None,
                required_duration_min: 0.0,
            };
        };

        let since = assignment.phase_started_at();
        let counted: Vec<f64> = sessions
            .iter()
            .filter(|s| s.started_at >= since)
            .map(|s| s.duration_min)
            .collect();

        let required = self.settings.phase_min_sessions.max(1);
        let recent = &counted[counted.len().saturating_sub(required)..];
        let avg_duration_min = mean(recent);
        let required_duration_min = phase.target_duration_min * self.settings.phase_duration_ratio;

        PhaseProgressCheck {
            ready: counted.len() >= required
                && avg_duration_min.is_some_and(|avg| avg >= required_duration_min),
            sessions_counted: counted.len(),
            avg_duration_min,
            required_duration_min,
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Distinct lower-case indication words worth matching.
fn indication_keywords(indication: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in indication
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4 && !STOPWORDS.contains(w))
    {
        if !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
        }
    }
    keywords
}

fn score_diagnosis(protocol: &ClinicalProtocol, ctx: &MatchContext<'_>, tally: &mut Tally) {
    let code_hit = protocol.diagnosis_codes.iter().find(|code| {
        let code = normalize_code(code);
        ctx.diagnosis_codes
            .iter()
            .any(|patient_code| normalize_code(patient_code) == code)
    });

    if let Some(code) = code_hit {
        tally.add(DIAGNOSIS_CODE_POINTS, DIAGNOSIS_MAX);
        tally.reasons.push(format!("Diagnosis code {} matches", code));
        return;
    }

    let keywords = indication_keywords(&protocol.indication);
    let earned = match ctx.diagnosis_text {
        Some(text) if !keywords.is_empty() => {
            let text = text.to_lowercase();
            let found = keywords.iter().filter(|k| text.contains(k.as_str())).count();
            if found > 0 {
                tally.reasons.push(format!(
                    "Diagnosis matches {} of {} indication keywords",
                    found,
                    keywords.len()
                ));
            }
            found as f64 / keywords.len() as f64 * DIAGNOSIS_KEYWORD_POINTS
        }
        _ => 0.0,
    };
    tally.add(earned, DIAGNOSIS_MAX);
}

/// Comorbidities that substring-match a contraindication, in input order.
fn contraindication_hits(protocol: &ClinicalProtocol, comorbidities: &[String]) -> Vec<String> {
    let contraindications: Vec<String> = protocol
        .contraindications
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    comorbidities
        .iter()
        .filter(|comorbidity| {
            let lower = comorbidity.trim().to_lowercase();
            !lower.is_empty()
                && contraindications
                    .iter()
                    .any(|c| lower.contains(c.as_str()) || c.contains(lower.as_str()))
        })
        .cloned()
        .collect()
}

fn score_age(criteria: &ProtocolCriteria, ctx: &MatchContext<'_>, tally: &mut Tally) {
    if criteria.min_age.is_none() && criteria.max_age.is_none() {
        tally.add(AGE_MAX, AGE_MAX);
        return;
    }

    let Some(age) = ctx.flags.age else {
        tally.add(0.0, AGE_MAX);
        return;
    };

    let below = criteria.min_age.map_or(0, |min| min.saturating_sub(age));
    let above = criteria.max_age.map_or(0, |max| age.saturating_sub(max));
    let distance = below.max(above) as f64;

    let earned = if distance == 0.0 {
        tally.reasons.push(format!("Age {} within protocol range", age));
        AGE_MAX
    } else {
        (AGE_MAX * (1.0 - distance / AGE_GRACE_YEARS)).max(0.0)
    };
    tally.add(earned, AGE_MAX);
}

fn score_mobility(criteria: &ProtocolCriteria, ctx: &MatchContext<'_>, tally: &mut Tally) {
    let mobility = ctx.flags.mobility;
    let earned = if criteria.excluded_mobility.contains(&mobility) {
        tally.reasons.push(format!("Mobility {} is excluded", mobility.as_str()));
        -MOBILITY_EXCLUDED_PENALTY
    } else if criteria.required_mobility.is_empty() || criteria.required_mobility.contains(&mobility) {
        tally.reasons.push(format!("Mobility {} fits", mobility.as_str()));
        MOBILITY_MAX
    } else {
        0.0
    };
    tally.add(earned, MOBILITY_MAX);
}

fn score_fall_risk(criteria: &ProtocolCriteria, probability: f64, tally: &mut Tally) {
    match criteria.max_fall_risk {
        Some(threshold) if probability > threshold => {
            tally.add(0.0, FALL_RISK_MAX);
            tally.suggestions.push(format!(
                "Fall risk {:.0}% exceeds protocol threshold {:.0}%; use seated setup with supervision",
                probability * 100.0,
                threshold * 100.0
            ));
        }
        _ => tally.add(FALL_RISK_MAX, FALL_RISK_MAX),
    }
}

fn score_deconditioning(criteria: &ProtocolCriteria, probability: f64, tally: &mut Tally) {
    match criteria.min_deconditioning_risk {
        Some(threshold) if probability < threshold => {
            let earned = if threshold > 0.0 {
                DECONDITIONING_MAX * (probability / threshold).clamp(0.0, 1.0)
            } else {
                0.0
            };
            tally.add(earned, DECONDITIONING_MAX);
            tally.suggestions.push(format!(
                "Deconditioning risk {:.0}% is below the {:.0}% this protocol targets; a lighter protocol may suffice",
                probability * 100.0,
                threshold * 100.0
            ));
        }
        Some(_) => {
            tally.add(DECONDITIONING_MAX, DECONDITIONING_MAX);
            tally
                .reasons
                .push("Deconditioning risk within protocol target".to_string());
        }
        None => tally.add(DECONDITIONING_MAX, DECONDITIONING_MAX),
    }
}

/// Returns a shorter first-phase duration when the patient fatigues early.
fn score_fatigue(
    protocol: &ClinicalProtocol,
    onset_minutes: Option<f64>,
    tally: &mut Tally,
) -> Option<f64> {
    let first_target = protocol.phase(0).map(|p| p.target_duration_min);

    match (onset_minutes, first_target) {
        (Some(onset), Some(target)) if onset < target => {
            let override_min = onset.floor().max(MIN_OVERRIDE_MINUTES).min(target);
            tally.add(FATIGUE_MAX * 0.6, FATIGUE_MAX);
            tally.suggestions.push(format!(
                "Fatigue typically sets in at {:.0} min; shorten phase 1 sessions to {:.0} min",
                onset, override_min
            ));
            Some(override_min)
        }
        _ => {
            tally.add(FATIGUE_MAX, FATIGUE_MAX);
            None
        }
    }
}

/// Returns the suggested start phase for the patient's level.
fn score_level(protocol: &ClinicalProtocol, level: u32, tally: &mut Tally) -> usize {
    let wanted = level.saturating_sub(1) as usize;
    let last = protocol.phases.len().saturating_sub(1);

    if wanted <= last {
        tally.add(LEVEL_MAX, LEVEL_MAX);
        if wanted > 0 {
            tally
                .reasons
                .push(format!("Progression level {} suggests starting at phase {}", level, wanted + 1));
        }
        wanted
    } else {
        tally.add(LEVEL_MAX / 2.0, LEVEL_MAX);
        tally.suggestions.push(format!(
            "Progression level {} is beyond this protocol's {} phases",
            level,
            protocol.phases.len()
        ));
        last
    }
}
