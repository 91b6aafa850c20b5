//! Clinical protocol types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::state::{AssignmentState, TransitionError};
use crate::patient::{MobilityCategory, PatientFeatureFlags, PersonalizationProfile};
use crate::risk::RiskAssessment;
use crate::storage::DatabaseError;

/// Protocol lookup and assignment errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Protocol not found: {0}")]
    NotFound(Uuid),

    #[error("Protocol {id} is malformed: {reason}")]
    Malformed { id: Uuid, reason: String },

    #[error("No active assignment for patient {0}")]
    NoActiveAssignment(Uuid),

    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Database error: {0}")]
    Database(String),
}

impl ProtocolError {
    /// Expected misses, as opposed to bad data or failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProtocolError::NotFound(_) | ProtocolError::NoActiveAssignment(_)
        )
    }
}

impl From<rusqlite::Error> for ProtocolError {
    fn from(err: rusqlite::Error) -> Self {
        ProtocolError::Database(err.to_string())
    }
}

impl From<DatabaseError> for ProtocolError {
    fn from(err: DatabaseError) -> Self {
        ProtocolError::Database(err.to_string())
    }
}

/// One ordered stage of a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolPhase {
    pub phase: u32,
    /// e.g. "2x daily"
    pub frequency: String,
    pub target_duration_min: f64,
    pub resistance: f64,
    pub rpm: f64,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub progression_criteria: Vec<String>,
    #[serde(default)]
    pub monitoring_params: Vec<String>,
    #[serde(default)]
    pub stop_criteria: Vec<String>,
}

/// A multi-phase clinical protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalProtocol {
    pub id: Uuid,
    pub name: String,
    /// Free-text indication, used for keyword matching
    pub indication: String,
    #[serde(default)]
    pub contraindications: Vec<String>,
    /// ICD-10 codes the protocol targets
    #[serde(default)]
    pub diagnosis_codes: Vec<String>,
    pub phases: Vec<ProtocolPhase>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ClinicalProtocol {
    pub fn phase(&self, index: usize) -> Option<&ProtocolPhase> {
        self.phases.get(index)
    }
}

/// Matching criteria attached to a protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolCriteria {
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    /// Empty means any mobility fits
    pub required_mobility: Vec<MobilityCategory>,
    pub excluded_mobility: Vec<MobilityCategory>,
    /// Fall probability above which the protocol needs adjustment
    pub max_fall_risk: Option<f64>,
    /// Deconditioning probability the protocol is designed for
    pub min_deconditioning_risk: Option<f64>,
}

/// A patient-protocol link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProtocolAssignment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub protocol_id: Uuid,
    pub state: AssignmentState,
    pub assigned_at: DateTime<Utc>,
    /// Last phase advancement
    pub progression_date: Option<DateTime<Utc>>,
}

impl PatientProtocolAssignment {
    pub fn new(patient_id: Uuid, protocol_id: Uuid, state: AssignmentState) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            protocol_id,
            state,
            assigned_at: Utc::now(),
            progression_date: None,
        }
    }

    /// Sessions on or after this instant count toward the current phase.
    pub fn phase_started_at(&self) -> DateTime<Utc> {
        self.progression_date
            .map(|p| p.max(self.assigned_at))
            .unwrap_or(self.assigned_at)
    }
}

/// Everything the matcher knows about a patient.
#[derive(Debug, Clone)]
pub struct MatchContext<'a> {
    pub flags: &'a PatientFeatureFlags,
    pub comorbidities: &'a [String],
    pub diagnosis_codes: &'a [String],
    pub diagnosis_text: Option<&'a str>,
    pub assessment: Option<&'a RiskAssessment>,
    pub personalization: Option<&'a PersonalizationProfile>,
}

impl<'a> MatchContext<'a> {
    pub fn new(flags: &'a PatientFeatureFlags) -> Self {
        Self {
            flags,
            comorbidities: &[],
            diagnosis_codes: &[],
            diagnosis_text: None,
            assessment: None,
            personalization: None,
        }
    }
}

/// A scored protocol candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMatch {
    pub protocol_id: Uuid,
    pub name: String,
    /// 0-100
    pub score: u8,
    pub reasons: Vec<String>,
    /// Comorbidities that hit a protocol contraindication
    pub active_contraindications: Vec<String>,
    pub adjustment_suggestions: Vec<String>,
    pub suggested_start_phase: usize,
    /// Shorter first-phase duration for patients who fatigue early
    pub duration_override_min: Option<f64>,
}

/// Phase progression check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseProgressCheck {
    pub ready: bool,
    pub sessions_counted: usize,
    pub avg_duration_min: Option<f64>,
    pub required_duration_min: f64,
}
