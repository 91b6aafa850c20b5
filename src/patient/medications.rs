//! Medication class recognition.
//!
//! Medication names are matched against fixed token sets by
//! case-insensitive substring, so "Metoprolol tartrate 25mg" and
//! "METOPROLOL" both resolve to [`MedicationClass::BetaBlocker`].

use serde::{Deserialize, Serialize};

/// Closed set of medication classes that change the exercise prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicationClass {
    BetaBlocker,
    RateControl,
    Diuretic,
    Sedating,
    Insulin,
    Anticoagulant,
    Antiparkinsonian,
    Corticosteroid,
}

impl MedicationClass {
    /// All classes in evaluation order.
    pub const ALL: [MedicationClass; 8] = [
        MedicationClass::BetaBlocker,
        MedicationClass::RateControl,
        MedicationClass::Diuretic,
        MedicationClass::Sedating,
        MedicationClass::Insulin,
        MedicationClass::Anticoagulant,
        MedicationClass::Antiparkinsonian,
        MedicationClass::Corticosteroid,
    ];

    /// Lower-case name fragments identifying this class.
    pub fn tokens(&self) -> &'static [&'static str] {
        match self {
            MedicationClass::BetaBlocker => &[
                "metoprolol",
                "atenolol",
                "carvedilol",
                "bisoprolol",
                "propranolol",
                "labetalol",
                "nebivolol",
                "sotalol",
            ],
            MedicationClass::RateControl => &["diltiazem", "verapamil", "digoxin", "amiodarone"],
            MedicationClass::Diuretic => &[
                "furosemide",
                "lasix",
                "torsemide",
                "bumetanide",
                "hydrochlorothiazide",
                "chlorthalidone",
                "spironolactone",
                "metolazone",
            ],
            MedicationClass::Sedating => &[
                "lorazepam",
                "diazepam",
                "alprazolam",
                "midazolam",
                "clonazepam",
                "zolpidem",
                "quetiapine",
                "haloperidol",
                "olanzapine",
                "trazodone",
                "diphenhydramine",
                "oxycodone",
                "hydromorphone",
                "morphine",
                "fentanyl",
                "tramadol",
            ],
            MedicationClass::Insulin => &[
                "insulin",
                "glargine",
                "lispro",
                "aspart",
                "detemir",
                "glipizide",
                "glyburide",
            ],
            MedicationClass::Anticoagulant => &[
                "heparin",
                "enoxaparin",
                "warfarin",
                "apixaban",
                "rivaroxaban",
                "dabigatran",
                "edoxaban",
                "fondaparinux",
            ],
            MedicationClass::Antiparkinsonian => &[
                "carbidopa",
                "levodopa",
                "sinemet",
                "pramipexole",
                "ropinirole",
                "rasagiline",
                "selegiline",
                "amantadine",
            ],
            MedicationClass::Corticosteroid => &[
                "prednisone",
                "prednisolone",
                "methylprednisolone",
                "dexamethasone",
                "hydrocortisone",
            ],
        }
    }

    /// Stable tag used in rationale and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MedicationClass::BetaBlocker => "beta_blocker",
            MedicationClass::RateControl => "rate_control",
            MedicationClass::Diuretic => "diuretic",
            MedicationClass::Sedating => "sedating",
            MedicationClass::Insulin => "insulin",
            MedicationClass::Anticoagulant => "anticoagulant",
            MedicationClass::Antiparkinsonian => "antiparkinsonian",
            MedicationClass::Corticosteroid => "corticosteroid",
        }
    }

    /// Whether a single medication name belongs to this class.
    pub fn matches(&self, medication: &str) -> bool {
        let lower = medication.to_lowercase();
        self.tokens().iter().any(|token| lower.contains(token))
    }
}

impl std::fmt::Display for MedicationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a medication list into the distinct classes present, in
/// [`MedicationClass::ALL`] order.
pub fn classify_medications<S: AsRef<str>>(medications: &[S]) -> Vec<MedicationClass> {
    MedicationClass::ALL
        .iter()
        .copied()
        .filter(|class| medications.iter().any(|med| class.matches(med.as_ref())))
        .collect()
}
