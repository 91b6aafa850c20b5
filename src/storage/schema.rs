//! Database schema definitions.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Patient profiles (raw record, JSON)
CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    profile_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Risk assessments (append-only)
CREATE TABLE IF NOT EXISTS risk_assessments (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    assessed_at TEXT NOT NULL,
    highest_level TEXT NOT NULL,
    assessment_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_risk_assessments_patient ON risk_assessments(patient_id, assessed_at);

-- Clinical protocols
CREATE TABLE IF NOT EXISTS clinical_protocols (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    indication TEXT NOT NULL,
    contraindications_json TEXT NOT NULL DEFAULT '[]',
    diagnosis_codes_json TEXT NOT NULL DEFAULT '[]',
    phases_json TEXT NOT NULL DEFAULT '[]',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

-- Protocol matching criteria (at most one row per protocol)
CREATE TABLE IF NOT EXISTS protocol_criteria (
    protocol_id TEXT PRIMARY KEY REFERENCES clinical_protocols(id) ON DELETE CASCADE,
    min_age INTEGER,
    max_age INTEGER,
    required_mobility_json TEXT NOT NULL DEFAULT '[]',
    excluded_mobility_json TEXT NOT NULL DEFAULT '[]',
    max_fall_risk REAL,
    min_deconditioning_risk REAL
);

-- Patient protocol assignments
CREATE TABLE IF NOT EXISTS patient_protocol_assignments (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    protocol_id TEXT NOT NULL REFERENCES clinical_protocols(id),
    status TEXT NOT NULL,
    current_phase INTEGER,
    assigned_at TEXT NOT NULL,
    progression_date TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assignments_patient ON patient_protocol_assignments(patient_id);

-- At most one active assignment per patient
CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_single_active
    ON patient_protocol_assignments(patient_id) WHERE status = 'active';

-- Personalization (one mutable row per patient)
CREATE TABLE IF NOT EXISTS personalization_profiles (
    patient_id TEXT PRIMARY KEY,
    current_progression_level INTEGER NOT NULL DEFAULT 1 CHECK (current_progression_level >= 1),
    days_at_current_level INTEGER NOT NULL DEFAULT 0,
    consecutive_successful_sessions INTEGER NOT NULL DEFAULT 0,
    in_setback_recovery INTEGER NOT NULL DEFAULT 0,
    setback_start_date TEXT,
    pre_setback_level INTEGER,
    avg_fatigue_onset_minutes REAL,
    fatigue_decay_rate REAL,
    level_started_at TEXT NOT NULL,
    last_progression_date TEXT,
    updated_at TEXT NOT NULL
);

-- Fatigue events (append-only)
CREATE TABLE IF NOT EXISTS fatigue_events (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    detected_at TEXT NOT NULL,
    fatigue_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    trigger_metrics_json TEXT NOT NULL,
    action_taken TEXT NOT NULL,
    resistance_reduction REAL,
    elapsed_minutes REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fatigue_events_session ON fatigue_events(session_id);
CREATE INDEX IF NOT EXISTS idx_fatigue_events_patient ON fatigue_events(patient_id, detected_at);

-- Alerts
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    priority TEXT NOT NULL,
    message TEXT NOT NULL,
    action_required INTEGER NOT NULL DEFAULT 0,
    metadata TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_patient ON alerts(patient_id, created_at);

-- Therapy goals
CREATE TABLE IF NOT EXISTS therapy_goals (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    metric TEXT NOT NULL,
    target_value REAL NOT NULL,
    current_value REAL,
    pre_setback_target REAL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_therapy_goals_patient ON therapy_goals(patient_id, status);

-- Completed exercise sessions
CREATE TABLE IF NOT EXISTS exercise_sessions (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    duration_min REAL NOT NULL,
    avg_power REAL NOT NULL,
    avg_rpm REAL NOT NULL,
    resistance REAL NOT NULL,
    samples_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_exercise_sessions_patient ON exercise_sessions(patient_id, started_at);
"#;

/// SQL for tracking schema version.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;
