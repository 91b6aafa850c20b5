//! Storage module for database and configuration.

pub mod alert_store;
pub mod config;
pub mod database;
pub mod fatigue_store;
pub mod patient_store;
pub mod personalization_store;
pub mod protocol_store;
pub mod schema;
pub mod session_store;

pub use alert_store::AlertStore;
pub use config::{
    load_config, load_config_from, ConfigError, EngineConfig, FatigueSettings, MatchingSettings,
    ProgressionSettings,
};
pub use database::{immediate_transaction, Database, DatabaseError};
pub use fatigue_store::FatigueStore;
pub use patient_store::{AssessmentStore, PatientStore};
pub use personalization_store::PersonalizationStore;
pub use protocol_store::ProtocolStore;
pub use session_store::SessionStore;
