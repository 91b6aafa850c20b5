//! Engine configuration.
//!
//! Loaded from `config.toml` in the platform data directory. Every section
//! has defaults, so a missing file or a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Configuration format version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// SQLite database file; defaults to `<data_dir>/mobility.db`
    pub database_path: Option<PathBuf>,
    /// Real-time fatigue detection
    pub fatigue: FatigueSettings,
    /// Progressive overload and setback handling
    pub progression: ProgressionSettings,
    /// Protocol matching and phase advancement
    pub matching: MatchingSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            database_path: None,
            fatigue: FatigueSettings::default(),
            progression: ProgressionSettings::default(),
            matching: MatchingSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("mobility.db"))
    }
}

/// Fatigue detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueSettings {
    /// Trailing analysis window in seconds
    pub window_secs: u32,
    /// Samples required inside the window before analysis runs
    pub min_samples: usize,
    /// Ring buffer capacity (1 h at a 10 s cadence)
    pub buffer_capacity: usize,
    /// Bilateral samples required for the asymmetry marker
    pub min_bilateral_samples: usize,
    pub power_decline_mild: f64,
    pub power_decline_moderate: f64,
    pub power_decline_severe: f64,
    pub cadence_cv: f64,
    pub asymmetry_change: f64,
    /// Overall power CV that alone marks force-pattern degradation
    pub power_cv: f64,
    /// Decay rate (decline per minute) at which thresholds are unscaled
    pub reference_decay_rate: f64,
    /// Maximum personalization of thresholds, as a fraction
    pub personalization_bound: f64,
}

impl Default for FatigueSettings {
    fn default() -> Self {
        Self {
            window_secs: 120,
            min_samples: 12,
            buffer_capacity: 360,
            min_bilateral_samples: 6,
            power_decline_mild: 0.10,
            power_decline_moderate: 0.20,
            power_decline_severe: 0.30,
            cadence_cv: 0.10,
            asymmetry_change: 0.10,
            power_cv: 0.35,
            reference_decay_rate: 0.01,
            personalization_bound: 0.15,
        }
    }
}

/// Progression and setback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionSettings {
    /// Sessions required in the trailing window before evaluating
    pub required_sessions: usize,
    pub trailing_days: i64,
    /// Minimum days in recovery before completion is considered
    pub recovery_min_days: i64,
    /// Sessions used for plateau regression
    pub plateau_window: usize,
    /// Plateau when both power and duration trends are below this
    pub plateau_trend_threshold: f64,
    pub duration_success_ratio: f64,
    pub power_success_ratio: f64,
    pub recovery_power_ratio: f64,
    pub resistance_step: f64,
    pub max_resistance: f64,
    pub duration_step_min: f64,
    pub max_duration_min: f64,
    /// Recent sessions compared in the decline check
    pub decline_recent_window: usize,
    /// Baseline sessions preceding the recent window
    pub decline_baseline_window: usize,
    /// Decline fractions for minor, moderate and major setbacks
    pub decline_tiers: [f64; 3],
    /// Days without a session for minor, moderate and major setbacks
    pub adherence_tiers_days: [i64; 3],
    /// Goal reduction before the severity multiplier
    pub setback_goal_reduction: f64,
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            required_sessions: 3,
            trailing_days: 7,
            recovery_min_days: 3,
            plateau_window: 6,
            plateau_trend_threshold: 0.05,
            duration_success_ratio: 0.90,
            power_success_ratio: 1.0,
            recovery_power_ratio: 0.85,
            resistance_step: 0.5,
            max_resistance: 9.0,
            duration_step_min: 2.0,
            max_duration_min: 30.0,
            decline_recent_window: 3,
            decline_baseline_window: 4,
            decline_tiers: [0.15, 0.20, 0.30],
            adherence_tiers_days: [3, 5, 7],
            setback_goal_reduction: 0.25,
        }
    }
}

/// Protocol matching settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    /// Matches below this score are dropped
    pub min_score: u8,
    /// Minimum score for automatic assignment
    pub auto_assign_score: u8,
    pub result_limit: usize,
    /// Score fall and deconditioning risk against protocol thresholds
    pub risk_based: bool,
    /// Score fatigue history and progression level
    pub personalization: bool,
    /// Sessions required before a phase can advance
    pub phase_min_sessions: usize,
    /// Fraction of the phase target duration sessions must average
    pub phase_duration_ratio: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            min_score: 30,
            auto_assign_score: 50,
            result_limit: 5,
            risk_based: true,
            personalization: true,
            phase_min_sessions: 3,
            phase_duration_ratio: 0.90,
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "providence", "MobilityCDS")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load configuration from the default location.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load configuration from a file, falling back to defaults if absent.
pub fn load_config_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    let data_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(get_data_dir);

    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(EngineConfig {
            data_dir,
            ..Default::default()
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: EngineConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = data_dir;

    Ok(config)
}

/// Save configuration to the default location.
pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save configuration to a file.
pub fn save_config_to(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.fatigue.min_samples, 12);
        assert_eq!(config.matching.min_score, 30);
        assert_eq!(config.database_path(), dir.path().join("mobility.db"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[progression]\nrecovery_min_days = 5\n\n[matching]\nrisk_based = false\n",
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.progression.recovery_min_days, 5);
        assert_eq!(config.progression.required_sessions, 3);
        assert!(!config.matching.risk_based);
        assert_eq!(config.fatigue, FatigueSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = EngineConfig::default();
        config.fatigue.window_secs = 90;
        config.database_path = Some(PathBuf::from("/var/lib/mobility/cds.db"));
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.fatigue.window_secs, 90);
        assert_eq!(loaded.database_path(), PathBuf::from("/var/lib/mobility/cds.db"));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fatigue\nwindow_secs = ").unwrap();

        assert!(matches!(load_config_from(&path), Err(ConfigError::ParseError(_))));
    }
}
