//! Clinical alert types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What raised the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Fatigue,
    Setback,
    RecoveryComplete,
    Plateau,
    Progression,
    ProtocolAssigned,
    ProtocolAdvanced,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Fatigue => "fatigue",
            AlertType::Setback => "setback",
            AlertType::RecoveryComplete => "recovery_complete",
            AlertType::Plateau => "plateau",
            AlertType::Progression => "progression",
            AlertType::ProtocolAssigned => "protocol_assigned",
            AlertType::ProtocolAdvanced => "protocol_advanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fatigue" => Some(AlertType::Fatigue),
            "setback" => Some(AlertType::Setback),
            "recovery_complete" => Some(AlertType::RecoveryComplete),
            "plateau" => Some(AlertType::Plateau),
            "progression" => Some(AlertType::Progression),
            "protocol_assigned" => Some(AlertType::ProtocolAssigned),
            "protocol_advanced" => Some(AlertType::ProtocolAdvanced),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Medium => "medium",
            AlertPriority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(AlertPriority::Low),
            "medium" => Some(AlertPriority::Medium),
            "high" => Some(AlertPriority::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An alert row for the care team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub message: String,
    /// Whether a clinician must act on it
    pub action_required: bool,
    /// Structured context (trigger metrics, severity, ids)
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        patient_id: Uuid,
        alert_type: AlertType,
        priority: AlertPriority,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            alert_type,
            priority,
            message: message.into(),
            action_required: false,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_action_required(mut self) -> Self {
        self.action_required = true;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let alert = Alert::new(
            Uuid::new_v4(),
            AlertType::Setback,
            AlertPriority::High,
            "Major setback",
        )
        .with_action_required()
        .with_metadata(json!({"clinician_consult": true}));

        assert!(alert.action_required);
        assert_eq!(alert.metadata["clinician_consult"], json!(true));
    }

    #[test]
    fn test_priority_order() {
        assert!(AlertPriority::High > AlertPriority::Medium);
        assert!(AlertPriority::Medium > AlertPriority::Low);
    }
}
