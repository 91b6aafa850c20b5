//! Alerts raised by the fatigue, progression and protocol engines.

pub mod types;

pub use types::{Alert, AlertPriority, AlertType};
