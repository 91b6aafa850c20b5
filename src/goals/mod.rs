//! Therapy goals module.
//!
//! Tracks per-patient power, duration and resistance targets, including
//! temporary reductions during setback recovery.

pub mod manager;
pub mod types;

pub use manager::{GoalError, GoalManager};
pub use types::{active_goal, GoalMetric, GoalStatus, TherapyGoal};
