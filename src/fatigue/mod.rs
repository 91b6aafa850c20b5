//! Real-time fatigue detection.
//!
//! Sessions are explicit values: open one with
//! [`FatigueDetector::open_session`], feed it samples, then close it to
//! release the buffer. [`FatigueMonitor`] adds persistence and
//! [`stream::run_session`] drives a session from a channel.

pub mod detector;
pub mod monitor;
pub mod session;
pub mod stream;
pub mod types;

pub use detector::{compute_markers, resistance_reduction, FatigueDetector, MAX_RESISTANCE_REDUCTION};
pub use monitor::{FatigueMonitor, MonitorResult};
pub use session::{FatigueSession, SessionSummary};
pub use stream::run_session;
pub use types::{
    FatigueAction, FatigueDetection, FatigueError, FatigueEvent, FatigueMarkers, FatigueSeverity,
    FatigueThresholds, FatigueType, MetricSample,
};
