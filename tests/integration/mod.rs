//! Integration test modules.

mod clinical_scenarios_test;
mod concurrent_assignment_test;
mod fatigue_stream_test;
mod progression_flow_test;
