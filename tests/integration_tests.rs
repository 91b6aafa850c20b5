//! Integration test entry point.

mod integration;
