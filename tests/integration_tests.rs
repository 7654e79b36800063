//! Integration tests for rust-schemaupgrade
//!
//! This file serves as the entry point for all integration tests.

#[path = "common/mod.rs"]
mod common;

#[path = "integration/plan_tests.rs"]
mod plan_tests;

#[path = "integration/scenario_tests.rs"]
mod scenario_tests;

#[path = "integration/capability_tests.rs"]
mod capability_tests;
