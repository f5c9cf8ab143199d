//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::path::PathBuf;
use std::time::Duration;
use wirecast::config::EngineConfig;
use wirecast::Evaluator;

/// Generous deadline so a hung run fails the test instead of the suite
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Evaluator with default settings and the test deadline
pub fn evaluator() -> Evaluator {
    let mut config = EngineConfig::default();
    config.evaluation.timeout_ms = test_timeout().as_millis() as u64;
    Evaluator::new(&config)
}

/// Path of a file under `tests/fixtures`
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Read a fixture file to a string
pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture(name))
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", name, e))
}
