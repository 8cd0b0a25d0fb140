//! Test module for scenario, determinism and property tests.
//!
//! This module exercises the engines together through the event bus:
//! - **Integration tests**: Full consumption, growth and containment scenarios
//! - **Determinism tests**: Same seed produces identical worlds
//! - **Property tests**: Level thresholds, energy conservation, range checks
//! - **Helper functions**: Entity factories shared with the unit tests
//!
//! # Test Structure
//!
//! - `integration.rs`: End-to-end scenarios
//! - `determinism.rs`: Replay checks
//! - `properties.rs`: `proptest` invariants
//! - `helpers.rs`: Test setup utilities and factory functions

mod determinism;
pub mod helpers;

// Re-export for convenience
pub use helpers::*;
