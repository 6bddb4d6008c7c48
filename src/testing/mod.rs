//! Testing support for the forecaster
//!
//! Provides:
//! - Deterministic scenario generation with a known underlying trend
//! - Synthetic poll series per pollster with controllable house bias

pub mod generators;

pub use generators::ScenarioGenerator;
