//! Forward Projector
//!
//! Stochastically extends the aggregated trend past its horizon to a target
//! date: a Student-t initial offset around the trend endpoint followed by a
//! mean-reverting random walk with Gaussian daily noise, doubled inside the
//! campaign window. Aggregates iterations into a per-day mean/SD series.

pub mod projector;

pub use projector::{ForwardProjector, Projection, ProjectionInputs};
