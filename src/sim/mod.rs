//! Simulation Engine
//!
//! Turns the projected national TPP distribution into seat-by-seat win
//! probabilities and an aggregate distribution over parliamentary
//! composition. State machine: Preparation → Iteration×N → Completion.
//!
//! Preparation validates preconditions and sizes every accumulator; a
//! failed precondition aborts before any Monte Carlo work. Each iteration
//! is a pure function of a private RNG stream plus shared read-only state,
//! which is what makes the iterations parallelizable; only Completion
//! touches shared accumulators, strictly after all iterations finish.

pub mod engine;
pub mod live;
pub mod regions;
pub mod report;
pub mod seats;

pub use engine::{SimulationEngine, SimulationInputs};
pub use regions::{Region, RegionList};
pub use report::{AggregateReport, PROBABILITY_BOUND_THRESHOLDS};
pub use seats::{BoothTally, LiveCount, Seat, SeatList};
