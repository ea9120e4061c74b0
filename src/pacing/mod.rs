//! Adaptive request pacing
//!
//! The pacing controller keeps a sliding window of request outcomes and
//! derives a target request rate from it. Every fetch attempt awaits
//! [`PacingController::wait`] before touching the network.

mod controller;

pub use controller::{settle_delay_for, OutcomeCounts, OutcomeEvent, OutcomeKind, PacingController};
