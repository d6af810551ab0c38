//! The Brain
//!
//! Responsible for:
//! - Picking the best pool and applying the rebalance threshold
//! - Driving synthetic rates when running without a live vault

pub mod decision;
mod drift;

pub use decision::Decision;
pub use drift::{DriftBounds, SimulatedMarket};
