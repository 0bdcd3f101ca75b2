//! Constants used by the measurement pipeline
//!
//! - `physics`: Q0 formula, helium temperature correction and RF heat approximation
//! - `thresholds`: default segmentation tolerances and settle-time scale

pub mod physics;
pub mod thresholds;

pub use physics::*;
pub use thresholds::*;
