//! Default Thresholds for Run Segmentation and Settle Trimming
//!
//! These are the defaults of [`SegmentationConfig`](crate::config::SegmentationConfig)
//! and [`SettleConfig`](crate::config::SettleConfig).

/// Maximum JT valve deviation from the reference position (%).
pub const VALVE_POSITION_TOLERANCE: f64 = 2.0;

/// Maximum gradient change between consecutive samples (MV/m).
pub const GRADIENT_TOLERANCE: f64 = 0.7;

/// Maximum readback/setpoint disagreement of the heater sum (W).
pub const HEATER_TOLERANCE: f64 = 1.0;

/// Downstream liquid level below which data is unusable (%).
///
/// Source: level sensor loses linearity under ~66 % on the 2301 probe
pub const LEVEL_LOWER_LIMIT: f64 = 66.0;

/// Shortest run worth fitting (seconds).
pub const MIN_RUN_DURATION_SECS: f64 = 750.0;

/// Samples contaminated per watt of heat-load step.
///
/// Empirical, measured at 1 s sampling.
pub const SETTLE_SAMPLES_PER_WATT: f64 = 25.0;

/// Number of cavities (and heaters) in a cryomodule.
pub const CAVITIES_PER_CRYOMODULE: u8 = 8;

/// Liquid level the fill controller targets before a measurement (%).
pub const LEVEL_FILL_TARGET: f64 = 93.0;
