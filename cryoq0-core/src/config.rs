//! Tunable thresholds for segmentation and settle trimming
//!
//! Every threshold the pipeline uses lives here rather than in module-level
//! statics, so a test can move one boundary without touching the others.
//!
//! ```rust
//! use cryoq0_core::{MeasurementConfig, SegmentationConfig};
//!
//! let config = MeasurementConfig::default()
//!     .with_segmentation(SegmentationConfig::default().with_min_run_duration(50.0));
//! assert!(config.validate().is_ok());
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::{physics, thresholds};
use crate::errors::{MeasurementError, MeasurementResult};

/// Break conditions of the run segmenter
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SegmentationConfig {
    /// Allowed valve deviation from the reference position (%)
    pub valve_tolerance: f64,

    /// Allowed sample-to-sample gradient change (MV/m), cavity sessions only
    pub gradient_tolerance: f64,

    /// Allowed heater readback vs setpoint disagreement (W)
    pub heater_tolerance: f64,

    /// Downstream level floor (%)
    pub level_floor: f64,

    /// Minimum run duration (s)
    pub min_run_duration_secs: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            valve_tolerance: thresholds::VALVE_POSITION_TOLERANCE,
            gradient_tolerance: thresholds::GRADIENT_TOLERANCE,
            heater_tolerance: thresholds::HEATER_TOLERANCE,
            level_floor: thresholds::LEVEL_LOWER_LIMIT,
            min_run_duration_secs: thresholds::MIN_RUN_DURATION_SECS,
        }
    }
}

impl SegmentationConfig {
    /// Set the valve tolerance
    pub fn with_valve_tolerance(mut self, tolerance: f64) -> Self {
        self.valve_tolerance = tolerance;
        self
    }

    /// Set the gradient tolerance
    pub fn with_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.gradient_tolerance = tolerance;
        self
    }

    /// Set the heater tolerance
    pub fn with_heater_tolerance(mut self, tolerance: f64) -> Self {
        self.heater_tolerance = tolerance;
        self
    }

    /// Set the level floor
    pub fn with_level_floor(mut self, floor: f64) -> Self {
        self.level_floor = floor;
        self
    }

    /// Set the minimum run duration
    pub fn with_min_run_duration(mut self, secs: f64) -> Self {
        self.min_run_duration_secs = secs;
        self
    }

    /// Reject negative or non-finite thresholds
    pub fn validate(&self) -> MeasurementResult<()> {
        let fields = [
            ("valve_tolerance", self.valve_tolerance),
            ("gradient_tolerance", self.gradient_tolerance),
            ("heater_tolerance", self.heater_tolerance),
            ("min_run_duration_secs", self.min_run_duration_secs),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(MeasurementError::InvalidConfig(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if !self.level_floor.is_finite() {
            return Err(MeasurementError::InvalidConfig(format!(
                "level_floor must be finite, got {}",
                self.level_floor
            )));
        }
        Ok(())
    }
}

/// Settle-time trimming parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SettleConfig {
    /// Samples discarded per watt of heat-load step
    pub samples_per_watt: f64,

    /// Design gradient of the RF heat approximation (MV/m)
    pub design_gradient: f64,

    /// RF heat at the design gradient (W)
    pub design_rf_heat: f64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            samples_per_watt: thresholds::SETTLE_SAMPLES_PER_WATT,
            design_gradient: physics::DESIGN_GRADIENT_MV_M,
            design_rf_heat: physics::DESIGN_RF_HEAT_W,
        }
    }
}

impl SettleConfig {
    /// Set the settle scale factor
    pub fn with_samples_per_watt(mut self, samples: f64) -> Self {
        self.samples_per_watt = samples;
        self
    }

    /// Set the design point of the RF heat approximation
    pub fn with_design_point(mut self, gradient: f64, rf_heat: f64) -> Self {
        self.design_gradient = gradient;
        self.design_rf_heat = rf_heat;
        self
    }

    /// Reject a non-positive design gradient or a negative scale
    pub fn validate(&self) -> MeasurementResult<()> {
        if !self.samples_per_watt.is_finite() || self.samples_per_watt < 0.0 {
            return Err(MeasurementError::InvalidConfig(format!(
                "samples_per_watt must be a finite non-negative number, got {}",
                self.samples_per_watt
            )));
        }
        if !(self.design_gradient.is_finite() && self.design_gradient > 0.0) {
            return Err(MeasurementError::InvalidConfig(format!(
                "design_gradient must be positive, got {}",
                self.design_gradient
            )));
        }
        if !self.design_rf_heat.is_finite() || self.design_rf_heat < 0.0 {
            return Err(MeasurementError::InvalidConfig(format!(
                "design_rf_heat must be a finite non-negative number, got {}",
                self.design_rf_heat
            )));
        }
        Ok(())
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MeasurementConfig {
    /// Segmentation thresholds
    pub segmentation: SegmentationConfig,

    /// Settle trimming parameters
    pub settle: SettleConfig,
}

impl MeasurementConfig {
    /// Replace the segmentation thresholds
    pub fn with_segmentation(mut self, segmentation: SegmentationConfig) -> Self {
        self.segmentation = segmentation;
        self
    }

    /// Replace the settle parameters
    pub fn with_settle(mut self, settle: SettleConfig) -> Self {
        self.settle = settle;
        self
    }

    /// Validate both halves
    pub fn validate(&self) -> MeasurementResult<()> {
        self.segmentation.validate()?;
        self.settle.validate()
    }

    /// Parse a JSON document; omitted fields keep their defaults
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> MeasurementResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_instrument_values() {
        let config = MeasurementConfig::default();
        assert_eq!(config.segmentation.valve_tolerance, 2.0);
        assert_eq!(config.segmentation.gradient_tolerance, 0.7);
        assert_eq!(config.segmentation.level_floor, 66.0);
        assert_eq!(config.segmentation.min_run_duration_secs, 750.0);
        assert_eq!(config.settle.samples_per_watt, 25.0);
        assert_eq!(config.settle.design_gradient, 16.0);
        assert_eq!(config.settle.design_rf_heat, 9.6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let bad = SegmentationConfig::default().with_valve_tolerance(-1.0);
        assert!(matches!(bad.validate(), Err(MeasurementError::InvalidConfig(_))));

        let bad = SettleConfig::default().with_design_point(0.0, 9.6);
        assert!(bad.validate().is_err());

        let bad = SegmentationConfig::default().with_min_run_duration(f64::NAN);
        assert!(bad.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_keeps_defaults() {
        let config = MeasurementConfig::from_json(
            r#"{ "segmentation": { "min_run_duration_secs": 50.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.segmentation.min_run_duration_secs, 50.0);
        assert_eq!(config.segmentation.valve_tolerance, 2.0);
        assert_eq!(config.settle, SettleConfig::default());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn invalid_json_config_is_rejected() {
        let result = MeasurementConfig::from_json(r#"{ "settle": { "design_gradient": -3 } }"#);
        assert!(matches!(result, Err(MeasurementError::InvalidConfig(_))));
        assert!(MeasurementConfig::from_json("not json").is_err());
    }
}
