//! Q0 derivation
//!
//! A cavity run's dLL/dt is projected onto the cryomodule's calibration line
//! to get a total heat load. Subtracting the electric heat load leaves the RF
//! heat load, which gives Q0 through
//!
//! ```text
//! Q0 = (E · 10⁶)² / (939.3 · P_rf)
//! ```
//!
//! corrected to a 2 K bath using the helium pressure when it was recorded.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channels::Channel;
use crate::constants::physics::*;
use crate::errors::{MeasurementError, MeasurementResult};
use crate::run::Run;
use crate::session::SessionBuffers;

/// Helium bath temperature (K) from downstream pressure (Torr)
pub fn temperature_from_pressure(pressure: f64) -> f64 {
    pressure * PRESSURE_TO_TEMP_SLOPE + PRESSURE_TO_TEMP_OFFSET
}

/// Q0 before temperature correction; `None` when `rf_heat_load <= 0`
pub fn uncorrected_q0(gradient: f64, rf_heat_load: f64) -> Option<f64> {
    if rf_heat_load > 0.0 {
        Some((gradient * MV_TO_V).powi(2) / (R_OVER_Q_TIMES_LENGTH * rf_heat_load))
    } else {
        None
    }
}

/// Normalise an uncorrected Q0 measured at `temperature` to the 2 K reference
pub fn corrected_q0(uncorrected: f64, gradient: f64, temperature: f64) -> f64 {
    let c4 = gradient - Q0_CORRECTION_GRADIENT_OFFSET;
    let c7 = Q0_CORRECTION_C2 - Q0_CORRECTION_C3 * c4 + Q0_CORRECTION_C5 * c4 * c4;
    let t_ref = Q0_REFERENCE_TEMP_K;

    Q0_CORRECTION_C1
        / ((c7 / t_ref) * (Q0_CORRECTION_C6 / t_ref).exp() + Q0_CORRECTION_C1 / uncorrected
            - (c7 / temperature) * (Q0_CORRECTION_C6 / temperature).exp())
}

/// Q0 of one sample
///
/// The correction is applied only for a present, non-zero, finite pressure.
pub fn calc_q0(gradient: f64, rf_heat_load: f64, pressure: Option<f64>) -> Option<f64> {
    let q0 = uncorrected_q0(gradient, rf_heat_load)?;
    match pressure {
        Some(p) if p != 0.0 && p.is_finite() => {
            Some(corrected_q0(q0, gradient, temperature_from_pressure(p)))
        }
        _ => Some(q0),
    }
}

/// Derived figures of one fitted run of a Q0 session
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Q0RunResult {
    /// Run number
    pub run: usize,
    /// Heater run (no RF figure)
    pub heater_run: bool,
    /// dLL/dt (%/s)
    pub slope: f64,
    /// Projected total heat load (W); the electric load for heater runs
    pub total_heat_load: f64,
    /// Electric heat load over baseline (W)
    pub electric_heat_load: f64,
    /// Total minus electric (W); 0 for heater runs
    pub rf_heat_load: f64,
    /// RMS gradient over the run after substitution (MV/m)
    pub average_gradient: f64,
    /// Mean pressure over present samples (Torr)
    pub average_pressure: Option<f64>,
    /// Mean per-sample Q0; `None` for heater runs and non-positive RF load
    pub q0: Option<f64>,
    /// Samples that used the reference gradient (all of them when the
    /// gradient channel is absent)
    pub invalid_gradients: usize,
    /// Electric load minus projected load (W), heater runs only
    pub heat_adjustment: Option<f64>,
}

impl Q0RunResult {
    /// Legend text
    pub fn label(&self, reference_gradient: f64) -> String {
        if self.heater_run {
            format!("{:.2e} %/s @ {:.2} W Electric Load", self.slope, self.electric_heat_load)
        } else {
            let q0 = self.q0.map_or_else(|| "undefined".to_string(), |q| format!("{q:.2e}"));
            format!("{:.2e} %/s @ {} MV/m, Q0 {}", self.slope, reference_gradient, q0)
        }
    }

    /// The Q0, or why it is undefined
    pub fn q0_or_err(&self) -> MeasurementResult<f64> {
        self.q0.ok_or(MeasurementError::UndefinedQ0 {
            run: self.run,
            rf_heat_load: self.rf_heat_load,
        })
    }
}

/// Output of [`derive_runs`]
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRuns {
    /// One entry per fitted run, in run order
    pub results: Vec<Q0RunResult>,
    /// Mean heat adjustment of the heater runs (0 when none)
    pub average_heat_adjustment: f64,
}

/// Gradient at `idx` with invalid readings replaced
///
/// Zero, missing and non-finite readings become `reference`; negative
/// readings are kept.
fn gradient_or_reference(buffers: &SessionBuffers, idx: usize, reference: f64) -> (f64, bool) {
    match buffers.sample(Channel::Gradient, idx) {
        Some(g) if g != 0.0 && g.is_finite() => (g, false),
        _ => (reference, true),
    }
}

/// Per-run heat bookkeeping and Q0 of a fitted Q0 session
///
/// Heater runs are handled first so their mean heat adjustment can be added
/// to every RF run's projected load.
pub fn derive_runs(
    buffers: &SessionBuffers,
    runs: &[Run],
    calibration_slope: f64,
    reference_gradient: f64,
) -> MeasurementResult<DerivedRuns> {
    if calibration_slope == 0.0 || !calibration_slope.is_finite() {
        return Err(MeasurementError::CalibrationUnavailable("calibration slope is zero"));
    }

    let fitted: Vec<(&Run, f64)> = runs
        .iter()
        .filter(|r| r.is_fitted())
        .filter_map(|r| r.slope().map(|s| (r, s)))
        .collect();

    let adjustments: Vec<f64> = fitted
        .iter()
        .filter(|(r, _)| r.is_heater_run())
        .map(|(r, slope)| r.electric_heat_load - slope / calibration_slope)
        .collect();
    let average_heat_adjustment = if adjustments.is_empty() {
        0.0
    } else {
        adjustments.iter().sum::<f64>() / adjustments.len() as f64
    };

    let gradient_present = buffers.has_channel(Channel::Gradient);
    let mut results = Vec::with_capacity(fitted.len());

    for (run, slope) in fitted {
        let mut invalid_gradients = 0;
        let mut gradient_sq_sum = 0.0;
        let mut gradients = Vec::with_capacity(run.len());
        for idx in run.start..run.end {
            let (g, substituted) = gradient_or_reference(buffers, idx, reference_gradient);
            if substituted {
                invalid_gradients += 1;
            }
            gradient_sq_sum += g * g;
            gradients.push((idx, g));
        }
        let average_gradient = if gradients.is_empty() {
            reference_gradient
        } else {
            (gradient_sq_sum / gradients.len() as f64).sqrt()
        };

        let pressures: Vec<f64> = (run.start..run.end)
            .filter_map(|i| buffers.sample(Channel::Pressure, i))
            .filter(|p| p.is_finite())
            .collect();
        let average_pressure = if pressures.is_empty() {
            None
        } else {
            Some(pressures.iter().sum::<f64>() / pressures.len() as f64)
        };

        if !gradient_present {
            diag_warn!(
                "Run {}: no gradient channel, all {} points use reference gradient {} MV/m",
                run.number,
                invalid_gradients,
                reference_gradient
            );
        } else if invalid_gradients > 0 {
            diag_warn!(
                "Run {}: gradient buffer had {} invalid points (used reference gradient {} MV/m instead)",
                run.number,
                invalid_gradients,
                reference_gradient
            );
        }

        let result = if run.is_heater_run() {
            Q0RunResult {
                run: run.number,
                heater_run: true,
                slope,
                total_heat_load: run.electric_heat_load,
                electric_heat_load: run.electric_heat_load,
                rf_heat_load: 0.0,
                average_gradient,
                average_pressure,
                q0: None,
                invalid_gradients,
                heat_adjustment: Some(run.electric_heat_load - slope / calibration_slope),
            }
        } else {
            let total_heat_load = slope / calibration_slope + average_heat_adjustment;
            let rf_heat_load = total_heat_load - run.electric_heat_load;

            let q0 = if rf_heat_load > 0.0 {
                let values: Vec<f64> = gradients
                    .iter()
                    .filter_map(|&(idx, g)| {
                        calc_q0(g, rf_heat_load, buffers.sample(Channel::Pressure, idx))
                    })
                    .filter(|q| q.is_finite())
                    .collect();
                if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
            } else {
                diag_warn!(
                    "Run {}: RF heat load {:.3} W is not positive, Q0 undefined",
                    run.number,
                    rf_heat_load
                );
                None
            };

            Q0RunResult {
                run: run.number,
                heater_run: false,
                slope,
                total_heat_load,
                electric_heat_load: run.electric_heat_load,
                rf_heat_load,
                average_gradient,
                average_pressure,
                q0,
                invalid_gradients,
                heat_adjustment: None,
            }
        };

        diag_info!(
            "Run {} total heat load {:.2} W, electric {:.2} W, RF {:.2} W, Q0 {:?}",
            result.run,
            result.total_heat_load,
            result.electric_heat_load,
            result.rf_heat_load,
            result.q0
        );
        results.push(result);
    }

    Ok(DerivedRuns { results, average_heat_adjustment })
}
