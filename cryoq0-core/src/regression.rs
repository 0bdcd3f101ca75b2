//! Least-squares fits
//!
//! Two fits are made per calibration: one line per run (downstream level
//! against unix time, slope = dLL/dt) and one line through all the runs'
//! (electric heat load, dLL/dt) pairs.
//!
//! Unix timestamps are around 1.5e9 s while the level moves by a few percent,
//! so sums are accumulated around the means to keep the normal equations
//! well conditioned.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channels::Channel;
use crate::errors::{MeasurementError, MeasurementResult};
use crate::run::{DegenerateReason, Run, RunStatus};
use crate::session::SessionBuffers;

/// Ordinary least-squares line
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinearFit {
    /// dy/dx
    pub slope: f64,
    /// y at x = 0
    pub intercept: f64,
    /// Coefficient of determination
    pub r_squared: f64,
    /// Points used
    pub points: usize,
}

impl LinearFit {
    /// y on the fitted line
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit `y = slope·x + intercept` through `points`
pub fn fit_line(points: &[(f64, f64)]) -> Result<LinearFit, DegenerateReason> {
    let n = points.len();
    if n < 2 {
        return Err(DegenerateReason::TooFewPoints);
    }

    let nf = n as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / nf;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / nf;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx == 0.0 || !sxx.is_finite() {
        return Err(DegenerateReason::FlatTime);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    // A flat response is fitted exactly
    let r_squared = if syy == 0.0 { 1.0 } else { (sxy * sxy) / (sxx * syy) };

    Ok(LinearFit { slope, intercept, r_squared, points: n })
}

/// Fit every pending run and assign its heat loads
///
/// Missing level samples are skipped. Runs already marked degenerate by
/// trimming are left alone.
pub fn fit_runs(buffers: &SessionBuffers, runs: &mut [Run], reference_heat_load: f64) {
    for run in runs.iter_mut().filter(|r| r.status == RunStatus::Pending) {
        if let Err(reason) = run.assign_heat_loads(buffers, reference_heat_load) {
            run.mark_degenerate(reason);
            continue;
        }

        let points: Vec<(f64, f64)> = (run.start..run.end)
            .filter_map(|i| {
                buffers
                    .sample(Channel::DownstreamLevel, i)
                    .map(|level| (buffers.unix_time[i], level))
            })
            .collect();

        match fit_line(&points) {
            Ok(fit) => {
                diag_info!("Run {} R^2: {:.6}", run.number, fit.r_squared);
                run.fit = Some(fit);
                run.status = RunStatus::Fitted;
            }
            Err(reason) => run.mark_degenerate(reason),
        }
    }
}

/// Calibration line through the runs' (heat load, dLL/dt) pairs
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationFit {
    /// m_cal (%/(s·W))
    pub slope: f64,
    /// b_cal (%/s)
    pub intercept: f64,
    /// Negated x-intercept, b_cal / m_cal (W)
    pub heat_adjustment: f64,
    /// R² of the calibration line
    pub r_squared: f64,
    /// Runs used
    pub runs: usize,
}

impl CalibrationFit {
    /// Heat load (W) that produces `slope` on this line, before adjustment
    pub fn heat_load_for_slope(&self, slope: f64) -> f64 {
        (slope - self.intercept) / self.slope
    }
}

/// Fit the calibration line over the fitted runs
///
/// Needs at least two fitted runs at distinct heat loads and a non-zero
/// resulting slope.
pub fn fit_calibration(runs: &[Run]) -> MeasurementResult<CalibrationFit> {
    let points: Vec<(f64, f64)> = runs
        .iter()
        .filter(|r| r.is_fitted())
        .filter_map(|r| r.slope().map(|s| (r.electric_heat_load, s)))
        .collect();

    if points.len() < 2 {
        return Err(MeasurementError::CalibrationUnavailable(
            "fewer than two fitted heater runs",
        ));
    }

    let line = fit_line(&points).map_err(|_| {
        MeasurementError::CalibrationUnavailable("all runs share one heat load")
    })?;

    if line.slope == 0.0 || !line.slope.is_finite() {
        return Err(MeasurementError::CalibrationUnavailable("flat calibration line"));
    }

    Ok(CalibrationFit {
        slope: line.slope,
        intercept: line.intercept,
        heat_adjustment: line.intercept / line.slope,
        r_squared: line.r_squared,
        runs: line.points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_line_at_unix_scale() {
        let t0 = 1_551_093_900.0;
        let points: Vec<_> = (0..1000)
            .map(|i| {
                let t = t0 + i as f64;
                (t, 90.0 - 2.0e-4 * (t - t0))
            })
            .collect();
        let fit = fit_line(&points).unwrap();
        assert!((fit.slope + 2.0e-4).abs() < 1e-12);
        assert!((fit.predict(t0) - 90.0).abs() < 1e-6);
        assert!(fit.r_squared > 0.999_999);
        assert_eq!(fit.points, 1000);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(fit_line(&[]), Err(DegenerateReason::TooFewPoints));
        assert_eq!(fit_line(&[(1.0, 2.0)]), Err(DegenerateReason::TooFewPoints));
        assert_eq!(fit_line(&[(1.0, 2.0), (1.0, 3.0)]), Err(DegenerateReason::FlatTime));
    }

    #[test]
    fn flat_level_fits_exactly() {
        let fit = fit_line(&[(0.0, 5.0), (1.0, 5.0), (2.0, 5.0)]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r_squared, 1.0);
    }

    fn fitted(number: usize, heat: f64, slope: f64) -> Run {
        let mut run = Run::new(number, 0, 10);
        run.electric_heat_load = heat;
        run.fit = Some(LinearFit { slope, intercept: 0.0, r_squared: 1.0, points: 10 });
        run.status = RunStatus::Fitted;
        run
    }

    #[test]
    fn calibration_heat_adjustment() {
        let (m, b) = (-2.0e-4, -1.0e-4);
        let runs: Vec<_> = [0.0, 3.0, 6.0, 9.0]
            .iter()
            .enumerate()
            .map(|(i, &x)| fitted(i + 1, x, m * x + b))
            .collect();
        let fit = fit_calibration(&runs).unwrap();
        assert!((fit.slope - m).abs() < 1e-12);
        assert!((fit.intercept - b).abs() < 1e-12);
        assert!((fit.heat_adjustment - 0.5).abs() < 1e-9);
        assert!((fit.heat_load_for_slope(m * 4.0 + b) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn calibration_needs_spread() {
        let runs = vec![fitted(1, 3.0, -1e-4)];
        assert!(matches!(fit_calibration(&runs), Err(MeasurementError::CalibrationUnavailable(_))));

        let runs = vec![fitted(1, 3.0, -1e-4), fitted(2, 3.0, -2e-4)];
        assert!(fit_calibration(&runs).is_err());

        let runs = vec![fitted(1, 3.0, -1e-4), fitted(2, 6.0, -1e-4)];
        assert!(fit_calibration(&runs).is_err());
    }

    #[test]
    fn degenerate_runs_are_skipped() {
        let mut runs = vec![fitted(1, 0.0, -1e-4), fitted(2, 3.0, -7e-4), fitted(3, 6.0, -13e-4)];
        runs[0].mark_degenerate(DegenerateReason::TrimmedAway);
        let fit = fit_calibration(&runs).unwrap();
        assert_eq!(fit.runs, 2);
        assert!((fit.slope + 2e-4).abs() < 1e-12);
    }
}
