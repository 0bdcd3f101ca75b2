//! Settle-time trimming
//!
//! After a heat-load step the helium bath lags behind: intermediate
//! structures with heat capacity delay the change in dLL/dt. Each run's start
//! is advanced past that transient, roughly 25 s per watt of step.

use crate::channels::Channel;
use crate::config::SettleConfig;
use crate::run::{DegenerateReason, Run};
use crate::session::{SessionBuffers, SessionKind};

/// Approximate RF heat of a cavity at gradient `g` (W)
///
/// Quadratic in the gradient around the design point. Non-positive
/// gradients are unphysical readbacks and carry no heat.
pub fn approx_heat_from_gradient(gradient: f64, config: &SettleConfig) -> f64 {
    if gradient > 0.0 {
        (gradient / config.design_gradient).powi(2) * config.design_rf_heat
    } else {
        0.0
    }
}

/// Reading that describes the state of `run`: the first present one from
/// its start on
fn run_reading(buffers: &SessionBuffers, channel: Channel, run: &Run) -> Option<f64> {
    buffers.first_present_in(channel, run.start..=run.end)
}

fn gradient_heat(buffers: &SessionBuffers, run: &Run, config: &SettleConfig) -> f64 {
    run_reading(buffers, Channel::Gradient, run).map_or(0.0, |g| approx_heat_from_gradient(g, config))
}

/// Heat-load step (W) at the start of `runs[index]`
///
/// The first run is compared with the reference heat load, later runs with
/// the (already trimmed) start of the previous run. A reading missing at a
/// run's start is taken from the first present sample after it.
pub fn heat_step(
    buffers: &SessionBuffers,
    runs: &[Run],
    index: usize,
    reference_heat_load: f64,
    kind: SessionKind,
    config: &SettleConfig,
) -> f64 {
    let run = &runs[index];
    let heater = run_reading(buffers, Channel::HeaterSetpoint, run);

    if index == 0 {
        let electric = heater.map_or(0.0, |h| (h - reference_heat_load).abs());
        return match kind {
            SessionKind::Calibration => electric,
            SessionKind::Q0 => electric + gradient_heat(buffers, run, config),
        };
    }

    let prev = &runs[index - 1];
    let electric = match (heater, run_reading(buffers, Channel::HeaterSetpoint, prev)) {
        (Some(curr), Some(before)) => curr - before,
        _ => 0.0,
    };
    match kind {
        SessionKind::Calibration => electric.abs(),
        SessionKind::Q0 => {
            let rf = gradient_heat(buffers, run, config) - gradient_heat(buffers, prev, config);
            (electric + rf).abs()
        }
    }
}

/// Seconds to discard for a step of `step` watts
pub fn cutoff_secs(step: f64, config: &SettleConfig) -> f64 {
    (step * config.samples_per_watt).floor()
}

/// Advance every run's start past its settle transient
///
/// `end` is never moved. A run whose start reaches its end is marked
/// [`DegenerateReason::TrimmedAway`].
pub fn trim_runs(
    buffers: &SessionBuffers,
    runs: &mut [Run],
    reference_heat_load: f64,
    kind: SessionKind,
    config: &SettleConfig,
) {
    for i in 0..runs.len() {
        let step = heat_step(buffers, runs, i, reference_heat_load, kind, config);
        let cutoff = cutoff_secs(step, config);

        let run = &mut runs[i];
        let t0 = buffers.unix_time[run.start];
        let mut idx = run.start;
        while idx < run.end && buffers.unix_time[idx] - t0 < cutoff {
            idx += 1;
        }

        diag_debug!(
            "Run {}: {:.2} W step, cutoff {} s, start {} -> {}",
            run.number,
            step,
            cutoff,
            run.start,
            idx
        );
        let trimmed = idx > run.start;
        run.start = idx;

        // One-sample spans are left to the fit, which reports TooFewPoints
        if trimmed && run.start >= run.end {
            run.mark_degenerate(DegenerateReason::TrimmedAway);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn buffers(n: usize, interval: i64) -> SessionBuffers {
        let t0 = NaiveDate::from_ymd_opt(2019, 2, 25).unwrap().and_hms_opt(11, 0, 0).unwrap();
        let mut b = SessionBuffers::default();
        for i in 0..n {
            b.push_timestamp(t0 + chrono::Duration::seconds(i as i64 * interval));
        }
        b.heater_setpoint = vec![Some(48.0); n];
        b
    }

    #[test]
    fn gradient_heat_at_design_point() {
        let c = SettleConfig::default();
        assert!((approx_heat_from_gradient(16.0, &c) - 9.6).abs() < 1e-12);
        assert!((approx_heat_from_gradient(8.0, &c) - 2.4).abs() < 1e-12);
        assert_eq!(approx_heat_from_gradient(0.0, &c), 0.0);
        assert_eq!(approx_heat_from_gradient(-3.0, &c), 0.0);
    }

    #[test]
    fn cutoff_floors() {
        let c = SettleConfig::default();
        assert_eq!(cutoff_secs(1.0, &c), 25.0);
        assert_eq!(cutoff_secs(0.99, &c), 24.0);
        assert_eq!(cutoff_secs(0.0, &c), 0.0);
    }

    #[test]
    fn first_run_compares_with_reference() {
        let b = buffers(100, 1);
        let runs = vec![Run::new(1, 0, 99)];
        let c = SettleConfig::default();
        assert_eq!(heat_step(&b, &runs, 0, 44.0, SessionKind::Calibration, &c), 4.0);
        assert_eq!(heat_step(&b, &runs, 0, 52.0, SessionKind::Calibration, &c), 4.0);
    }

    #[test]
    fn q0_step_includes_rf_heat() {
        let mut b = buffers(100, 1);
        b.gradient = vec![Some(16.0); 100];
        for g in &mut b.gradient[50..] {
            *g = Some(0.0);
        }
        let runs = vec![Run::new(1, 0, 49), Run::new(2, 50, 99)];
        let c = SettleConfig::default();
        let first = heat_step(&b, &runs, 0, 48.0, SessionKind::Q0, &c);
        assert!((first - 9.6).abs() < 1e-12);
        let second = heat_step(&b, &runs, 1, 48.0, SessionKind::Q0, &c);
        assert!((second - 9.6).abs() < 1e-12);
    }

    #[test]
    fn trim_respects_time_not_samples() {
        // 10 s sampling: a 2 W step is 50 s, i.e. 5 samples
        let b = buffers(100, 10);
        let mut runs = vec![Run::new(1, 0, 99)];
        trim_runs(&b, &mut runs, 46.0, SessionKind::Calibration, &SettleConfig::default());
        assert_eq!(runs[0].start, 5);
        assert_eq!(runs[0].segment_start, 0);
        assert_eq!(runs[0].end, 99);
    }

    #[test]
    fn missing_setpoint_at_run_start_still_steps() {
        let mut b = buffers(400, 1);
        for h in &mut b.heater_setpoint[100..] {
            *h = Some(52.0);
        }
        b.heater_setpoint[100] = None;
        let mut runs = vec![Run::new(1, 0, 99), Run::new(2, 100, 399)];
        let c = SettleConfig::default();
        assert_eq!(heat_step(&b, &runs, 1, 48.0, SessionKind::Calibration, &c), 4.0);

        // 4 W step: 100 s of transient
        trim_runs(&b, &mut runs, 48.0, SessionKind::Calibration, &c);
        assert_eq!(runs[0].start, 0);
        assert_eq!(runs[1].start, 200);
    }

    #[test]
    fn single_sample_run_is_not_trimmed_away() {
        let b = buffers(10, 1);
        let mut runs = vec![Run::new(1, 4, 4)];
        trim_runs(&b, &mut runs, 48.0, SessionKind::Calibration, &SettleConfig::default());
        assert_eq!(runs[0].start, 4);
        assert_eq!(runs[0].status, crate::run::RunStatus::Pending);
    }

    #[test]
    fn trim_never_passes_end() {
        let b = buffers(40, 1);
        let mut runs = vec![Run::new(1, 0, 30)];
        trim_runs(&b, &mut runs, 0.0, SessionKind::Calibration, &SettleConfig::default());
        assert_eq!(runs[0].start, 30);
        assert_eq!(runs[0].status, crate::run::RunStatus::Degenerate(DegenerateReason::TrimmedAway));
    }
}
