//! Cryogenic readiness checks and heater control
//!
//! A measurement only starts once the downstream liquid level is back at
//! its fill target and the JT valve is locked at the reference position.
//! The probes here answer that once; [`wait_until`] turns a probe into a
//! bounded wait.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use cryoq0_core::constants::LEVEL_FILL_TARGET;
use cryoq0_core::regression::fit_line;
use cryoq0_core::{Container, CryomoduleChannels};

use crate::{ConnectorError, ControlSystem, Result};

/// Allowed distance from the fill target (%)
pub const LEVEL_READY_TOLERANCE: f64 = 1.0;

/// JT valve operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JtMode {
    /// Position held at the setpoint
    Manual,
    /// Regulating between `CV_MIN` and `CV_MAX`
    Automatic,
}

impl JtMode {
    /// Mode from the raw mode point value ("0" is manual)
    pub fn from_point_value(value: &str) -> Self {
        if value.trim() == "0" {
            Self::Manual
        } else {
            Self::Automatic
        }
    }
}

/// Sum of the current heater readbacks (W)
pub fn reference_heat_load<C, K>(control: &C, container: &K) -> Result<f64>
where
    C: ControlSystem + ?Sized,
    K: Container + ?Sized,
{
    container
        .heater_readback_channels()
        .iter()
        .try_fold(0.0, |sum, point| Ok(sum + control.get_f64(point)?))
}

/// Reference JT valve position from a recent history window
///
/// Fits the downstream level against sample index. A level whose slope
/// magnitude is within `flatness` counts as settled, and the mean valve
/// position rounded to 0.1 % is returned. `None` when the level is still
/// moving or there is not enough history.
pub fn reference_valve_position(levels: &[f64], valve_positions: &[f64], flatness: f64) -> Option<f64> {
    if valve_positions.is_empty() {
        return None;
    }

    let points: Vec<(f64, f64)> = levels.iter().enumerate().map(|(i, &l)| (i as f64, l)).collect();
    let fit = fit_line(&points).ok()?;
    if fit.slope.abs() > flatness {
        debug!("Liquid level still moving ({:.3e} %/sample)", fit.slope);
        return None;
    }

    let mean = valve_positions.iter().sum::<f64>() / valve_positions.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

/// Downstream level within [`LEVEL_READY_TOLERANCE`] of the fill target
pub fn liquid_level_ready<C: ControlSystem + ?Sized>(control: &C, channels: &CryomoduleChannels) -> Result<bool> {
    let level = control.get_f64(&channels.ds_level)?;
    Ok((LEVEL_FILL_TARGET - level).abs() <= LEVEL_READY_TOLERANCE)
}

/// JT valve locked at `desired` (%)
///
/// Manual mode must hold the setpoint at `desired`; automatic mode must
/// have both regulation limits pinned to it.
pub fn valve_locked<C: ControlSystem + ?Sized>(control: &C, channels: &CryomoduleChannels, desired: f64) -> Result<bool> {
    match JtMode::from_point_value(&control.get(&channels.jt_mode)?) {
        JtMode::Manual => Ok(control.get_f64(&channels.jt_position_setpoint)? == desired),
        JtMode::Automatic => Ok(control.get_f64(&channels.cv_min)? == desired
            && control.get_f64(&channels.cv_max)? == desired),
    }
}

/// Poll `probe` every `poll` until it answers true
///
/// Gives up with [`ConnectorError::Timeout`] after `attempts` negative
/// answers. Probe errors end the wait immediately.
pub fn wait_until<P>(what: &str, mut probe: P, poll: Duration, attempts: u32) -> Result<()>
where
    P: FnMut() -> Result<bool>,
{
    for attempt in 1..=attempts {
        if probe()? {
            debug!("{what} after {attempt} attempt(s)");
            return Ok(());
        }
        if attempt < attempts {
            thread::sleep(poll);
        }
    }
    Err(ConnectorError::Timeout { what: what.to_string(), attempts })
}

/// Wait for the level to refill, then for the JT valve to lock at `desired`
pub fn wait_for_cryo<C: ControlSystem + ?Sized>(
    control: &C,
    channels: &CryomoduleChannels,
    desired: f64,
    poll: Duration,
    attempts: u32,
) -> Result<()> {
    info!("Waiting for downstream liquid level to be {LEVEL_FILL_TARGET}%");
    wait_until("downstream liquid level", || liquid_level_ready(control, channels), poll, attempts)?;

    info!("Waiting for JT valve to be locked at {desired}");
    wait_until("JT valve lock", || valve_locked(control, channels, desired), poll, attempts)?;
    info!("JT valve locked");
    Ok(())
}

/// Step every heater setpoint by `per_heater_delta` W, one watt at a time
///
/// Each one-watt step of each heater is followed by `settle` so the cryo
/// plant sees a gradual change.
pub fn walk_heaters<C: ControlSystem + ?Sized>(
    control: &C,
    channels: &CryomoduleChannels,
    per_heater_delta: i32,
    settle: Duration,
) -> Result<()> {
    let step = f64::from(per_heater_delta.signum());

    for _ in 0..per_heater_delta.unsigned_abs() {
        for point in &channels.heater_setpoints {
            let current = control.get_f64(point)?;
            control.set(point, &(current + step).to_string())?;
            thread::sleep(settle);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryControlSystem;
    use cryoq0_core::{Cryomodule, CryomoduleId};

    fn channels() -> CryomoduleChannels {
        CryomoduleChannels::new(CryomoduleId::new(12, 2))
    }

    #[test]
    fn settled_level_gives_rounded_mean_valve() {
        let levels = vec![92.0; 100];
        let valves: Vec<f64> = (0..100).map(|i| 17.0 + f64::from(i % 3) * 0.1).collect();
        assert_eq!(reference_valve_position(&levels, &valves, 1e-5), Some(17.1));
    }

    #[test]
    fn falling_level_has_no_reference() {
        let levels: Vec<f64> = (0..100).map(|i| 92.0 - 0.01 * f64::from(i)).collect();
        assert_eq!(reference_valve_position(&levels, &[17.5; 100], 1e-5), None);
        assert_eq!(reference_valve_position(&[92.0], &[17.5], 1e-5), None);
        assert_eq!(reference_valve_position(&[92.0; 10], &[], 1e-5), None);
    }

    #[test]
    fn level_readiness_band() {
        let ch = channels();
        let control = MemoryControlSystem::new();

        control.set(&ch.ds_level, "94.0").unwrap();
        assert!(liquid_level_ready(&control, &ch).unwrap());
        control.set(&ch.ds_level, "91.5").unwrap();
        assert!(!liquid_level_ready(&control, &ch).unwrap());
    }

    #[test]
    fn manual_mode_locks_on_setpoint() {
        let ch = channels();
        let control = MemoryControlSystem::new();
        control.set(&ch.jt_mode, "0").unwrap();
        control.set(&ch.jt_position_setpoint, "17.5").unwrap();

        assert!(valve_locked(&control, &ch, 17.5).unwrap());
        assert!(!valve_locked(&control, &ch, 18.0).unwrap());
    }

    #[test]
    fn automatic_mode_needs_both_limits() {
        let ch = channels();
        let control = MemoryControlSystem::new();
        control.set(&ch.jt_mode, "1").unwrap();
        control.set(&ch.cv_min, "17.5").unwrap();
        control.set(&ch.cv_max, "40").unwrap();
        assert!(!valve_locked(&control, &ch, 17.5).unwrap());

        control.set(&ch.cv_max, "17.5").unwrap();
        assert!(valve_locked(&control, &ch, 17.5).unwrap());
    }

    #[test]
    fn wait_is_bounded() {
        let mut calls = 0;
        let err = wait_until("nothing", || { calls += 1; Ok(false) }, Duration::ZERO, 3).unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, ConnectorError::Timeout { attempts: 3, .. }));
    }

    #[test]
    fn wait_for_cryo_follows_scripted_level() {
        let ch = channels();
        let control = MemoryControlSystem::new();
        control.script(&ch.ds_level, ["85", "90", "92.5"]);
        control.set(&ch.jt_mode, "0").unwrap();
        control.set(&ch.jt_position_setpoint, "17.5").unwrap();

        wait_for_cryo(&control, &ch, 17.5, Duration::ZERO, 5).unwrap();
        assert!(wait_for_cryo(&control, &ch, 20.0, Duration::ZERO, 2).is_err());
    }

    #[test]
    fn heaters_walk_in_unit_steps() {
        let cm = Cryomodule::new(CryomoduleId::new(12, 2));
        let ch = cm.point_names();
        let control = MemoryControlSystem::new();
        for (sp, rb) in ch.heater_setpoints.iter().zip(&ch.heater_readbacks) {
            control.set(sp, "1.25").unwrap();
            control.set(rb, "1.25").unwrap();
        }

        assert!((reference_heat_load(&control, &cm).unwrap() - 10.0).abs() < 1e-12);

        walk_heaters(&control, ch, -2, Duration::ZERO).unwrap();
        for sp in &ch.heater_setpoints {
            assert!((control.get_f64(sp).unwrap() + 0.75).abs() < 1e-12);
        }
        // 2 steps for each of 8 heaters, on top of the 16 initial writes
        assert_eq!(control.write_count(), 16 + 16);
    }

    #[test]
    fn missing_readback_fails_reference_load() {
        let cm = Cryomodule::new(CryomoduleId::new(12, 2));
        let control = MemoryControlSystem::new();
        assert!(matches!(reference_heat_load(&control, &cm), Err(ConnectorError::UnknownPoint(_))));
    }
}
