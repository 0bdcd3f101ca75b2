//! Common test utilities for integration tests
//!
//! Synthetic sessions whose liquid level follows a known calibration line:
//!
//! ```text
//! dLL/dt = m · (heater − reference + rf) + b
//! ```
//!
//! The level responds instantly, so every run fits its step's slope exactly
//! regardless of how much settle trimming removes.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};

use cryoq0_core::{CryomoduleChannels, SessionBuffers, SessionRequest, SessionWindow};

pub mod scenarios;

/// Calibration slope used by the generators (%/(s·W))
pub const CAL_SLOPE: f64 = -2.0e-4;

/// Calibration intercept used by the generators (%/s)
pub const CAL_INTERCEPT: f64 = -1.0e-4;

/// Reference heat load of every generated session (W)
pub const REFERENCE_HEAT: f64 = 10.0;

/// Reference valve position (%)
pub const REFERENCE_VALVE: f64 = 17.5;

/// Session start
pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 2, 25).unwrap().and_hms_opt(11, 25, 0).unwrap()
}

/// One steady state
#[derive(Debug, Clone, Copy)]
pub struct Step {
    /// Length (s)
    pub secs: u32,
    /// Heater setpoint sum (W)
    pub heater: f64,
    /// Gradient readback (MV/m)
    pub gradient: f64,
    /// True RF heat deposited (W)
    pub rf_heat: f64,
}

impl Step {
    /// Heater-only step
    pub fn heater(secs: u32, heater: f64) -> Self {
        Self { secs, heater, gradient: 0.0, rf_heat: 0.0 }
    }

    /// RF step at baseline heater power
    pub fn rf(secs: u32, gradient: f64, rf_heat: f64) -> Self {
        Self { secs, heater: REFERENCE_HEAT, gradient, rf_heat }
    }
}

/// Generator of aligned session buffers
#[derive(Debug, Clone)]
pub struct SyntheticSession {
    pub interval_secs: u32,
    pub initial_level: f64,
    pub with_gradient: bool,
    pub pressure: Option<f64>,
    pub steps: Vec<Step>,
}

impl SyntheticSession {
    /// Four heater steps 0/3/6/9 W over baseline, 2000 s each
    pub fn calibration() -> Self {
        Self {
            interval_secs: 1,
            initial_level: 92.0,
            with_gradient: false,
            pressure: None,
            steps: vec![
                Step::heater(2000, 10.0),
                Step::heater(2000, 13.0),
                Step::heater(2000, 16.0),
                Step::heater(2000, 19.0),
            ],
        }
    }

    /// RF run at 16 MV/m depositing 9.6 W, then a 3 W heater run
    pub fn q0() -> Self {
        Self {
            interval_secs: 1,
            initial_level: 92.0,
            with_gradient: true,
            pressure: None,
            steps: vec![Step::rf(2000, 16.0, 9.6), Step::heater(2000, 13.0)],
        }
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.iter().map(|s| (s.secs / self.interval_secs) as usize).sum()
    }

    /// Per-sample step index
    fn step_of_sample(&self) -> Vec<Step> {
        self.steps
            .iter()
            .flat_map(|s| std::iter::repeat(*s).take((s.secs / self.interval_secs) as usize))
            .collect()
    }

    pub fn window(&self) -> SessionWindow {
        let end = t0() + chrono::Duration::seconds(self.len() as i64 * self.interval_secs as i64);
        SessionWindow::new(t0(), end, self.interval_secs).unwrap()
    }

    pub fn request(&self) -> SessionRequest {
        SessionRequest::new(self.window(), REFERENCE_VALVE, REFERENCE_HEAT)
    }

    /// dLL/dt while `step` is applied
    pub fn slope_of(step: &Step) -> f64 {
        CAL_SLOPE * (step.heater - REFERENCE_HEAT + step.rf_heat) + CAL_INTERCEPT
    }

    pub fn buffers(&self) -> SessionBuffers {
        let dt = self.interval_secs as f64;
        let mut b = SessionBuffers::default();
        let mut level = self.initial_level;

        for (j, step) in self.step_of_sample().iter().enumerate() {
            b.push_timestamp(t0() + chrono::Duration::seconds(j as i64 * self.interval_secs as i64));
            b.downstream_level.push(Some(level));
            b.upstream_level.push(Some(level - 3.0));
            b.valve_position.push(Some(REFERENCE_VALVE));
            b.heater_setpoint.push(Some(step.heater));
            b.heater_readback.push(Some(step.heater));
            if self.with_gradient {
                b.gradient.push(Some(step.gradient));
            }
            if let Some(p) = self.pressure {
                b.pressure.push(Some(p));
            }
            level += dt * Self::slope_of(step);
        }
        b
    }

    /// Archiver-style CSV with one column per heater
    pub fn to_csv(&self, channels: &CryomoduleChannels, gradient_channel: Option<&str>) -> String {
        let buffers = self.buffers();
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec![
            "Date".to_string(),
            channels.valve.clone(),
            channels.ds_level.clone(),
            channels.us_level.clone(),
        ];
        if let Some(g) = gradient_channel {
            header.push(g.to_string());
        }
        if self.pressure.is_some() {
            header.push(channels.ds_pressure.clone());
        }
        header.extend(channels.heater_setpoints.iter().cloned());
        header.extend(channels.heater_readbacks.iter().cloned());
        writer.write_record(&header).unwrap();

        let heaters = channels.heater_setpoints.len() as f64;
        for i in 0..buffers.len() {
            let mut row = vec![
                buffers.time[i].format("%Y-%m-%d-%H:%M:%S").to_string(),
                buffers.valve_position[i].unwrap().to_string(),
                buffers.downstream_level[i].unwrap().to_string(),
                buffers.upstream_level[i].unwrap().to_string(),
            ];
            if gradient_channel.is_some() {
                row.push(buffers.gradient.get(i).copied().flatten().unwrap_or(0.0).to_string());
            }
            if let Some(p) = self.pressure {
                row.push(p.to_string());
            }
            let share = buffers.heater_setpoint[i].unwrap() / heaters;
            row.extend(std::iter::repeat(share.to_string()).take(2 * heaters as usize));
            writer.write_record(&row).unwrap();
        }

        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }
}

pub fn assert_close(actual: f64, expected: f64, rel: f64) {
    let scale = expected.abs().max(1e-30);
    assert!(
        ((actual - expected) / scale).abs() <= rel,
        "expected {expected}, got {actual} (relative tolerance {rel})"
    );
}
