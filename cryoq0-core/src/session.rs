//! Measurement sessions
//!
//! A session is one time window over a container. Its buffers are filled by
//! the loader, then segmented, trimmed and fitted in a single pass inside
//! [`CalibrationSession::process`] or [`Q0Session::process`]. The result is
//! immutable; containers hand it out behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cache::{CalibrationKey, Q0Key};
use crate::channels::Channel;
use crate::config::MeasurementConfig;
use crate::errors::{MeasurementError, MeasurementResult};
use crate::q0::{self, Q0RunResult};
use crate::regression::{self, CalibrationFit};
use crate::run::Run;
use crate::{segmentation, settle};

/// One reading; `None` marks a missing or unparsable cell
pub type Sample = Option<f64>;

/// Calibration sessions run on a cryomodule, Q0 sessions on a cavity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SessionKind {
    /// Heater calibration of a cryomodule
    Calibration,
    /// Q0 measurement of one cavity
    Q0,
}

/// Time window and sample spacing of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
    sample_interval_secs: u32,
}

impl SessionWindow {
    /// Window from `start` to `end`; the interval must be non-zero and `end` after `start`
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        sample_interval_secs: u32,
    ) -> MeasurementResult<Self> {
        if sample_interval_secs == 0 {
            return Err(MeasurementError::InvalidConfig(
                "sample interval must be at least one second".into(),
            ));
        }
        if end <= start {
            return Err(MeasurementError::InvalidConfig(format!(
                "session end {end} is not after start {start}"
            )));
        }
        Ok(Self { start, end, sample_interval_secs })
    }

    /// Window start
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Window end
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Seconds between samples
    pub fn sample_interval_secs(&self) -> u32 {
        self.sample_interval_secs
    }

    /// floor((end − start) / interval)
    pub fn point_count(&self) -> u64 {
        let secs = (self.end - self.start).num_seconds().max(0) as u64;
        secs / u64::from(self.sample_interval_secs)
    }
}

impl fmt::Display for SessionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {} ({}s sample interval)",
            self.start, self.end, self.sample_interval_secs
        )
    }
}

/// Operator-supplied parameters of a session
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionRequest {
    /// Time window
    pub window: SessionWindow,
    /// JT valve position the session was held at (%)
    pub reference_valve_position: f64,
    /// Baseline electric heat load (W)
    pub reference_heat_load: f64,
}

impl SessionRequest {
    /// Bundle a window with its reference valve position and heat load
    pub fn new(window: SessionWindow, reference_valve_position: f64, reference_heat_load: f64) -> Self {
        Self { window, reference_valve_position, reference_heat_load }
    }
}

/// Aligned per-channel sequences of one session
///
/// Index `i` of every non-empty sequence refers to `time[i]`. A channel that
/// was not present in the export stays empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionBuffers {
    /// Wall-clock timestamps
    pub time: Vec<NaiveDateTime>,
    /// Same instants as unix seconds
    pub unix_time: Vec<f64>,
    /// JT valve position (%)
    pub valve_position: Vec<Sample>,
    /// Downstream liquid level (%)
    pub downstream_level: Vec<Sample>,
    /// Upstream liquid level (%)
    pub upstream_level: Vec<Sample>,
    /// RF gradient (MV/m)
    pub gradient: Vec<Sample>,
    /// Helium pressure (Torr)
    pub pressure: Vec<Sample>,
    /// Heater setpoint sum (W)
    pub heater_setpoint: Vec<Sample>,
    /// Heater readback sum (W)
    pub heater_readback: Vec<Sample>,
}

impl SessionBuffers {
    /// Number of sample instants
    pub fn len(&self) -> usize {
        self.time.len()
    }

    /// No samples at all
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Append one instant to the time axis
    pub fn push_timestamp(&mut self, time: NaiveDateTime) {
        self.unix_time.push(time.and_utc().timestamp() as f64);
        self.time.push(time);
    }

    /// Sequence of a channel (empty when absent)
    pub fn channel(&self, channel: Channel) -> &[Sample] {
        match channel {
            Channel::ValvePosition => &self.valve_position,
            Channel::DownstreamLevel => &self.downstream_level,
            Channel::UpstreamLevel => &self.upstream_level,
            Channel::Gradient => &self.gradient,
            Channel::Pressure => &self.pressure,
            Channel::HeaterSetpoint => &self.heater_setpoint,
            Channel::HeaterReadback => &self.heater_readback,
        }
    }

    /// Mutable sequence of a channel
    pub fn channel_mut(&mut self, channel: Channel) -> &mut Vec<Sample> {
        match channel {
            Channel::ValvePosition => &mut self.valve_position,
            Channel::DownstreamLevel => &mut self.downstream_level,
            Channel::UpstreamLevel => &mut self.upstream_level,
            Channel::Gradient => &mut self.gradient,
            Channel::Pressure => &mut self.pressure,
            Channel::HeaterSetpoint => &mut self.heater_setpoint,
            Channel::HeaterReadback => &mut self.heater_readback,
        }
    }

    /// The channel was loaded
    pub fn has_channel(&self, channel: Channel) -> bool {
        !self.channel(channel).is_empty()
    }

    /// Reading at `idx`, `None` when missing or the channel is absent
    pub fn sample(&self, channel: Channel, idx: usize) -> Sample {
        self.channel(channel).get(idx).copied().flatten()
    }

    /// Last present reading in `range`
    pub fn last_present(&self, channel: Channel, range: std::ops::RangeInclusive<usize>) -> Sample {
        let values = self.channel(channel);
        range.rev().find_map(|i| values.get(i).copied().flatten())
    }

    /// Last present reading strictly before `idx`
    pub fn present_before(&self, channel: Channel, idx: usize) -> Sample {
        let values = self.channel(channel);
        values.get(..idx).and_then(|head| head.iter().rev().find_map(|s| *s))
    }

    /// First present reading in `range`
    pub fn first_present_in(&self, channel: Channel, range: std::ops::RangeInclusive<usize>) -> Sample {
        let values = self.channel(channel);
        range.into_iter().find_map(|i| values.get(i).copied().flatten())
    }

    /// First present reading of the session
    pub fn first_present(&self, channel: Channel) -> Sample {
        self.channel(channel).iter().find_map(|s| *s)
    }

    /// Check every loaded channel has one sample per timestamp
    pub fn validate_alignment(&self) -> MeasurementResult<()> {
        let expected = self.time.len();
        if self.unix_time.len() != expected {
            return Err(MeasurementError::MisalignedBuffers {
                channel: "unix time",
                expected,
                actual: self.unix_time.len(),
            });
        }
        const ALL: [Channel; 7] = [
            Channel::ValvePosition,
            Channel::DownstreamLevel,
            Channel::UpstreamLevel,
            Channel::Gradient,
            Channel::Pressure,
            Channel::HeaterSetpoint,
            Channel::HeaterReadback,
        ];
        for channel in ALL {
            let actual = self.channel(channel).len();
            if actual != 0 && actual != expected {
                return Err(MeasurementError::MisalignedBuffers {
                    channel: channel.as_str(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

// Shared front half of both session kinds: segment, trim, fit.
fn prepare_runs(
    kind: SessionKind,
    description: &str,
    request: &SessionRequest,
    buffers: &SessionBuffers,
    config: &MeasurementConfig,
) -> MeasurementResult<Vec<Run>> {
    config.validate()?;
    buffers.validate_alignment()?;

    let mut runs = segmentation::segment(
        buffers,
        request.reference_valve_position,
        kind,
        &config.segmentation,
    );
    if runs.is_empty() {
        diag_warn!("{} has no runs to process", description);
        return Err(MeasurementError::EmptySession { session: description.to_string() });
    }

    settle::trim_runs(buffers, &mut runs, request.reference_heat_load, kind, &config.settle);
    regression::fit_runs(buffers, &mut runs, request.reference_heat_load);
    Ok(runs)
}

/// A processed heater calibration of one cryomodule
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    key: CalibrationKey,
    request: SessionRequest,
    buffers: SessionBuffers,
    runs: Vec<Run>,
    fit: CalibrationFit,
}

impl CalibrationSession {
    /// Segment, trim and fit `buffers`, then fit the calibration line
    pub fn process(
        key: CalibrationKey,
        request: SessionRequest,
        buffers: SessionBuffers,
        config: &MeasurementConfig,
    ) -> MeasurementResult<Self> {
        let description = format!("{} heater calibration {}", key.ids, request.window);
        let mut runs = prepare_runs(SessionKind::Calibration, &description, &request, &buffers, config)?;

        let fit = regression::fit_calibration(&runs)?;
        diag_info!(
            "{}: calibration slope {:.3e} %/(s*W), intercept adjust = {:.3} W",
            description,
            fit.slope,
            fit.heat_adjustment
        );
        for run in runs.iter_mut().filter(|r| r.is_fitted()) {
            run.electric_heat_load += fit.heat_adjustment;
        }

        Ok(Self { key, request, buffers, runs, fit })
    }

    /// Identity of this session
    pub fn key(&self) -> &CalibrationKey {
        &self.key
    }

    /// Parameters the session was built from
    pub fn request(&self) -> &SessionRequest {
        &self.request
    }

    /// Loaded buffers
    pub fn buffers(&self) -> &SessionBuffers {
        &self.buffers
    }

    /// All runs, degenerate ones included
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Runs that took part in the calibration fit
    pub fn fitted_runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.iter().filter(|r| r.is_fitted())
    }

    /// Calibration line
    pub fn calibration_fit(&self) -> &CalibrationFit {
        &self.fit
    }

    /// m_cal, dLL/dt per watt (%/(s·W))
    pub fn calibration_slope(&self) -> f64 {
        self.fit.slope
    }

    /// Heat offset added to every electric heat load (W)
    pub fn heat_adjustment(&self) -> f64 {
        self.fit.heat_adjustment
    }

    /// Slopes of the fitted runs
    pub fn run_slopes(&self) -> Vec<f64> {
        self.fitted_runs().filter_map(Run::slope).collect()
    }

    /// Adjusted electric heat loads of the fitted runs
    pub fn run_electric_heat_loads(&self) -> Vec<f64> {
        self.fitted_runs().map(|r| r.electric_heat_load).collect()
    }

    /// Legend text of the calibration line
    pub fn label(&self) -> String {
        format!("Calibration Fit:  {:.2e} %/(s*W)", self.fit.slope)
    }
}

/// A processed Q0 measurement of one cavity
#[derive(Debug, Clone)]
pub struct Q0Session {
    key: Q0Key,
    request: SessionRequest,
    reference_gradient: f64,
    calibration: Arc<CalibrationSession>,
    buffers: SessionBuffers,
    runs: Vec<Run>,
    results: Vec<Q0RunResult>,
    average_heat_adjustment: f64,
}

impl Q0Session {
    /// Segment, trim and fit `buffers`, then derive per-run Q0
    pub fn process(
        key: Q0Key,
        request: SessionRequest,
        reference_gradient: f64,
        calibration: Arc<CalibrationSession>,
        buffers: SessionBuffers,
        config: &MeasurementConfig,
    ) -> MeasurementResult<Self> {
        let description = format!("{} Q0 measurement {}", key.ids, request.window);
        let runs = prepare_runs(SessionKind::Q0, &description, &request, &buffers, config)?;

        let derived = q0::derive_runs(
            &buffers,
            &runs,
            calibration.calibration_slope(),
            reference_gradient,
        )?;

        Ok(Self {
            key,
            request,
            reference_gradient,
            calibration,
            buffers,
            runs,
            results: derived.results,
            average_heat_adjustment: derived.average_heat_adjustment,
        })
    }

    /// Identity of this session
    pub fn key(&self) -> &Q0Key {
        &self.key
    }

    /// Parameters the session was built from
    pub fn request(&self) -> &SessionRequest {
        &self.request
    }

    /// Gradient substituted for invalid readings (MV/m)
    pub fn reference_gradient(&self) -> f64 {
        self.reference_gradient
    }

    /// Calibration this measurement is projected onto
    pub fn calibration(&self) -> &Arc<CalibrationSession> {
        &self.calibration
    }

    /// Loaded buffers
    pub fn buffers(&self) -> &SessionBuffers {
        &self.buffers
    }

    /// All runs, degenerate ones included
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Per-run results of the fitted runs
    pub fn results(&self) -> &[Q0RunResult] {
        &self.results
    }

    /// Results of the RF runs only
    pub fn rf_results(&self) -> impl Iterator<Item = &Q0RunResult> {
        self.results.iter().filter(|r| !r.heater_run)
    }

    /// Mean heat adjustment of the session's heater runs (0 when none)
    pub fn average_heat_adjustment(&self) -> f64 {
        self.average_heat_adjustment
    }

    /// Total heat loads of the RF runs
    pub fn run_heat_loads(&self) -> Vec<f64> {
        self.rf_results().map(|r| r.total_heat_load).collect()
    }

    /// RF runs projected back onto the calibration line
    pub fn adjusted_run_slopes(&self) -> Vec<f64> {
        let m = self.calibration.calibration_slope();
        self.rf_results().map(|r| m * r.total_heat_load).collect()
    }

    /// Q0 of the first RF run with a defined value
    pub fn q0(&self) -> Option<f64> {
        self.rf_results().find_map(|r| r.q0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 2, 25).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn point_count_floors() {
        let window = SessionWindow::new(at(11, 0), at(11, 10), 7).unwrap();
        assert_eq!(window.point_count(), 600 / 7);
    }

    #[test]
    fn window_rejects_bad_ranges() {
        assert!(SessionWindow::new(at(11, 0), at(11, 0), 1).is_err());
        assert!(SessionWindow::new(at(11, 0), at(12, 0), 0).is_err());
    }

    #[test]
    fn absent_channel_reads_missing() {
        let mut buffers = SessionBuffers::default();
        buffers.push_timestamp(at(11, 0));
        buffers.downstream_level.push(Some(90.0));
        assert_eq!(buffers.sample(Channel::DownstreamLevel, 0), Some(90.0));
        assert_eq!(buffers.sample(Channel::Pressure, 0), None);
        assert!(!buffers.has_channel(Channel::Pressure));
        assert!(buffers.validate_alignment().is_ok());
    }

    #[test]
    fn misaligned_channel_is_reported() {
        let mut buffers = SessionBuffers::default();
        buffers.push_timestamp(at(11, 0));
        buffers.push_timestamp(at(11, 1));
        buffers.valve_position.push(Some(17.0));
        let err = buffers.validate_alignment().unwrap_err();
        assert!(matches!(err, MeasurementError::MisalignedBuffers { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn last_present_skips_gaps() {
        let mut buffers = SessionBuffers::default();
        buffers.heater_readback = vec![Some(1.0), Some(2.0), None, None];
        assert_eq!(buffers.last_present(Channel::HeaterReadback, 0..=3), Some(2.0));
        assert_eq!(buffers.last_present(Channel::HeaterReadback, 2..=3), None);
        assert_eq!(buffers.first_present(Channel::HeaterReadback), Some(1.0));
    }

    #[test]
    fn unix_time_tracks_timestamps() {
        let mut buffers = SessionBuffers::default();
        buffers.push_timestamp(at(0, 0));
        buffers.push_timestamp(at(0, 1));
        assert_eq!(buffers.unix_time[1] - buffers.unix_time[0], 60.0);
    }
}
