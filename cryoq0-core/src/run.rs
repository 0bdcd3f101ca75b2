//! Runs: contiguous steady-state slices of a session

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channels::Channel;
use crate::errors::{MeasurementError, MeasurementResult};
use crate::regression::LinearFit;
use crate::session::SessionBuffers;

/// Why a run was left out of aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DegenerateReason {
    /// Settle trimming consumed every sample
    TrimmedAway,
    /// Fewer than two usable level samples
    TooFewPoints,
    /// All samples share one timestamp
    FlatTime,
    /// No heater setpoint or readback inside the run
    MissingHeaterData,
}

impl fmt::Display for DegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TrimmedAway => "trimmed away by settle time",
            Self::TooFewPoints => "too few level samples to fit",
            Self::FlatTime => "no time spread to fit",
            Self::MissingHeaterData => "heater data missing",
        };
        f.write_str(text)
    }
}

/// Fit state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RunStatus {
    /// Segmented, not yet fitted
    Pending,
    /// Line fitted, heat loads assigned
    Fitted,
    /// Excluded from aggregation
    Degenerate(DegenerateReason),
}

/// A contiguous index range believed to hold one steady heat-load state
///
/// `start..end` is the fit range. Heater loads are read at `end`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Run {
    /// 1-based position in the session
    pub number: usize,
    /// First sample (after settle trimming)
    pub start: usize,
    /// Last sample of the segment
    pub end: usize,
    /// Start as emitted by segmentation
    pub segment_start: usize,
    /// dLL/dt line, present once fitted
    pub fit: Option<LinearFit>,
    /// Fit state
    pub status: RunStatus,
    /// Electric heat load over baseline, including the session heat adjustment (W)
    pub electric_heat_load: f64,
    /// Heater setpoint over the reference heat load (W)
    pub nominal_heat_load: f64,
}

impl Run {
    /// New pending run over `[start, end]`
    pub fn new(number: usize, start: usize, end: usize) -> Self {
        Self {
            number,
            start,
            end,
            segment_start: start,
            fit: None,
            status: RunStatus::Pending,
            electric_heat_load: 0.0,
            nominal_heat_load: 0.0,
        }
    }

    /// Exclude the run from aggregation
    pub fn mark_degenerate(&mut self, reason: DegenerateReason) {
        diag_warn!("Run {} is degenerate: {}", self.number, reason);
        self.fit = None;
        self.status = RunStatus::Degenerate(reason);
    }

    /// Line fitted and heat loads assigned
    pub fn is_fitted(&self) -> bool {
        self.status == RunStatus::Fitted
    }

    /// The fitted line, or why there is none
    pub fn fitted(&self) -> MeasurementResult<&LinearFit> {
        match (&self.status, &self.fit) {
            (RunStatus::Fitted, Some(fit)) => Ok(fit),
            (RunStatus::Degenerate(reason), _) => {
                Err(MeasurementError::DegenerateRun { run: self.number, reason: *reason })
            }
            _ => Err(MeasurementError::DegenerateRun {
                run: self.number,
                reason: DegenerateReason::TooFewPoints,
            }),
        }
    }

    /// dLL/dt (%/s)
    pub fn slope(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.slope)
    }

    /// The heater setpoint differed from the reference heat load
    pub fn is_heater_run(&self) -> bool {
        self.nominal_heat_load != 0.0
    }

    /// Samples in the fit range
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Trimming left nothing to fit
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elapsed seconds from `start` to `end`
    pub fn duration_secs(&self, buffers: &SessionBuffers) -> f64 {
        match (buffers.unix_time.get(self.start), buffers.unix_time.get(self.end)) {
            (Some(a), Some(b)) => b - a,
            _ => 0.0,
        }
    }

    /// Read heater sums at the run end
    ///
    /// Electric load is the readback at `end` over the session's first
    /// readback. Nominal load is the setpoint at `end` over the reference.
    pub(crate) fn assign_heat_loads(
        &mut self,
        buffers: &SessionBuffers,
        reference_heat_load: f64,
    ) -> Result<(), DegenerateReason> {
        let readback_end = buffers.last_present(Channel::HeaterReadback, self.start..=self.end);
        let readback_base = buffers.first_present(Channel::HeaterReadback);
        let setpoint_end = buffers.last_present(Channel::HeaterSetpoint, self.start..=self.end);

        match (readback_end, readback_base, setpoint_end) {
            (Some(end), Some(base), Some(setpoint)) => {
                self.electric_heat_load = end - base;
                self.nominal_heat_load = setpoint - reference_heat_load;
                Ok(())
            }
            _ => Err(DegenerateReason::MissingHeaterData),
        }
    }

    /// Legend text for a heater run
    pub fn heater_label(&self) -> Option<String> {
        self.slope().map(|slope| {
            format!("{:.2e} %/s @ {:.2} W Electric Load", slope, self.electric_heat_load)
        })
    }
}
