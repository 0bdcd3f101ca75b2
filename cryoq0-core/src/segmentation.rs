//! Run segmentation
//!
//! Walks the aligned buffers once and cuts them at every index where the
//! cryomodule leaves the steady state it was in. The pending span before a
//! break becomes a run if it lasted long enough; otherwise it is dropped.
//!
//! A missing reading never causes a break on its own: a step is detected
//! where a present reading differs from the last present reading before
//! it, so a change hidden behind a gap still splits the run. Threshold
//! checks skip missing samples.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channels::Channel;
use crate::config::SegmentationConfig;
use crate::run::Run;
use crate::session::{SessionBuffers, SessionKind};

/// What ended a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BreakReason {
    /// Heater setpoint sum changed
    HeaterStep,
    /// Gradient moved by more than the tolerance
    GradientStep,
    /// Downstream level under the floor
    LevelFloor,
    /// Valve away from the reference position
    ValveExcursion,
    /// Heater readback disagrees with the setpoint
    HeaterMismatch,
    /// Last sample of the session
    EndOfData,
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::HeaterStep => "heater step",
            Self::GradientStep => "gradient step",
            Self::LevelFloor => "level below floor",
            Self::ValveExcursion => "valve excursion",
            Self::HeaterMismatch => "heater readback mismatch",
            Self::EndOfData => "end of data",
        };
        f.write_str(text)
    }
}

/// Change at `idx` against the last present reading before it
fn stepped(buffers: &SessionBuffers, channel: Channel, idx: usize) -> Option<f64> {
    let curr = buffers.sample(channel, idx)?;
    let prev = buffers.present_before(channel, idx)?;
    Some((curr - prev).abs())
}

/// First break condition that holds at `idx`, if any
pub fn break_reason(
    buffers: &SessionBuffers,
    idx: usize,
    reference_valve_position: f64,
    kind: SessionKind,
    config: &SegmentationConfig,
) -> Option<BreakReason> {
    if stepped(buffers, Channel::HeaterSetpoint, idx).is_some_and(|d| d != 0.0) {
        return Some(BreakReason::HeaterStep);
    }

    if kind == SessionKind::Q0
        && stepped(buffers, Channel::Gradient, idx).is_some_and(|d| d > config.gradient_tolerance)
    {
        return Some(BreakReason::GradientStep);
    }

    if buffers
        .sample(Channel::DownstreamLevel, idx)
        .is_some_and(|level| level < config.level_floor)
    {
        return Some(BreakReason::LevelFloor);
    }

    if buffers
        .sample(Channel::ValvePosition, idx)
        .is_some_and(|pos| (pos - reference_valve_position).abs() > config.valve_tolerance)
    {
        return Some(BreakReason::ValveExcursion);
    }

    if let (Some(setpoint), Some(readback)) = (
        buffers.sample(Channel::HeaterSetpoint, idx),
        buffers.sample(Channel::HeaterReadback, idx),
    ) {
        if (setpoint - readback).abs() > config.heater_tolerance {
            return Some(BreakReason::HeaterMismatch);
        }
    }

    if idx + 1 == buffers.len() {
        return Some(BreakReason::EndOfData);
    }

    None
}

/// Partition the buffers into runs
///
/// A break at `i` closes the pending span as `[run_start, i − 1]` when
/// `unix_time[i] − unix_time[run_start]` reaches the minimum duration. The
/// next span starts at `i` either way.
pub fn segment(
    buffers: &SessionBuffers,
    reference_valve_position: f64,
    kind: SessionKind,
    config: &SegmentationConfig,
) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut run_start = 0;

    for idx in 0..buffers.len() {
        let Some(reason) = break_reason(buffers, idx, reference_valve_position, kind, config) else {
            continue;
        };

        let duration = buffers.unix_time[idx] - buffers.unix_time[run_start];
        if idx > run_start && duration >= config.min_run_duration_secs {
            diag_debug!(
                "Run {} [{}, {}] closed by {} after {:.0} s",
                runs.len() + 1,
                run_start,
                idx - 1,
                reason,
                duration
            );
            runs.push(Run::new(runs.len() + 1, run_start, idx - 1));
        } else if idx > run_start {
            diag_debug!("Dropped {:.0} s span at {} ({})", duration, run_start, reason);
        }

        run_start = idx;
    }

    runs
}
