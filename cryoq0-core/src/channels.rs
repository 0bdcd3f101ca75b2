//! Control-system point identifiers of a cryomodule
//!
//! Every channel name is derived from the cryomodule's JLab number. The SLAC
//! number only appears in display names and file names.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::CAVITIES_PER_CRYOMODULE;

/// Summed heater setpoint column written by the export adapter
pub const HEATER_SETPOINT_SUM_HEADER: &str = "Electric Heat Load Setpoint";

/// Summed heater readback column written by the export adapter
pub const HEATER_READBACK_SUM_HEADER: &str = "Electric Heat Load Readback";

/// The two numbering schemes of a cryomodule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CryomoduleId {
    /// SLAC numbering (display and file names)
    pub slac: u16,
    /// JLab numbering (control-system point names)
    pub jlab: u16,
}

impl CryomoduleId {
    /// Pair of identifiers
    pub const fn new(slac: u16, jlab: u16) -> Self {
        Self { slac, jlab }
    }
}

impl fmt::Display for CryomoduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CM{}", self.slac)
    }
}

/// Aligned sequences of a session, as consumed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Channel {
    /// JT valve position (%)
    ValvePosition,
    /// Downstream liquid level (%)
    DownstreamLevel,
    /// Upstream liquid level (%)
    UpstreamLevel,
    /// Cavity RF gradient (MV/m)
    Gradient,
    /// Downstream helium pressure (Torr)
    Pressure,
    /// Sum of heater setpoints (W)
    HeaterSetpoint,
    /// Sum of heater readbacks (W)
    HeaterReadback,
}

impl Channel {
    /// Short name for diagnostics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValvePosition => "valve position",
            Self::DownstreamLevel => "downstream level",
            Self::UpstreamLevel => "upstream level",
            Self::Gradient => "gradient",
            Self::Pressure => "pressure",
            Self::HeaterSetpoint => "heater setpoint",
            Self::HeaterReadback => "heater readback",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point identifiers exposed by one cryomodule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryomoduleChannels {
    /// Identifiers the names were derived from
    pub ids: CryomoduleId,
    /// Downstream helium pressure
    pub ds_pressure: String,
    /// JT valve mode (0 = manual)
    pub jt_mode: String,
    /// JT valve position setpoint (manual mode)
    pub jt_position_setpoint: String,
    /// Downstream liquid level
    pub ds_level: String,
    /// Upstream liquid level
    pub us_level: String,
    /// JT regulation upper limit
    pub cv_max: String,
    /// JT regulation lower limit
    pub cv_min: String,
    /// JT valve position readback
    pub valve: String,
    /// Heater setpoints, cavity 1 first
    pub heater_setpoints: Vec<String>,
    /// Heater readbacks, cavity 1 first
    pub heater_readbacks: Vec<String>,
}

impl CryomoduleChannels {
    /// Derive every point name from the JLab number
    pub fn new(ids: CryomoduleId) -> Self {
        let cm = ids.jlab;
        let (heater_setpoints, heater_readbacks): (Vec<String>, Vec<String>) = (1..=CAVITIES_PER_CRYOMODULE)
            .map(|cav| {
                (
                    format!("CHTR:CM0{cm}:1{cav}55:HV:POWER_SETPT"),
                    format!("CHTR:CM0{cm}:1{cav}55:HV:POWER"),
                )
            })
            .unzip();

        Self {
            ids,
            ds_pressure: format!("CPT:CM0{cm}:2302:DS:PRESS"),
            jt_mode: format!("CPV:CM0{cm}:3001:JT:MODE"),
            jt_position_setpoint: format!("CPV:CM0{cm}:3001:JT:POS_SETPT"),
            ds_level: format!("CLL:CM0{cm}:2301:DS:LVL"),
            us_level: format!("CLL:CM0{cm}:2601:US:LVL"),
            cv_max: format!("CPID:CM0{cm}:3001:JT:CV_MAX"),
            cv_min: format!("CPID:CM0{cm}:3001:JT:CV_MIN"),
            valve: format!("CPID:CM0{cm}:3001:JT:CV_VALUE"),
            heater_setpoints,
            heater_readbacks,
        }
    }

    /// Channels acquired for a calibration session
    pub fn acquisition_channels(&self) -> Vec<String> {
        let mut out = vec![self.valve.clone(), self.ds_level.clone(), self.us_level.clone()];
        out.extend(self.heater_setpoints.iter().cloned());
        out.extend(self.heater_readbacks.iter().cloned());
        out
    }
}

/// RF gradient readback of one cavity
pub fn cavity_gradient_channel(ids: CryomoduleId, cavity: u8) -> String {
    format!("ACCL:L1B:0{}{}0:GACT", ids.jlab, cavity)
}
