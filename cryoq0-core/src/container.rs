//! Containers: cryomodules and their cavities
//!
//! A [`Cryomodule`] owns its eight [`Cavity`] values and its calibration
//! sessions. Each cavity shares the parent's channel set and owns its own Q0
//! sessions, so cavities of one cryomodule never contend for a cache.

use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cache::{CalibrationKey, Q0Key, SessionCache};
use crate::channels::{cavity_gradient_channel, Channel, CryomoduleChannels, CryomoduleId};
use crate::config::MeasurementConfig;
use crate::constants::CAVITIES_PER_CRYOMODULE;
use crate::errors::{MeasurementError, MeasurementResult};
use crate::loader::ChannelLayout;
use crate::session::{CalibrationSession, Q0Session, SessionBuffers, SessionRequest, SessionWindow};

/// Closed set of container variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContainerKind {
    /// A whole cryomodule
    Cryomodule,
    /// One cavity, by number (1-based)
    Cavity(u8),
}

/// Capabilities shared by cryomodules and cavities
pub trait Container {
    /// Variant tag
    fn kind(&self) -> ContainerKind;

    /// Display name
    fn name(&self) -> String;

    /// Identifiers of the (parent) cryomodule
    fn ids(&self) -> CryomoduleId;

    /// Point identifiers to acquire for a session
    fn channels(&self) -> Vec<String>;

    /// Heater setpoint points
    fn heater_setpoint_channels(&self) -> &[String];

    /// Heater readback points
    fn heater_readback_channels(&self) -> &[String];

    /// How an export of [`channels`](Container::channels) maps onto buffers
    fn channel_layout(&self) -> ChannelLayout;

    /// Persisted file name of a session over `window`
    fn session_file_name(&self, window: &SessionWindow) -> String;
}

fn file_stamp(window: &SessionWindow) -> String {
    format!("{}_{}", window.start().format("%Y-%m-%d--%H-%M"), window.point_count())
}

fn base_layout(channels: &CryomoduleChannels) -> ChannelLayout {
    ChannelLayout::default()
        .bind(channels.valve.clone(), Channel::ValvePosition)
        .bind(channels.ds_level.clone(), Channel::DownstreamLevel)
        .bind(channels.us_level.clone(), Channel::UpstreamLevel)
        .with_heaters(channels.heater_setpoints.clone(), channels.heater_readbacks.clone())
}

/// One cavity of a cryomodule
#[derive(Debug)]
pub struct Cavity {
    number: u8,
    parent: Arc<CryomoduleChannels>,
    gradient_channel: String,
    config: MeasurementConfig,
    sessions: SessionCache<Q0Key, Q0Session>,
}

impl Cavity {
    fn new(number: u8, parent: Arc<CryomoduleChannels>, config: MeasurementConfig) -> Self {
        let gradient_channel = cavity_gradient_channel(parent.ids, number);
        Self { number, parent, gradient_channel, config, sessions: SessionCache::new() }
    }

    /// Cavity number (1-based)
    pub fn number(&self) -> u8 {
        self.number
    }

    /// RF gradient readback point
    pub fn gradient_channel(&self) -> &str {
        &self.gradient_channel
    }

    /// Channel set of the parent cryomodule
    pub fn parent_channels(&self) -> &CryomoduleChannels {
        &self.parent
    }

    /// Number of cached Q0 sessions
    pub fn cached_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Q0 session for `request`, loading and processing it on a cache miss
    ///
    /// `calibration` must belong to the same cryomodule. Failures are
    /// returned without caching anything.
    pub fn q0_session<F>(
        &self,
        request: SessionRequest,
        reference_gradient: f64,
        calibration: &Arc<CalibrationSession>,
        load: F,
    ) -> MeasurementResult<Arc<Q0Session>>
    where
        F: FnOnce(&SessionRequest) -> MeasurementResult<SessionBuffers>,
    {
        if calibration.key().ids != self.ids() {
            return Err(MeasurementError::CalibrationUnavailable(
                "calibration belongs to another cryomodule",
            ));
        }

        let key = Q0Key::new(&request.window, self.ids(), *calibration.key(), reference_gradient);
        self.sessions.get_or_try_insert_with(key, || {
            diag_info!("{}: processing Q0 session {}", self.name(), request.window);
            let buffers = load(&request)?;
            Q0Session::process(
                key,
                request,
                reference_gradient,
                Arc::clone(calibration),
                buffers,
                &self.config,
            )
        })
    }
}

impl Container for Cavity {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Cavity(self.number)
    }

    fn name(&self) -> String {
        format!("Cavity {}", self.number)
    }

    fn ids(&self) -> CryomoduleId {
        self.parent.ids
    }

    fn channels(&self) -> Vec<String> {
        let p = &self.parent;
        let mut out = vec![
            p.valve.clone(),
            p.ds_level.clone(),
            p.us_level.clone(),
            self.gradient_channel.clone(),
            p.ds_pressure.clone(),
        ];
        out.extend(p.heater_setpoints.iter().cloned());
        out.extend(p.heater_readbacks.iter().cloned());
        out
    }

    fn heater_setpoint_channels(&self) -> &[String] {
        &self.parent.heater_setpoints
    }

    fn heater_readback_channels(&self) -> &[String] {
        &self.parent.heater_readbacks
    }

    fn channel_layout(&self) -> ChannelLayout {
        base_layout(&self.parent)
            .bind(self.gradient_channel.clone(), Channel::Gradient)
            .bind(self.parent.ds_pressure.clone(), Channel::Pressure)
    }

    fn session_file_name(&self, window: &SessionWindow) -> String {
        let slac = self.parent.ids.slac;
        format!(
            "data/q0meas/cm{slac}/q0meas_CM{slac}_cav{}_{}.csv",
            self.number,
            file_stamp(window)
        )
    }
}

/// A cryomodule and its cavities
#[derive(Debug)]
pub struct Cryomodule {
    channels: Arc<CryomoduleChannels>,
    cavities: BTreeMap<u8, Cavity>,
    config: MeasurementConfig,
    sessions: SessionCache<CalibrationKey, CalibrationSession>,
}

impl Cryomodule {
    /// Cryomodule with default thresholds
    pub fn new(ids: CryomoduleId) -> Self {
        Self::with_config(ids, MeasurementConfig::default())
    }

    /// Cryomodule whose sessions (and its cavities' sessions) use `config`
    pub fn with_config(ids: CryomoduleId, config: MeasurementConfig) -> Self {
        let channels = Arc::new(CryomoduleChannels::new(ids));
        let cavities = (1..=CAVITIES_PER_CRYOMODULE)
            .map(|n| (n, Cavity::new(n, Arc::clone(&channels), config)))
            .collect();
        Self { channels, cavities, config, sessions: SessionCache::new() }
    }

    /// Point identifiers of this cryomodule
    pub fn point_names(&self) -> &CryomoduleChannels {
        &self.channels
    }

    /// Thresholds used for processing
    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    /// Cavity by number (1..=8)
    pub fn cavity(&self, number: u8) -> Option<&Cavity> {
        self.cavities.get(&number)
    }

    /// Cavities in ascending order
    pub fn cavities(&self) -> impl Iterator<Item = &Cavity> {
        self.cavities.values()
    }

    /// Number of cached calibration sessions
    pub fn cached_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Cached calibration session for `window`, if any
    pub fn cached_calibration(&self, window: &SessionWindow) -> Option<Arc<CalibrationSession>> {
        self.sessions.get(&CalibrationKey::new(window, self.ids()))
    }

    /// Calibration session for `request`, loading and processing it on a cache miss
    pub fn calibration_session<F>(
        &self,
        request: SessionRequest,
        load: F,
    ) -> MeasurementResult<Arc<CalibrationSession>>
    where
        F: FnOnce(&SessionRequest) -> MeasurementResult<SessionBuffers>,
    {
        let key = CalibrationKey::new(&request.window, self.ids());
        self.sessions.get_or_try_insert_with(key, || {
            diag_info!("{}: processing calibration session {}", self.name(), request.window);
            let buffers = load(&request)?;
            CalibrationSession::process(key, request, buffers, &self.config)
        })
    }
}

impl Container for Cryomodule {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Cryomodule
    }

    fn name(&self) -> String {
        self.channels.ids.to_string()
    }

    fn ids(&self) -> CryomoduleId {
        self.channels.ids
    }

    fn channels(&self) -> Vec<String> {
        self.channels.acquisition_channels()
    }

    fn heater_setpoint_channels(&self) -> &[String] {
        &self.channels.heater_setpoints
    }

    fn heater_readback_channels(&self) -> &[String] {
        &self.channels.heater_readbacks
    }

    fn channel_layout(&self) -> ChannelLayout {
        base_layout(&self.channels)
    }

    fn session_file_name(&self, window: &SessionWindow) -> String {
        let slac = self.channels.ids.slac;
        format!("data/calib/cm{slac}/calib_CM{slac}_{}.csv", file_stamp(window))
    }
}
