//! Control-System and Archive Collaborators for Measurement Sessions
//!
//! ## Overview
//!
//! The session engine in `cryoq0-core` never talks to the accelerator
//! directly. Buffers arrive through a loader closure and live readbacks are
//! only needed while a measurement is being taken. This crate holds those
//! outer edges:
//!
//! - [`ControlSystem`]: read and write named points (EPICS-style `get`/`set`)
//! - [`ArchiveExport`]: pull sampled history for a list of points
//! - [`archive`]: turn raw archiver output into the tabular export the
//!   buffer loader accepts, and feed it into a session
//! - [`cryo`]: readiness probes (liquid level, JT valve lock), heater
//!   walking and reference-point helpers built on [`ControlSystem`]
//! - [`memory`]: in-memory implementations for tests and offline replays
//!
//! ## Failure Model
//!
//! An archive that cannot answer is not an error of the measurement: the
//! session simply has no data. [`archive::fetch_buffers`] therefore returns
//! `Ok(None)` when the export fails and leaves the decision to the caller.
//! Polling helpers never wait forever; every wait is bounded by an attempt
//! count and ends in [`ConnectorError::Timeout`].
//!
//! ## Example Usage
//!
//! ```rust
//! use cryoq0_connectors::memory::MemoryControlSystem;
//! use cryoq0_connectors::{cryo, ControlSystem};
//! use cryoq0_core::{CryomoduleChannels, CryomoduleId};
//!
//! let channels = CryomoduleChannels::new(CryomoduleId::new(12, 2));
//! let control = MemoryControlSystem::new();
//! control.set(&channels.ds_level, "92.4")?;
//!
//! assert!(cryo::liquid_level_ready(&control, &channels)?);
//! # Ok::<(), cryoq0_connectors::ConnectorError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod cryo;
pub mod memory;

pub use archive::{fetch_buffers, normalize_export, ExportRequest, SamplerCommand};
pub use memory::{MemoryControlSystem, StaticArchive};

use cryoq0_core::MeasurementError;
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The control system does not know the point
    #[error("Unknown point: {0}")]
    UnknownPoint(String),

    /// A point returned something that is not a number
    #[error("Invalid value {value:?} for point {point}")]
    InvalidValue {
        /// Point identifier
        point: String,
        /// Raw value as returned
        value: String,
    },

    /// A bounded wait ran out of attempts
    #[error("Timeout waiting for {what} after {attempts} attempts")]
    Timeout {
        /// What was being waited on
        what: String,
        /// Attempts made
        attempts: u32,
    },

    /// The archive export failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Loading or processing the exported data failed
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
}

/// Result alias for connector operations
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Read/write access to named control-system points
///
/// Values travel as strings, the way channel-access tools print them.
pub trait ControlSystem {
    /// Current value of `point`
    fn get(&self, point: &str) -> Result<String>;

    /// Write `value` to `point`
    fn set(&self, point: &str, value: &str) -> Result<()>;

    /// Current value of `point` parsed as a float
    fn get_f64(&self, point: &str) -> Result<f64> {
        let value = self.get(point)?;
        value.trim().parse().map_err(|_| ConnectorError::InvalidValue {
            point: point.to_string(),
            value,
        })
    }
}

/// Sampled history export
pub trait ArchiveExport {
    /// Raw whitespace-separated export: a header row of point names, then
    /// one row per sample starting with a `YYYY-MM-DD HH:MM:SS` timestamp
    fn export(&self, request: &ExportRequest) -> Result<String>;
}

impl<T: ControlSystem + ?Sized> ControlSystem for &T {
    fn get(&self, point: &str) -> Result<String> {
        (**self).get(point)
    }

    fn set(&self, point: &str, value: &str) -> Result<()> {
        (**self).set(point, value)
    }
}

impl<T: ArchiveExport + ?Sized> ArchiveExport for &T {
    fn export(&self, request: &ExportRequest) -> Result<String> {
        (**self).export(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_f64_reports_bad_values() {
        let control = MemoryControlSystem::new();
        control.set("CPV:CM02:3001:JT:MODE", "auto").unwrap();

        match control.get_f64("CPV:CM02:3001:JT:MODE") {
            Err(ConnectorError::InvalidValue { point, value }) => {
                assert_eq!(point, "CPV:CM02:3001:JT:MODE");
                assert_eq!(value, "auto");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn measurement_errors_convert() {
        let err: ConnectorError = MeasurementError::MissingTimestampColumn.into();
        assert!(matches!(err, ConnectorError::Measurement(_)));
    }
}
