//! Error Types for Measurement Sessions
//!
//! Failures fall into two groups:
//!
//! ### Recoverable
//! - `Parse`: a malformed numeric cell. The loader records the cell as
//!   missing, emits a diagnostic and keeps going. This variant is counted in
//!   the [`LoadReport`](crate::loader::LoadReport) and never returned from a load.
//! - `DegenerateRun`: a run that cannot be fitted. It is flagged on the run and
//!   left out of aggregation instead of failing the session.
//! - `UndefinedQ0`: an RF run whose RF heat load is not positive. Its Q0 is
//!   reported as absent.
//!
//! ### Structural
//! - `EmptySession`, `CalibrationUnavailable`, `Unavailable`,
//!   `MissingTimestampColumn`, `MisalignedBuffers`: the session cannot be
//!   processed. The caller gets the error and nothing is cached.
//!
//! ```rust
//! use cryoq0_core::{MeasurementError, MeasurementResult};
//!
//! fn describe(result: MeasurementResult<f64>) -> String {
//!     match result {
//!         Ok(q0) => format!("Q0 = {q0:.2e}"),
//!         Err(MeasurementError::UndefinedQ0 { run, .. }) => format!("run {run}: undefined"),
//!         Err(e) if e.is_unavailable() => "no data".to_string(),
//!         Err(e) => format!("failed: {e}"),
//!     }
//! }
//! # assert_eq!(describe(Err(MeasurementError::Unavailable("timeout".into()))), "no data");
//! ```

use thiserror::Error;

use crate::run::DegenerateReason;

/// Result type for measurement operations
pub type MeasurementResult<T> = Result<T, MeasurementError>;

/// Measurement errors
#[derive(Error, Debug)]
pub enum MeasurementError {
    /// A cell could not be read as a number
    #[error("Unparsable value {value:?} in column {column:?} at row {row}")]
    Parse {
        /// Column header
        column: String,
        /// Data row (0-based, header excluded)
        row: usize,
        /// Raw cell text
        value: String,
    },

    /// Neither a `Date` nor a `time` column was found
    #[error("No timestamp column (expected \"Date\" or \"time\")")]
    MissingTimestampColumn,

    /// Segmentation produced no usable run
    #[error("No usable runs in session {session}")]
    EmptySession {
        /// Human-readable session description
        session: String,
    },

    /// A run could not be fitted
    #[error("Run {run} is degenerate: {reason}")]
    DegenerateRun {
        /// Run number within its session
        run: usize,
        /// Why the fit was skipped
        reason: DegenerateReason,
    },

    /// RF heat load of a run is not positive
    #[error("Q0 undefined for run {run}: RF heat load {rf_heat_load} W")]
    UndefinedQ0 {
        /// Run number within its session
        run: usize,
        /// Offending RF heat load (W)
        rf_heat_load: f64,
    },

    /// The calibration line could not be established
    #[error("Calibration unavailable: {0}")]
    CalibrationUnavailable(&'static str),

    /// The external data source failed or returned nothing
    #[error("Data unavailable: {0}")]
    Unavailable(String),

    /// Channel buffers have different lengths
    #[error("Channel {channel} has {actual} samples, expected {expected}")]
    MisalignedBuffers {
        /// Offending channel
        channel: &'static str,
        /// Timestamp count
        expected: usize,
        /// Channel sample count
        actual: usize,
    },

    /// A configuration value is out of its valid range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed tabular export
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O failure while reading an export
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration document
    #[cfg(feature = "serde")]
    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MeasurementError {
    /// True for failures that mean "no data for this session" rather than a bug
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::EmptySession { .. } | Self::CalibrationUnavailable(_)
        )
    }
}
