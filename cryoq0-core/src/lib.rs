//! Measurement-session engine for cryomodule heater calibration and cavity Q0
//!
//! Turns archived cryomodule sensor data (liquid-helium level, heater power,
//! RF gradient, helium pressure) into a heater calibration curve and, from it,
//! the intrinsic quality factor of individual cavities.
//!
//! The data flow for one session is strictly sequential:
//!
//! ```text
//! tabular export ─▶ loader ─▶ segmentation ─▶ settle trimming ─▶ run fits
//!                                                                   │
//!                       calibration curve (cryomodule sessions) ◀───┤
//!                       Q0 derivation     (cavity sessions)     ◀───┘
//! ```
//!
//! Sessions are created through their [`Container`](container::Container):
//! a [`Cryomodule`] owns the calibration sessions, each [`Cavity`] owns its
//! Q0 sessions. Both deduplicate requests so identical parameters never
//! trigger a second computation.
//!
//! ```no_run
//! use cryoq0_core::{loader, Container, Cryomodule, CryomoduleId, SessionRequest, SessionWindow};
//! use chrono::NaiveDate;
//!
//! let cm = Cryomodule::new(CryomoduleId::new(12, 2));
//! let start = NaiveDate::from_ymd_opt(2019, 2, 25).unwrap().and_hms_opt(11, 25, 0).unwrap();
//! let end = start + chrono::Duration::hours(5);
//! let request = SessionRequest::new(SessionWindow::new(start, end, 1)?, 17.5, 1.91);
//!
//! let layout = cm.channel_layout();
//! let session = cm.calibration_session(request, |_| {
//!     Ok(loader::load_csv("calib_CM12_2019-02-25--11-25_18000.csv", &layout)?.buffers)
//! })?;
//! println!("calibration slope: {:.3e} %/(s*W)", session.calibration_slope());
//! # Ok::<(), cryoq0_core::MeasurementError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod diag;

pub mod cache;
pub mod channels;
pub mod config;
pub mod constants;
pub mod container;
pub mod errors;
pub mod loader;
pub mod q0;
pub mod regression;
pub mod run;
pub mod segmentation;
pub mod session;
pub mod settle;

// Public API
pub use cache::{CalibrationKey, Q0Key, SessionCache};
pub use channels::{Channel, CryomoduleChannels, CryomoduleId};
pub use config::{MeasurementConfig, SegmentationConfig, SettleConfig};
pub use container::{Cavity, Container, ContainerKind, Cryomodule};
pub use errors::{MeasurementError, MeasurementResult};
pub use loader::{ChannelLayout, LoadReport, LoadedSession};
pub use q0::Q0RunResult;
pub use regression::{CalibrationFit, LinearFit};
pub use run::{DegenerateReason, Run, RunStatus};
pub use session::{
    CalibrationSession, Q0Session, Sample, SessionBuffers, SessionKind, SessionRequest,
    SessionWindow,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
