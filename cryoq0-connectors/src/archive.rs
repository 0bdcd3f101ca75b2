//! Archive export requests and normalization into loader input
//!
//! Archiver tools print samples as whitespace-separated columns with the
//! timestamp split over two tokens:
//!
//! ```text
//! Date                 CLL:CM02:2301:DS:LVL  CPID:CM02:3001:JT:CV_VALUE
//! 2019-02-25 11:25:00  92.1                  17.5
//! ```
//!
//! [`normalize_export`] joins those tokens into one `Date` cell
//! (`2019-02-25-11:25:00`) and re-emits the rows comma-separated, which is
//! what [`cryoq0_core::loader`] expects.

use std::path::PathBuf;
use std::process::Command;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, warn};

use cryoq0_core::loader::{self, LoadedSession};
use cryoq0_core::{Container, MeasurementError, MeasurementResult, SessionBuffers, SessionRequest};

use crate::{ArchiveExport, ConnectorError, Result};

/// What to pull from the archive for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// First sample time
    pub start: NaiveDateTime,
    /// Number of samples
    pub sample_count: u64,
    /// Spacing between samples (seconds)
    pub sample_interval_secs: u32,
    /// Points to export, in column order
    pub channels: Vec<String>,
}

impl ExportRequest {
    /// Export covering `request`'s window for every channel `container` acquires
    pub fn for_session<C: Container + ?Sized>(container: &C, request: &SessionRequest) -> Self {
        Self {
            start: request.window.start(),
            sample_count: request.window.point_count(),
            sample_interval_secs: request.window.sample_interval_secs(),
            channels: container.channels(),
        }
    }

    /// Arguments of a sampler invocation, e.g.
    /// `-b "2019-02-25 11:25:00" -s 1s -n 18672 <points...>`
    pub fn sampler_args(&self) -> Vec<String> {
        let mut args = vec![
            "-b".to_string(),
            self.start.format("%Y-%m-%d %H:%M:%S").to_string(),
            "-s".to_string(),
            format!("{}s", self.sample_interval_secs),
            "-n".to_string(),
            self.sample_count.to_string(),
        ];
        args.extend(self.channels.iter().cloned());
        args
    }
}

/// Archive backed by an external sampler executable
#[derive(Debug, Clone)]
pub struct SamplerCommand {
    program: PathBuf,
}

impl SamplerCommand {
    /// Sampler found at `program` (or on `PATH`)
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for SamplerCommand {
    fn default() -> Self {
        Self::new("mySampler")
    }
}

impl ArchiveExport for SamplerCommand {
    fn export(&self, request: &ExportRequest) -> Result<String> {
        let output = Command::new(&self.program)
            .args(request.sampler_args())
            .output()
            .map_err(|e| ConnectorError::Archive(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            return Err(ConnectorError::Archive(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| ConnectorError::Archive(e.to_string()))
    }
}

fn is_date(token: &str) -> bool {
    NaiveDate::parse_from_str(token, "%Y-%m-%d").is_ok()
}

fn is_time(token: &str) -> bool {
    NaiveTime::parse_from_str(token, "%H:%M:%S").is_ok()
}

/// Join every `date time` token pair of a row; `None` if the row has none
fn normalize_row(row: &str) -> Option<String> {
    let tokens: Vec<&str> = row.split_whitespace().collect();
    let mut cells = Vec::with_capacity(tokens.len());
    let mut found = false;
    let mut i = 0;

    while i < tokens.len() {
        if i + 1 < tokens.len() && is_date(tokens[i]) && is_time(tokens[i + 1]) {
            cells.push(format!("{}-{}", tokens[i], tokens[i + 1]));
            found = true;
            i += 2;
        } else {
            cells.push(tokens[i].to_string());
            i += 1;
        }
    }

    found.then(|| cells.join(","))
}

/// Convert raw archiver output into comma-separated loader input
///
/// The first line is the header. Rows without a recognizable timestamp
/// are kept (their cells comma-joined) and reported; the loader will skip
/// them when their first cell fails to parse.
pub fn normalize_export(raw: &str) -> String {
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    let mut out = String::with_capacity(raw.len());

    let Some(header) = lines.next() else {
        return out;
    };
    out.push_str(&header.split_whitespace().collect::<Vec<_>>().join(","));
    out.push('\n');

    let mut unformatted = 0usize;
    for row in lines {
        match normalize_row(row) {
            Some(cells) => out.push_str(&cells),
            None => {
                warn!("Could not reformat date for row: {}", row.trim());
                unformatted += 1;
                out.push_str(&row.split_whitespace().collect::<Vec<_>>().join(","));
            }
        }
        out.push('\n');
    }

    if unformatted > 0 {
        debug!("{unformatted} archive rows kept without a timestamp");
    }
    out
}

/// Export, normalize and load the buffers of one session
///
/// `Ok(None)` means the archive had nothing for this request. Load errors
/// (e.g. an export without a timestamp column) are still returned.
pub fn fetch_buffers<A, C>(archive: &A, container: &C, request: &SessionRequest) -> Result<Option<LoadedSession>>
where
    A: ArchiveExport + ?Sized,
    C: Container + ?Sized,
{
    let export = ExportRequest::for_session(container, request);
    let raw = match archive.export(&export) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Archive export for {} failed: {e}", container.name());
            return Ok(None);
        }
    };

    let loaded = loader::load_reader(normalize_export(&raw).as_bytes(), &container.channel_layout())?;
    debug!(
        "Loaded {} rows for {} ({} skipped)",
        loaded.report.rows_read,
        container.name(),
        loaded.report.rows_skipped
    );
    Ok(Some(loaded))
}

/// [`fetch_buffers`] shaped as a session loader
///
/// No data becomes [`MeasurementError::Unavailable`] so the failed
/// session is reported and left uncached.
pub fn session_loader<'a, A, C>(
    archive: &'a A,
    container: &'a C,
) -> impl FnOnce(&SessionRequest) -> MeasurementResult<SessionBuffers> + 'a
where
    A: ArchiveExport + ?Sized,
    C: Container + ?Sized,
{
    move |request: &SessionRequest| match fetch_buffers(archive, container, request) {
        Ok(Some(loaded)) => Ok(loaded.buffers),
        Ok(None) => Err(MeasurementError::Unavailable(format!(
            "no archive data for {} at {}",
            container.name(),
            request.window
        ))),
        Err(ConnectorError::Measurement(e)) => Err(e),
        Err(e) => Err(MeasurementError::Unavailable(e.to_string())),
    }
}
