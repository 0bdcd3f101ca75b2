//! Buffer loader for tabular archive exports
//!
//! Maps the columns of an export onto a session's channels, row by row, so
//! that index `i` of every sequence refers to the same instant.
//!
//! ## Accepted input
//!
//! - A header row naming channels by control-system point identifier.
//! - A timestamp column, either `Date` (`YYYY-MM-DD-HH:MM:SS`, archiver
//!   exports) or `time` (`YYYY-MM-DD HH:MM:SS`, MyaPlot exports).
//! - Heater data either as the two summed columns
//!   ([`HEATER_SETPOINT_SUM_HEADER`], [`HEATER_READBACK_SUM_HEADER`]) or as one
//!   column per heater, summed here.
//!
//! ## Tolerance
//!
//! A cell that does not parse as a finite number becomes a missing sample
//! and is counted. A row whose timestamp does not parse is skipped whole.
//! A missing channel column leaves that channel empty. Only a missing
//! timestamp column fails the load.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use csv::{ByteRecord, ReaderBuilder, StringRecord, Trim};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channels::{Channel, HEATER_READBACK_SUM_HEADER, HEATER_SETPOINT_SUM_HEADER};
use crate::errors::{MeasurementError, MeasurementResult};
use crate::session::{Sample, SessionBuffers};

/// Timestamp column flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `Date` header, `%Y-%m-%d-%H:%M:%S`
    Date,
    /// `time` header, `%Y-%m-%d %H:%M:%S`
    Time,
}

impl TimestampFormat {
    /// Header label
    pub const fn header(self) -> &'static str {
        match self {
            Self::Date => "Date",
            Self::Time => "time",
        }
    }

    /// chrono parse pattern
    pub const fn pattern(self) -> &'static str {
        match self {
            Self::Date => "%Y-%m-%d-%H:%M:%S",
            Self::Time => "%Y-%m-%d %H:%M:%S",
        }
    }

    /// Parse one cell
    pub fn parse(self, cell: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(cell, self.pattern()).ok()
    }

    // "Date" wins when both are present
    fn locate(header: &StringRecord) -> Option<(Self, usize)> {
        [Self::Date, Self::Time]
            .into_iter()
            .find_map(|fmt| header.iter().position(|h| h == fmt.header()).map(|i| (fmt, i)))
    }
}

/// Which export columns feed which channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Directly bound columns
    pub bindings: Vec<(String, Channel)>,
    /// Per-heater setpoint columns, summed into [`Channel::HeaterSetpoint`]
    pub heater_setpoints: Vec<String>,
    /// Per-heater readback columns, summed into [`Channel::HeaterReadback`]
    pub heater_readbacks: Vec<String>,
}

impl ChannelLayout {
    /// Bind one column to a channel
    pub fn bind(mut self, header: impl Into<String>, channel: Channel) -> Self {
        self.bindings.push((header.into(), channel));
        self
    }

    /// Per-heater columns to sum
    pub fn with_heaters(mut self, setpoints: Vec<String>, readbacks: Vec<String>) -> Self {
        self.heater_setpoints = setpoints;
        self.heater_readbacks = readbacks;
        self
    }
}

/// Load statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoadReport {
    /// Data rows read into the buffers
    pub rows_read: usize,
    /// Rows dropped for an unparsable timestamp
    pub rows_skipped: usize,
    /// Cells recorded as missing
    pub parse_errors: usize,
    /// Expected columns absent from the header
    pub missing_columns: Vec<String>,
}

/// Buffers plus the statistics of the load that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSession {
    /// Aligned channel sequences
    pub buffers: SessionBuffers,
    /// What went wrong along the way
    pub report: LoadReport,
}

enum Source {
    Column(usize),
    Sum(Vec<usize>),
}

struct Binding {
    channel: Channel,
    name: String,
    source: Source,
}

/// Cells are read as bytes so one badly encoded cell only voids itself
fn parse_cell(record: &ByteRecord, idx: usize) -> Result<f64, String> {
    let bytes = record.get(idx).unwrap_or_default();
    let Ok(raw) = std::str::from_utf8(bytes) else {
        return Err(String::from_utf8_lossy(bytes).into_owned());
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(raw.to_string()),
    }
}

fn resolve(header: &StringRecord, layout: &ChannelLayout, report: &mut LoadReport) -> Vec<Binding> {
    let position = |name: &str| header.iter().position(|h| h == name);
    let mut bindings = Vec::new();

    for (name, channel) in &layout.bindings {
        match position(name) {
            Some(idx) => bindings.push(Binding {
                channel: *channel,
                name: name.clone(),
                source: Source::Column(idx),
            }),
            None => {
                diag_warn!("Column {} not found in export", name);
                report.missing_columns.push(name.clone());
            }
        }
    }

    let heater_groups = [
        (Channel::HeaterSetpoint, HEATER_SETPOINT_SUM_HEADER, &layout.heater_setpoints),
        (Channel::HeaterReadback, HEATER_READBACK_SUM_HEADER, &layout.heater_readbacks),
    ];
    for (channel, sum_header, columns) in heater_groups {
        if bindings.iter().any(|b| b.channel == channel) {
            continue;
        }
        if let Some(idx) = position(sum_header) {
            bindings.push(Binding {
                channel,
                name: sum_header.to_string(),
                source: Source::Column(idx),
            });
            continue;
        }
        if columns.is_empty() {
            continue;
        }

        let found: Vec<Option<usize>> = columns.iter().map(|c| position(c)).collect();
        if found.iter().all(Option::is_some) {
            bindings.push(Binding {
                channel,
                name: sum_header.to_string(),
                source: Source::Sum(found.into_iter().flatten().collect()),
            });
        } else {
            for (name, idx) in columns.iter().zip(&found) {
                if idx.is_none() {
                    diag_warn!("Column {} not found in export", name);
                    report.missing_columns.push(name.clone());
                }
            }
        }
    }

    bindings
}

/// Load from any reader
pub fn load_reader<R: Read>(reader: R, layout: &ChannelLayout) -> MeasurementResult<LoadedSession> {
    let mut rdr = ReaderBuilder::new().flexible(true).trim(Trim::All).from_reader(reader);
    let header = rdr.headers()?.clone();

    let (format, time_idx) =
        TimestampFormat::locate(&header).ok_or(MeasurementError::MissingTimestampColumn)?;

    let mut report = LoadReport::default();
    let bindings = resolve(&header, layout, &mut report);
    let mut buffers = SessionBuffers::default();

    for (row, record) in rdr.byte_records().enumerate() {
        let record = record?;
        let stamp = record.get(time_idx).and_then(|cell| std::str::from_utf8(cell).ok());
        let Some(time) = stamp.and_then(|cell| format.parse(cell)) else {
            diag_warn!("Row {}: unparsable timestamp, row skipped", row);
            report.rows_skipped += 1;
            continue;
        };
        buffers.push_timestamp(time);

        for binding in &bindings {
            let value: Sample = match &binding.source {
                Source::Column(idx) => match parse_cell(&record, *idx) {
                    Ok(v) => Some(v),
                    Err(raw) => {
                        let err = MeasurementError::Parse {
                            column: binding.name.clone(),
                            row,
                            value: raw,
                        };
                        diag_warn!("Could not fill buffer: {}", err);
                        report.parse_errors += 1;
                        None
                    }
                },
                Source::Sum(columns) => {
                    let cells: Result<Vec<f64>, String> =
                        columns.iter().map(|&idx| parse_cell(&record, idx)).collect();
                    match cells {
                        Ok(values) => Some(values.iter().sum()),
                        Err(raw) => {
                            diag_warn!(
                                "Could not fill buffer: {} (heater cell {:?}) at row {}",
                                binding.channel,
                                raw,
                                row
                            );
                            report.parse_errors += 1;
                            None
                        }
                    }
                }
            };
            buffers.channel_mut(binding.channel).push(value);
        }
        report.rows_read += 1;
    }

    diag_info!(
        "Loaded {} rows ({} skipped, {} bad cells, {} missing columns)",
        report.rows_read,
        report.rows_skipped,
        report.parse_errors,
        report.missing_columns.len()
    );
    Ok(LoadedSession { buffers, report })
}

/// Load an export file
pub fn load_csv<P: AsRef<Path>>(path: P, layout: &ChannelLayout) -> MeasurementResult<LoadedSession> {
    let file = File::open(path.as_ref())?;
    load_reader(file, layout)
}
