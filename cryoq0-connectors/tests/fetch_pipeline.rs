//! Archive export → normalization → loader → calibration and Q0 sessions

use std::io::Write;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use cryoq0_connectors::archive::{fetch_buffers, normalize_export, session_loader};
use cryoq0_connectors::{ExportRequest, StaticArchive};
use cryoq0_core::{
    loader, Container, Cryomodule, CryomoduleChannels, CryomoduleId, MeasurementError,
    SessionRequest, SessionWindow,
};

const IDS: CryomoduleId = CryomoduleId::new(12, 2);
const STEP_SECS: i64 = 2000;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 2, 25).unwrap().and_hms_opt(11, 25, 0).unwrap()
}

/// (heater W, gradient MV/m, RF heat W) held for `STEP_SECS` each
struct Archived {
    steps: Vec<(f64, f64, f64)>,
    pressure: f64,
}

impl Archived {
    fn calibration() -> Self {
        Self {
            steps: vec![(10.0, 0.0, 0.0), (13.0, 0.0, 0.0), (16.0, 0.0, 0.0), (19.0, 0.0, 0.0)],
            pressure: 23.6,
        }
    }

    fn q0() -> Self {
        Self { steps: vec![(10.0, 16.0, 9.6), (13.0, 0.0, 0.0)], pressure: 23.6 }
    }

    fn request(&self) -> SessionRequest {
        let end = t0() + Duration::seconds(STEP_SECS * self.steps.len() as i64);
        SessionRequest::new(SessionWindow::new(t0(), end, 1).unwrap(), 17.5, 10.0)
    }

    /// Whitespace-separated archiver output for `columns`
    fn raw(&self, columns: &[String], names: &CryomoduleChannels) -> String {
        let mut out = format!("Date     {}\n", columns.join("   "));
        let mut level = 92.0;
        let mut t = t0();

        for &(heater, gradient, rf) in &self.steps {
            for _ in 0..STEP_SECS {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let v = if *c == names.valve {
                            17.5
                        } else if *c == names.ds_level {
                            level
                        } else if *c == names.us_level {
                            level - 3.0
                        } else if *c == names.ds_pressure {
                            self.pressure
                        } else if c.starts_with("CHTR:") {
                            heater / 8.0
                        } else {
                            gradient
                        };
                        v.to_string()
                    })
                    .collect();
                out.push_str(&format!("{}  {}\n", t.format("%Y-%m-%d %H:%M:%S"), cells.join("  ")));
                level += -2.0e-4 * (heater - 10.0 + rf) - 1.0e-4;
                t += Duration::seconds(1);
            }
        }
        out
    }
}

fn assert_close(actual: f64, expected: f64, rel: f64) {
    let tol = rel * expected.abs().max(1.0);
    assert!((actual - expected).abs() <= tol, "{actual} != {expected} (±{tol})");
}

#[test]
fn calibration_and_q0_from_archive() {
    let cm = Cryomodule::new(IDS);
    let synthetic = Archived::calibration();
    let archive = StaticArchive::new(synthetic.raw(&cm.channels(), cm.point_names()));

    let calibration = cm.calibration_session(synthetic.request(), session_loader(&archive, &cm)).unwrap();
    assert_eq!(calibration.runs().len(), 4);
    assert_close(calibration.calibration_slope(), -2.0e-4, 1e-6);
    assert_close(calibration.heat_adjustment(), 0.5, 1e-6);

    let requests = archive.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0], ExportRequest::for_session(&cm, &synthetic.request()));
    assert_eq!(requests[0].sample_count, 8000);

    let cavity = cm.cavity(2).unwrap();
    let synthetic = Archived::q0();
    let archive = StaticArchive::new(synthetic.raw(&cavity.channels(), cm.point_names()));
    let session = cavity
        .q0_session(synthetic.request(), 16.0, &calibration, session_loader(&archive, cavity))
        .unwrap();

    assert_close(session.average_heat_adjustment(), -0.5, 1e-6);
    let rf = session.rf_results().next().unwrap();
    assert_close(rf.rf_heat_load, 9.6, 1e-6);
    assert_close(rf.average_pressure.unwrap(), 23.6, 1e-12);
    // 23.6 Torr is 2 K, where the correction vanishes
    assert_close(rf.q0.unwrap(), 2.56e14 / (939.3 * 9.6), 1e-6);
    assert_eq!(archive.requests()[0].channels, cavity.channels());
}

#[test]
fn unavailable_archive_is_not_cached() {
    let cm = Cryomodule::new(IDS);
    let synthetic = Archived::calibration();
    let down = StaticArchive::unavailable();

    assert!(fetch_buffers(&down, &cm, &synthetic.request()).unwrap().is_none());

    let err = cm.calibration_session(synthetic.request(), session_loader(&down, &cm)).unwrap_err();
    assert!(matches!(err, MeasurementError::Unavailable(_)));
    assert!(err.is_unavailable());
    assert_eq!(cm.cached_sessions(), 0);

    let up = StaticArchive::new(synthetic.raw(&cm.channels(), cm.point_names()));
    cm.calibration_session(synthetic.request(), session_loader(&up, &cm)).unwrap();
    assert_eq!(cm.cached_sessions(), 1);
}

#[test]
fn export_without_timestamp_column_is_an_error() {
    let cm = Cryomodule::new(IDS);
    let archive = StaticArchive::new("Value  X\n1  2\n");
    let err = fetch_buffers(&archive, &cm, &Archived::calibration().request()).unwrap_err();
    assert!(matches!(
        err,
        cryoq0_connectors::ConnectorError::Measurement(MeasurementError::MissingTimestampColumn)
    ));
}

#[test]
fn normalized_export_written_to_disk_loads_back() {
    let cm = Cryomodule::new(IDS);
    let synthetic = Archived::calibration();
    let normalized = normalize_export(&synthetic.raw(&cm.channels(), cm.point_names()));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(normalized.as_bytes()).unwrap();

    let loaded = loader::load_csv(file.path(), &cm.channel_layout()).unwrap();
    assert_eq!(loaded.buffers.len(), 8000);
    assert_eq!(loaded.report.rows_skipped, 0);
    assert!(loaded.report.missing_columns.is_empty());
    assert_close(loaded.buffers.heater_readback[0].unwrap(), 10.0, 1e-12);
}
