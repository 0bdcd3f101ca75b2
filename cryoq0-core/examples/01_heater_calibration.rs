//! Heater Calibration Example
//!
//! Builds an archiver-style export of a four-step heater calibration, loads
//! it through the buffer loader and fits the calibration line.
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 01_heater_calibration
//! ```

use chrono::NaiveDate;

use cryoq0_core::{
    loader, Container, Cryomodule, CryomoduleChannels, CryomoduleId, MeasurementResult,
    SessionRequest, SessionWindow,
};

/// Four 2000 s heater steps; dLL/dt = -2e-4 %/(s·W) · load - 1e-4 %/s
fn export(channels: &CryomoduleChannels) -> (SessionWindow, String) {
    let start = NaiveDate::from_ymd_opt(2019, 2, 25).unwrap().and_hms_opt(11, 25, 0).unwrap();
    let mut text = format!(
        "Date,{},{},{},{},{}\n",
        channels.valve,
        channels.ds_level,
        channels.us_level,
        channels.heater_setpoints.join(","),
        channels.heater_readbacks.join(",")
    );

    let mut level = 92.0;
    let mut t = 0;
    for heater in [10.0, 13.0, 16.0, 19.0] {
        let per_heater = vec![format!("{}", heater / 8.0); 16].join(",");
        for _ in 0..2000 {
            let stamp = start + chrono::Duration::seconds(t);
            text.push_str(&format!(
                "{},17.5,{},{},{}\n",
                stamp.format("%Y-%m-%d-%H:%M:%S"),
                level,
                level - 3.0,
                per_heater
            ));
            level += -2.0e-4 * (heater - 10.0) - 1.0e-4;
            t += 1;
        }
    }

    let window = SessionWindow::new(start, start + chrono::Duration::seconds(t), 1).unwrap();
    (window, text)
}

fn main() -> MeasurementResult<()> {
    println!("Cryomodule Heater Calibration Example");
    println!("=====================================\n");

    let cm = Cryomodule::new(CryomoduleId::new(12, 2));
    let (window, csv) = export(cm.point_names());
    let request = SessionRequest::new(window, 17.5, 10.0);

    println!("Session: {}", window);
    println!("Would persist as: {}\n", cm.session_file_name(&window));

    let layout = cm.channel_layout();
    let session = cm.calibration_session(request, |_| {
        let loaded = loader::load_reader(csv.as_bytes(), &layout)?;
        println!(
            "Loaded {} rows ({} bad cells, {} missing columns)",
            loaded.report.rows_read,
            loaded.report.parse_errors,
            loaded.report.missing_columns.len()
        );
        Ok(loaded.buffers)
    })?;

    println!("\nRuns:");
    for run in session.runs() {
        println!(
            "  Run {} [{}..{}] {:.0} s: {}",
            run.number,
            run.start,
            run.end,
            run.duration_secs(session.buffers()),
            run.heater_label().unwrap_or_else(|| format!("{:?}", run.status))
        );
    }

    println!("\n{}", session.label());
    println!("Calibration curve intercept adjust = {:.3} W", session.heat_adjustment());
    Ok(())
}
