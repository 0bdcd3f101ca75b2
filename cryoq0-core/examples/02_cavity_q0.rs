//! Cavity Q0 Example
//!
//! Calibrates a cryomodule from synthetic buffers, then measures the Q0 of
//! cavity 1 from an RF run at 16 MV/m followed by a 3 W heater run.
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example 02_cavity_q0
//! ```

use chrono::{NaiveDate, NaiveDateTime};

use cryoq0_core::{
    Container, Cryomodule, CryomoduleId, MeasurementResult, SessionBuffers, SessionRequest,
    SessionWindow,
};

/// (heater W, gradient MV/m, RF heat W) steps of 2000 s, 10 W baseline
fn buffers(start: NaiveDateTime, steps: &[(f64, f64, f64)], pressure: f64) -> SessionBuffers {
    let mut b = SessionBuffers::default();
    let mut level = 92.0;
    let mut t = 0;
    for &(heater, gradient, rf) in steps {
        for _ in 0..2000 {
            b.push_timestamp(start + chrono::Duration::seconds(t));
            b.downstream_level.push(Some(level));
            b.valve_position.push(Some(17.5));
            b.heater_setpoint.push(Some(heater));
            b.heater_readback.push(Some(heater));
            b.gradient.push(Some(gradient));
            b.pressure.push(Some(pressure));
            level += -2.0e-4 * (heater - 10.0 + rf) - 1.0e-4;
            t += 1;
        }
    }
    b
}

fn request(start: NaiveDateTime, steps: usize) -> MeasurementResult<SessionRequest> {
    let end = start + chrono::Duration::seconds(2000 * steps as i64);
    Ok(SessionRequest::new(SessionWindow::new(start, end, 1)?, 17.5, 10.0))
}

fn main() -> MeasurementResult<()> {
    println!("Cavity Q0 Measurement Example");
    println!("=============================\n");

    let cm = Cryomodule::new(CryomoduleId::new(12, 2));
    let day = NaiveDate::from_ymd_opt(2019, 2, 25).unwrap();

    let cal_start = day.and_hms_opt(8, 0, 0).unwrap();
    let cal_steps = [(10.0, 0.0, 0.0), (13.0, 0.0, 0.0), (16.0, 0.0, 0.0), (19.0, 0.0, 0.0)];
    let calibration = cm.calibration_session(request(cal_start, cal_steps.len())?, |_| {
        Ok(buffers(cal_start, &cal_steps, 0.0))
    })?;
    println!("{}", calibration.label());

    let cavity = cm.cavity(1).expect("cryomodules have eight cavities");
    let q0_start = day.and_hms_opt(13, 0, 0).unwrap();
    let q0_steps = [(10.0, 16.0, 9.6), (13.0, 0.0, 0.0)];
    let session = cavity.q0_session(request(q0_start, q0_steps.len())?, 16.0, &calibration, |_| {
        Ok(buffers(q0_start, &q0_steps, 24.0))
    })?;

    println!("\n{} ({})", cavity.name(), cavity.gradient_channel());
    for result in session.results() {
        println!(
            "  Run {} total {:.2} W, electric {:.2} W, RF {:.2} W",
            result.run, result.total_heat_load, result.electric_heat_load, result.rf_heat_load
        );
        println!("    {}", result.label(session.reference_gradient()));
    }
    println!("\nAverage heat adjustment: {:.3} W", session.average_heat_adjustment());
    match session.q0() {
        Some(q0) => println!("Q0: {q0:.3e}"),
        None => println!("Q0 undefined"),
    }
    Ok(())
}
