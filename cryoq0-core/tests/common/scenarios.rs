//! Edge-case scenarios
//!
//! Hand-built buffers for the situations the generators don't produce on
//! their own: floor breaches, dead gradient readbacks and sessions recorded
//! without a pressure gauge.

use cryoq0_core::SessionBuffers;

use super::{t0, Step, SyntheticSession, REFERENCE_HEAT, REFERENCE_VALVE};

/// 800 samples at 1 s: heater step at 100, level under 66 % from 500 on
pub fn heater_step_then_floor_breach() -> SessionBuffers {
    let mut b = SessionBuffers::default();
    for i in 0..800usize {
        b.push_timestamp(t0() + chrono::Duration::seconds(i as i64));
        let heater = if i < 100 { REFERENCE_HEAT } else { REFERENCE_HEAT + 4.0 };
        b.heater_setpoint.push(Some(heater));
        b.heater_readback.push(Some(heater));
        b.valve_position.push(Some(REFERENCE_VALVE));
        b.downstream_level.push(Some(if i < 500 { 80.0 - 0.01 * i as f64 } else { 60.0 }));
    }
    b
}

/// One RF run whose gradient readback is stuck at zero
pub fn dead_gradient_readback() -> SyntheticSession {
    SyntheticSession {
        steps: vec![Step::rf(2000, 0.0, 9.6)],
        ..SyntheticSession::q0()
    }
}

/// The standard Q0 session with no pressure channel
pub fn without_pressure() -> SyntheticSession {
    SyntheticSession { pressure: None, ..SyntheticSession::q0() }
}
