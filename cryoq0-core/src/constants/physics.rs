//! Physical Constants for Q0 Derivation
//!
//! Values are empirical fits from the LERF/CEBAF cryomodule test stand and are
//! kept exactly as measured. They are not meant to be re-derived.

// ===== Q0 FORMULA =====

/// Geometric shunt impedance R/Q times cavity length, in ohm-metres.
///
/// Q0 = (E × 10⁶)² / (R/Q·L × P_rf)
///
/// Source: 1.3 GHz TESLA-style 9-cell cavity, L = 1.038 m
pub const R_OVER_Q_TIMES_LENGTH: f64 = 939.3;

/// Conversion from MV/m to V/m.
pub const MV_TO_V: f64 = 1e6;

// ===== RF HEAT APPROXIMATION =====

/// Design gradient of the RF heat approximation (MV/m).
///
/// Used before Q0 is known: P ≈ (E / E_design)² × P_design.
pub const DESIGN_GRADIENT_MV_M: f64 = 16.0;

/// RF heat load at the design gradient (W).
pub const DESIGN_RF_HEAT_W: f64 = 9.6;

// ===== HELIUM TEMPERATURE =====

/// Slope of the linear helium-bath temperature model (K/Torr).
///
/// T = slope × P + offset, valid around 2 K
pub const PRESSURE_TO_TEMP_SLOPE: f64 = 0.0125;

/// Offset of the linear helium-bath temperature model (K).
pub const PRESSURE_TO_TEMP_OFFSET: f64 = 1.705;

// ===== SURFACE RESISTANCE CORRECTION =====
// Q0(2 K) = C1 / [ (C7/2)·e^(C6/2) + C1/Q0(T) − (C7/T)·e^(C6/T) ]
// with C4 = E − offset and C7 = C2 − C3·C4 + C5·C4².

/// BCS prefactor C1.
pub const Q0_CORRECTION_C1: f64 = 271.0;

/// Constant term C2 of the field-dependent coefficient.
pub const Q0_CORRECTION_C2: f64 = 0.0000726;

/// Linear field coefficient C3.
pub const Q0_CORRECTION_C3: f64 = 0.00000214;

/// Field offset subtracted from the gradient to form C4 (MV/m).
pub const Q0_CORRECTION_GRADIENT_OFFSET: f64 = 0.7;

/// Quadratic field coefficient C5.
pub const Q0_CORRECTION_C5: f64 = 0.000000043;

/// Exponent coefficient C6 (K).
pub const Q0_CORRECTION_C6: f64 = -17.02;

/// Reference bath temperature the corrected Q0 is normalised to (K).
pub const Q0_REFERENCE_TEMP_K: f64 = 2.0;
