//! Automatic watering decision and dosage.
//!
//! The evaluator is a pure function over a device's current sensors and its
//! automation rules. Applying the result (logging the event, bumping
//! humidity) is the tick engine's job.

use crate::device::{Automation, Sensors};

/// Dose used when `base_water_amount` is unset or zero.
pub const DEFAULT_BASE_WATER_ML: u32 = 100;

/// Temperature above which each whole degree adds a bonus dose.
const BONUS_THRESHOLD_C: f64 = 25.0;

/// Extra millilitres per whole degree above the threshold.
const BONUS_ML_PER_DEGREE: f64 = 10.0;

/// Returns the dose in mL if automatic watering should fire.
///
/// Fires only when automation is enabled, a minimum humidity is set and the
/// current humidity is strictly below it.
pub fn evaluate(sensors: &Sensors, automation: &Automation) -> Option<u32> {
    if !automation.enabled {
        return None;
    }
    let min = automation.min_humidity?;
    if sensors.humidity < min {
        Some(dosage(sensors.temperature, automation.base_water_amount))
    } else {
        None
    }
}

/// `base + floor(temperature - 25) * 10` for temperatures above 25 °C.
pub fn dosage(temperature: f64, base_water_amount: Option<f64>) -> u32 {
    let base = match base_water_amount {
        Some(b) if b.is_finite() && b > 0.0 => b,
        _ => DEFAULT_BASE_WATER_ML as f64,
    };
    let bonus = if temperature > BONUS_THRESHOLD_C {
        (temperature - BONUS_THRESHOLD_C).floor() * BONUS_ML_PER_DEGREE
    } else {
        0.0
    };
    (base + bonus).round() as u32
}

// ===========================================================================
// Tests
// ===========================================================================
