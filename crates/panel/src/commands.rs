//! Manual commands issued from the panel: watering, lamp intensity and
//! automation edits.
//!
//! Every command resolves the device itself and refuses unknown or offline
//! devices, so a rejected command never publishes a snapshot. Each accepted
//! command is exactly one store replacement.

use serde::de::IgnoredAny;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;

use crate::device::{self, Automation, Device, WateringAction, WateringEvent};
use crate::error::CommandError;
use crate::state::{DeviceStore, Store};

/// Fixed dose for a manual watering, independent of automation rules.
pub const MANUAL_WATER_ML: u32 = 150;

/// Flat humidity gain after a manual watering. Not capped.
const MANUAL_HUMIDITY_GAIN: f64 = 20.0;

const LIGHT_MAX: i64 = 100;

// ---------------------------------------------------------------------------
// Input coercion
// ---------------------------------------------------------------------------

/// A numeric form field as submitted: a number, a string, or anything else.
/// Strings are read up to the first character that cannot continue the
/// number; whatever yields no finite number counts as zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

impl Default for NumberInput {
    fn default() -> Self {
        NumberInput::Number(0.0)
    }
}

impl NumberInput {
    pub fn coerce(&self) -> f64 {
        finite_or_zero(match self {
            NumberInput::Number(n) => *n,
            NumberInput::Text(s) => leading_number(s, true),
            NumberInput::Other(_) => 0.0,
        })
    }

    /// Integer value. Numbers are truncated; strings stop at the first
    /// non-digit, so `"72.9"` and `"72abc"` both give 72.
    pub fn coerce_int(&self) -> i64 {
        let v = match self {
            NumberInput::Text(s) => finite_or_zero(leading_number(s, false)),
            _ => self.coerce(),
        };
        v.trunc() as i64
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Longest `[+-]digits[.digits]` prefix after leading whitespace, or 0.
fn leading_number(s: &str, fraction: bool) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let is_digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_start = end;
    while is_digit_at(end) {
        end += 1;
    }
    let mut has_digits = end > int_start;

    if fraction && bytes.get(end) == Some(&b'.') {
        let mut frac_end = end + 1;
        while is_digit_at(frac_end) {
            frac_end += 1;
        }
        if has_digits || frac_end > end + 1 {
            has_digits = true;
            end = frac_end;
        }
    }

    if !has_digits {
        return 0.0;
    }
    s[..end].trim_end_matches('.').parse().unwrap_or(0.0)
}

/// Body of a light-intensity change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LightForm {
    #[serde(default)]
    pub intensity: NumberInput,
}

/// Automation settings as edited in the panel.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationForm {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_humidity: NumberInput,
    #[serde(default)]
    pub base_water_amount: NumberInput,
    #[serde(default)]
    pub light_start_time: String,
    #[serde(default)]
    pub light_end_time: String,
}

impl AutomationForm {
    pub fn into_settings(self) -> Automation {
        Automation {
            enabled: self.enabled,
            min_humidity: Some(self.min_humidity.coerce()),
            base_water_amount: Some(self.base_water_amount.coerce()),
            light_start_time: self.light_start_time,
            light_end_time: self.light_end_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot mutations
// ---------------------------------------------------------------------------

fn online_device<'a>(store: &'a mut DeviceStore, id: &str) -> Result<&'a mut Device, CommandError> {
    let device = store.device_mut(id)?;
    if !device.is_online() {
        return Err(CommandError::DeviceOffline(id.to_string()));
    }
    Ok(device)
}

/// Log a manual watering and add the flat humidity gain.
pub fn water(
    store: &mut DeviceStore,
    id: &str,
    at: OffsetDateTime,
) -> Result<WateringEvent, CommandError> {
    let device = online_device(store, id)?;
    let event = WateringEvent {
        timestamp: device::format_timestamp(at),
        action: WateringAction::Manual,
        amount_ml: MANUAL_WATER_ML,
    };
    device.history.record_watering(event.clone());
    device.sensors.humidity += MANUAL_HUMIDITY_GAIN;
    Ok(event)
}

/// Set lamp output, clamped to 0..=100. Returns the stored value.
pub fn set_light(store: &mut DeviceStore, id: &str, intensity: i64) -> Result<u8, CommandError> {
    let device = online_device(store, id)?;
    let clamped = intensity.clamp(0, LIGHT_MAX) as u8;
    device.controls.light_intensity = clamped;
    Ok(clamped)
}

/// Replace the automation rules wholesale. Returns whether they differ
/// from the previous rules.
pub fn replace_automation(
    store: &mut DeviceStore,
    id: &str,
    settings: Automation,
) -> Result<bool, CommandError> {
    let device = online_device(store, id)?;
    let changed = device.automation != settings;
    device.automation = settings;
    Ok(changed)
}

// ---------------------------------------------------------------------------
// Published commands
// ---------------------------------------------------------------------------

pub async fn manual_water(store: &Store, id: &str) -> Result<WateringEvent, CommandError> {
    let event = store.update(|s| water(s, id, device::now())).await?;
    info!(device = %id, amount = %event.amount_label(), "manual watering");
    Ok(event)
}

pub async fn set_light_intensity(
    store: &Store,
    id: &str,
    intensity: i64,
) -> Result<u8, CommandError> {
    let stored = store.update(|s| set_light(s, id, intensity)).await?;
    if i64::from(stored) != intensity {
        info!(device = %id, requested = intensity, stored, "light intensity clamped");
    } else {
        info!(device = %id, intensity = stored, "light intensity set");
    }
    Ok(stored)
}

pub async fn update_automation(
    store: &Store,
    id: &str,
    settings: Automation,
) -> Result<bool, CommandError> {
    let changed = store
        .update(|s| replace_automation(s, id, settings))
        .await?;
    info!(device = %id, changed, "automation updated");
    Ok(changed)
}

// ===========================================================================
// Tests
// ===========================================================================
