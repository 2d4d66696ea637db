//! Device records, per-device history ring buffers and the greenhouse
//! grouping that owns them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

/// Maximum number of entries retained in each per-device history log.
pub const HISTORY_LEN: usize = 20;

/// Separator between greenhouse name and device label in display names.
pub const NAME_SEPARATOR: &str = " - ";

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sensors {
    /// Degrees Celsius, one decimal place.
    pub temperature: f64,
    /// Relative humidity in percent, kept integral by the simulator.
    pub humidity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controls {
    /// Lamp output in percent, always within 0..=100.
    pub light_intensity: u8,
}

/// Per-device watering rules. Compared structurally to detect edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub enabled: bool,
    /// Humidity below which automatic watering fires. `None` never fires.
    pub min_humidity: Option<f64>,
    /// Base dose in mL. `None` or zero falls back to the default dose.
    pub base_water_amount: Option<f64>,
    pub light_start_time: String,
    pub light_end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WateringAction {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WateringEvent {
    pub timestamp: String,
    pub action: WateringAction,
    #[serde(rename = "amount", with = "millilitres")]
    pub amount_ml: u32,
}

impl WateringEvent {
    /// Display form of the dose, e.g. `"120mL"`.
    pub fn amount_label(&self) -> String {
        format!("{}mL", self.amount_ml)
    }
}

/// Newest-first bounded logs. Entries are never edited once pushed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub sensor_log: VecDeque<SensorSample>,
    pub watering_log: VecDeque<WateringEvent>,
}

impl History {
    pub fn record_sample(&mut self, sample: SensorSample) {
        push_capped(&mut self.sensor_log, sample);
    }

    pub fn record_watering(&mut self, event: WateringEvent) {
        push_capped(&mut self.watering_log, event);
    }
}

fn push_capped<T>(log: &mut VecDeque<T>, entry: T) {
    log.push_front(entry);
    log.truncate(HISTORY_LEN);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    /// `"<greenhouse> - <label>"`, derived once at construction.
    pub name: String,
    pub greenhouse: String,
    pub label: String,
    pub status: DeviceStatus,
    pub sensors: Sensors,
    pub controls: Controls,
    pub automation: Automation,
    pub history: History,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        greenhouse: impl Into<String>,
        label: impl Into<String>,
        status: DeviceStatus,
        sensors: Sensors,
        controls: Controls,
        automation: Automation,
    ) -> Self {
        let greenhouse = greenhouse.into();
        let label = label.into();
        Self {
            id: id.into(),
            name: format!("{greenhouse}{NAME_SEPARATOR}{label}"),
            greenhouse,
            label,
            status,
            sensors,
            controls,
            automation,
            history: History::default(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }
}

/// A named group of devices. Order of `device_ids` is display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Greenhouse {
    pub name: String,
    pub device_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Current wall-clock time, local when the offset can be determined.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Display-only timestamp, `DD.MM.YYYY HH:MM:SS`.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let fmt = format_description!("[day].[month].[year] [hour]:[minute]:[second]");
    at.format(fmt)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Serialises a millilitre count as `"<n>mL"`.
mod millilitres {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u32, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&format_args!("{amount}mL"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let raw = String::deserialize(d)?;
        raw.trim()
            .strip_suffix("mL")
            .unwrap_or(raw.trim())
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid watering amount '{raw}'")))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
