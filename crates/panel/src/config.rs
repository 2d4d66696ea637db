//! TOML seed loading, validation, and construction of the initial device
//! store.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, Time};

use crate::device::{
    self, Automation, Controls, Device, DeviceStatus, SensorSample, Sensors, WateringAction,
    WateringEvent, HISTORY_LEN, NAME_SEPARATOR,
};
use crate::state::DeviceStore;

const BUILTIN_SEED: &str = include_str!("seed.toml");

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub greenhouses: Vec<GreenhouseEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GreenhouseEntry {
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    pub label: String,
    #[serde(default = "default_status")]
    pub status: DeviceStatus,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default)]
    pub light_intensity: i64,
    pub automation: AutomationEntry,
    #[serde(default)]
    pub sensor_log: Vec<SampleEntry>,
    #[serde(default)]
    pub watering_log: Vec<WateringEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AutomationEntry {
    #[serde(default)]
    pub enabled: bool,
    pub min_humidity: Option<f64>,
    pub base_water_amount: Option<f64>,
    #[serde(default = "default_light_start")]
    pub light_start_time: String,
    #[serde(default = "default_light_end")]
    pub light_end_time: String,
}

/// A historical sensor sample, `age_min` minutes before start-up.
#[derive(Debug, Deserialize)]
pub struct SampleEntry {
    pub age_min: i64,
    pub temperature: f64,
    pub humidity: f64,
}

/// A historical watering, `age_min` minutes before start-up.
#[derive(Debug, Deserialize)]
pub struct WateringEntry {
    pub age_min: i64,
    pub action: WateringAction,
    pub amount_ml: u32,
}

fn default_status() -> DeviceStatus {
    DeviceStatus::Online
}

fn default_light_start() -> String {
    "08:00".to_string()
}

fn default_light_end() -> String {
    "22:00".to_string()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all entries. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_greenhouses(&mut errors);
        self.validate_devices(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_greenhouses(&self, errors: &mut Vec<String>) {
        let mut seen: HashSet<&str> = HashSet::new();

        for (i, g) in self.greenhouses.iter().enumerate() {
            if g.name.trim().is_empty() {
                errors.push(format!("greenhouses[{i}]: name is empty"));
                continue;
            }
            if !seen.insert(&g.name) {
                errors.push(format!("greenhouse '{}': duplicate name", g.name));
            }
            if g.name.contains(NAME_SEPARATOR) {
                errors.push(format!(
                    "greenhouse '{}': name must not contain '{NAME_SEPARATOR}'",
                    g.name
                ));
            }
        }
    }

    fn validate_devices(&self, errors: &mut Vec<String>) {
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for g in &self.greenhouses {
            for (i, d) in g.devices.iter().enumerate() {
                let ctx = || {
                    if d.id.is_empty() {
                        format!("greenhouse '{}' devices[{i}]", g.name)
                    } else {
                        format!("device '{}'", d.id)
                    }
                };

                // ── Identity ────────────────────────────────────────
                if d.id.trim().is_empty() {
                    errors.push(format!("{}: id is empty", ctx()));
                } else if !seen_ids.insert(&d.id) {
                    errors.push(format!("{}: duplicate id", ctx()));
                }
                if d.label.trim().is_empty() {
                    errors.push(format!("{}: label is empty", ctx()));
                }

                // ── Readings and controls ───────────────────────────
                if !d.temperature.is_finite() {
                    errors.push(format!("{}: temperature is not a finite number", ctx()));
                }
                if !d.humidity.is_finite() {
                    errors.push(format!("{}: humidity is not a finite number", ctx()));
                }
                if !(0..=100).contains(&d.light_intensity) {
                    errors.push(format!(
                        "{}: light_intensity {} out of range [0, 100]",
                        ctx(),
                        d.light_intensity
                    ));
                }

                // ── Automation ──────────────────────────────────────
                let a = &d.automation;
                if let Some(min) = a.min_humidity {
                    if !min.is_finite() || min < 0.0 {
                        errors.push(format!("{}: min_humidity {min} must be >= 0", ctx()));
                    }
                }
                if let Some(base) = a.base_water_amount {
                    if !base.is_finite() || base < 0.0 {
                        errors.push(format!(
                            "{}: base_water_amount {base} must be >= 0",
                            ctx()
                        ));
                    }
                }
                for (field, value) in [
                    ("light_start_time", &a.light_start_time),
                    ("light_end_time", &a.light_end_time),
                ] {
                    if parse_hh_mm(value).is_none() {
                        errors.push(format!("{}: {field} '{value}' is not HH:MM", ctx()));
                    }
                }

                // ── Seeded history ──────────────────────────────────
                if d.sensor_log.len() > HISTORY_LEN {
                    errors.push(format!(
                        "{}: sensor_log has {} entries (max {HISTORY_LEN})",
                        ctx(),
                        d.sensor_log.len()
                    ));
                }
                if d.watering_log.len() > HISTORY_LEN {
                    errors.push(format!(
                        "{}: watering_log has {} entries (max {HISTORY_LEN})",
                        ctx(),
                        d.watering_log.len()
                    ));
                }
                let mut ages = d
                    .sensor_log
                    .iter()
                    .map(|s| s.age_min)
                    .chain(d.watering_log.iter().map(|w| w.age_min));
                if ages.any(|age| age < 0) {
                    errors.push(format!("{}: history age_min must be >= 0", ctx()));
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Store construction
    // -----------------------------------------------------------------------

    /// Build the initial store. Seeded history is stamped relative to `now`.
    pub fn build_store(&self, now: OffsetDateTime) -> DeviceStore {
        let devices = self
            .greenhouses
            .iter()
            .flat_map(|g| g.devices.iter().map(move |d| build_device(&g.name, d, now)))
            .collect();
        DeviceStore::from_devices(devices)
    }
}

fn build_device(greenhouse: &str, entry: &DeviceEntry, now: OffsetDateTime) -> Device {
    let a = &entry.automation;
    let mut device = Device::new(
        entry.id.clone(),
        greenhouse,
        entry.label.clone(),
        entry.status,
        Sensors {
            temperature: entry.temperature,
            humidity: entry.humidity,
        },
        Controls {
            light_intensity: entry.light_intensity.clamp(0, 100) as u8,
        },
        Automation {
            enabled: a.enabled,
            min_humidity: a.min_humidity,
            base_water_amount: a.base_water_amount,
            light_start_time: a.light_start_time.clone(),
            light_end_time: a.light_end_time.clone(),
        },
    );

    let stamp = |age_min: i64| device::format_timestamp(now - Duration::minutes(age_min));

    // Push oldest first so the newest ends up at the front.
    let mut samples: Vec<&SampleEntry> = entry.sensor_log.iter().collect();
    samples.sort_by(|x, y| y.age_min.cmp(&x.age_min));
    for s in samples {
        device.history.record_sample(SensorSample {
            timestamp: stamp(s.age_min),
            temperature: s.temperature,
            humidity: s.humidity,
        });
    }

    let mut waterings: Vec<&WateringEntry> = entry.watering_log.iter().collect();
    waterings.sort_by(|x, y| y.age_min.cmp(&x.age_min));
    for w in waterings {
        device.history.record_watering(WateringEvent {
            timestamp: stamp(w.age_min),
            action: w.action,
            amount_ml: w.amount_ml,
        });
    }

    device
}

fn parse_hh_mm(s: &str) -> Option<Time> {
    Time::parse(s, format_description!("[hour]:[minute]")).ok()
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse and validate seed TOML.
pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse seed config")?;
    config.validate()?;
    Ok(config)
}

/// Read, parse, and validate a TOML seed file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    parse(&contents).with_context(|| format!("invalid config: {path}"))
}

/// The demo seed compiled into the binary.
pub fn builtin() -> Result<Config> {
    parse(BUILTIN_SEED).context("invalid built-in seed")
}

// ===========================================================================
// Tests
// ===========================================================================
