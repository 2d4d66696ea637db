//! Simulation tick engine: random-walks every online device's sensors,
//! records history and applies automatic watering.
//!
//! [`advance`] is the pure state transition over one snapshot copy. The
//! periodic task started by [`spawn`] runs it through
//! [`Store::apply`](crate::state::Store::apply) once per period, so every
//! tick publishes exactly one new snapshot.
//!
//! ## Per-device tick
//!
//! ```text
//! offline ─────────────────────────────────────────────▶ skipped (frozen)
//! online ──▶ jitter sensors ──▶ log sample ──▶ evaluate ──[fires]──▶ log
//!                                                 │          watering, +15%
//!                                                 └──[no]──▶ done
//! ```

use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::automation;
use crate::device::{self, Device, SensorSample, WateringAction, WateringEvent};
use crate::state::{DeviceStore, SharedStore};

/// How often the simulator advances every device.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Peak-to-peak amplitude of the per-tick temperature walk (°C).
const TEMPERATURE_NOISE: f64 = 0.2;

/// Peak-to-peak amplitude of the per-tick humidity walk (%).
const HUMIDITY_NOISE: f64 = 0.5;

/// Flat humidity gain after an automatic watering.
const AUTOMATIC_HUMIDITY_GAIN: f64 = 15.0;

// ---------------------------------------------------------------------------
// Noise
// ---------------------------------------------------------------------------

/// Source of uniform samples in `[0, 1)`.
pub trait NoiseSource {
    fn unit(&mut self) -> f64;
}

impl NoiseSource for fastrand::Rng {
    fn unit(&mut self) -> f64 {
        self.f64()
    }
}

// ---------------------------------------------------------------------------
// Tick engine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct TickReport {
    /// Number of online devices advanced.
    pub advanced: usize,
    /// `(device_id, amount_ml)` for every automatic watering this tick.
    pub waterings: Vec<(String, u32)>,
}

/// Advance every online device by one tick. Offline devices are untouched.
pub fn advance(
    store: &mut DeviceStore,
    noise: &mut impl NoiseSource,
    at: OffsetDateTime,
) -> TickReport {
    let timestamp = device::format_timestamp(at);
    let mut report = TickReport::default();

    // Walk in display order so a seeded noise source is reproducible.
    let online: Vec<String> = store
        .devices()
        .filter(|d| d.is_online())
        .map(|d| d.id.clone())
        .collect();

    for id in online {
        let Ok(device) = store.device_mut(&id) else {
            continue;
        };
        advance_device(device, noise, &timestamp, &mut report);
    }

    store.ticks += 1;
    report
}

fn advance_device(
    device: &mut Device,
    noise: &mut impl NoiseSource,
    timestamp: &str,
    report: &mut TickReport,
) {
    let sensors = &mut device.sensors;
    sensors.temperature = round1(sensors.temperature + (noise.unit() - 0.5) * TEMPERATURE_NOISE);
    sensors.humidity = (sensors.humidity + (noise.unit() - 0.5) * HUMIDITY_NOISE).round();

    device.history.record_sample(SensorSample {
        timestamp: timestamp.to_string(),
        temperature: sensors.temperature,
        humidity: sensors.humidity,
    });

    // At most one automatic watering per tick; no re-check after the gain.
    if let Some(amount_ml) = automation::evaluate(&device.sensors, &device.automation) {
        device.history.record_watering(WateringEvent {
            timestamp: timestamp.to_string(),
            action: WateringAction::Automatic,
            amount_ml,
        });
        device.sensors.humidity += AUTOMATIC_HUMIDITY_GAIN;

        info!(
            device = %device.id,
            amount_ml,
            humidity = device.sensors.humidity,
            "automatic watering"
        );
        report.waterings.push((device.id.clone(), amount_ml));
    }

    report.advanced += 1;
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Periodic task
// ---------------------------------------------------------------------------

/// Owns the running simulator task. Dropping the handle ends the task at
/// its next wake-up; [`SimulatorHandle::stop`] also waits for it.
pub struct SimulatorHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SimulatorHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!("simulator task ended abnormally: {e}");
        }
    }
}

/// Start ticking every [`TICK_INTERVAL`]. Must be called inside a tokio
/// runtime.
pub fn spawn<N>(store: SharedStore, noise: N) -> SimulatorHandle
where
    N: NoiseSource + Send + 'static,
{
    spawn_with_period(store, noise, TICK_INTERVAL)
}

pub fn spawn_with_period<N>(store: SharedStore, mut noise: N, period: Duration) -> SimulatorHandle
where
    N: NoiseSource + Send + 'static,
{
    let (shutdown, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        // First tick one full period after start.
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(tick_ms = period.as_millis() as u64, "simulator started");

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let report = store
                        .apply(|s| advance(s, &mut noise, device::now()))
                        .await;
                    debug!(
                        advanced = report.advanced,
                        waterings = report.waterings.len(),
                        "tick"
                    );
                }
            }
        }

        info!("simulator stopped");
    });

    SimulatorHandle { shutdown, task }
}

// ===========================================================================
// Tests
// ===========================================================================
