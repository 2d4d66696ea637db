//! Device record store and the copy-on-write handle that publishes it.
//!
//! Every mutation clones the current snapshot, applies the change to the
//! clone and swaps the result in under the write lock. Readers only ever
//! hold an `Arc` to a complete snapshot.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::device::{Device, Greenhouse};
use crate::error::CommandError;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedStore = Arc<Store>;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One immutable version of every device.
#[derive(Debug, Clone, Default)]
pub struct DeviceStore {
    /// Bumped on every published mutation.
    pub version: u64,
    /// Number of simulation ticks applied so far.
    pub ticks: u64,
    greenhouses: BTreeMap<String, Greenhouse>,
    devices: HashMap<String, Device>,
}

impl DeviceStore {
    /// Group devices into greenhouses, keeping the given order within each.
    /// A later device with an already-seen id replaces the earlier one, and
    /// moves to the later device's greenhouse if that differs.
    pub fn from_devices(devices: Vec<Device>) -> Self {
        let mut store = Self::default();
        for device in devices {
            let moved_from = store
                .devices
                .get(&device.id)
                .filter(|prev| prev.greenhouse != device.greenhouse)
                .map(|prev| prev.greenhouse.clone());
            if let Some(old) = moved_from {
                store.detach(&old, &device.id);
            }
            let gh = store
                .greenhouses
                .entry(device.greenhouse.clone())
                .or_insert_with(|| Greenhouse {
                    name: device.greenhouse.clone(),
                    device_ids: Vec::new(),
                });
            if !gh.device_ids.contains(&device.id) {
                gh.device_ids.push(device.id.clone());
            }
            store.devices.insert(device.id.clone(), device);
        }
        store
    }

    /// Drop `id` from a greenhouse's listing; a greenhouse left empty goes too.
    fn detach(&mut self, greenhouse: &str, id: &str) {
        if let Some(gh) = self.greenhouses.get_mut(greenhouse) {
            gh.device_ids.retain(|d| d != id);
            if gh.device_ids.is_empty() {
                self.greenhouses.remove(greenhouse);
            }
        }
    }

    /// Greenhouse names in sorted order.
    pub fn greenhouse_names(&self) -> Vec<&str> {
        self.greenhouses.keys().map(String::as_str).collect()
    }

    pub fn greenhouse(&self, name: &str) -> Option<&Greenhouse> {
        self.greenhouses.get(name)
    }

    /// Devices of one greenhouse in display order; empty if unknown.
    pub fn devices_in_greenhouse(&self, name: &str) -> Vec<&Device> {
        self.greenhouses
            .get(name)
            .map(|gh| {
                gh.device_ids
                    .iter()
                    .filter_map(|id| self.devices.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn device(&self, id: &str) -> Result<&Device, CommandError> {
        self.devices
            .get(id)
            .ok_or_else(|| CommandError::DeviceNotFound(id.to_string()))
    }

    pub(crate) fn device_mut(&mut self, id: &str) -> Result<&mut Device, CommandError> {
        self.devices
            .get_mut(id)
            .ok_or_else(|| CommandError::DeviceNotFound(id.to_string()))
    }

    /// All devices, greenhouse by greenhouse.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.greenhouses
            .values()
            .flat_map(|gh| gh.device_ids.iter())
            .filter_map(move |id| self.devices.get(id))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// ---------------------------------------------------------------------------
// JSON response (what the status API returns)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub version: u64,
    pub ticks: u64,
    pub greenhouses: usize,
    pub devices_online: usize,
    pub devices_offline: usize,
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

pub struct Store {
    started_at: Instant,
    current: RwLock<Arc<DeviceStore>>,
}

impl Store {
    pub fn new(initial: DeviceStore) -> SharedStore {
        Arc::new(Self {
            started_at: Instant::now(),
            current: RwLock::new(Arc::new(initial)),
        })
    }

    /// The latest published snapshot.
    pub async fn snapshot(&self) -> Arc<DeviceStore> {
        Arc::clone(&*self.current.read().await)
    }

    /// Apply `f` to a copy of the current snapshot and publish it.
    ///
    /// Writers are serialised by the lock. If `f` fails nothing is
    /// published and the version stays put.
    pub async fn update<T, E>(
        &self,
        f: impl FnOnce(&mut DeviceStore) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut current = self.current.write().await;
        let mut next = DeviceStore::clone(&current);
        let out = f(&mut next)?;
        next.version += 1;
        *current = Arc::new(next);
        Ok(out)
    }

    /// Infallible form of [`Store::update`].
    pub async fn apply<T>(&self, f: impl FnOnce(&mut DeviceStore) -> T) -> T {
        let mut current = self.current.write().await;
        let mut next = DeviceStore::clone(&current);
        let out = f(&mut next);
        next.version += 1;
        *current = Arc::new(next);
        out
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub async fn to_status(&self) -> StatusResponse {
        let snap = self.snapshot().await;
        let online = snap.devices().filter(|d| d.is_online()).count();
        StatusResponse {
            uptime_secs: self.uptime().as_secs(),
            version: snap.version,
            ticks: snap.ticks,
            greenhouses: snap.greenhouses.len(),
            devices_online: online,
            devices_offline: snap.len() - online,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
