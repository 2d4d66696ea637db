//! Greenhouse/device selection as the dashboard sees it.

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::state::DeviceStore;

/// Which greenhouse and device the dashboard is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Selection {
    pub greenhouse: Option<String>,
    pub device: Option<String>,
}

/// Everything one dashboard page renders, borrowed from a snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard<'a> {
    pub greenhouses: Vec<&'a str>,
    pub selected_greenhouse: Option<&'a str>,
    pub devices: Vec<&'a Device>,
    pub selected_device: Option<&'a Device>,
}

impl Selection {
    /// Switch greenhouse and jump to its first device, if it has one.
    pub fn select_greenhouse(&mut self, store: &DeviceStore, name: &str) {
        self.greenhouse = Some(name.to_string());
        if let Some(first) = store.devices_in_greenhouse(name).first() {
            self.device = Some(first.id.clone());
        }
    }

    /// Switch device; the greenhouse follows the device.
    pub fn select_device(&mut self, store: &DeviceStore, id: &str) {
        self.device = Some(id.to_string());
        if let Ok(d) = store.device(id) {
            self.greenhouse = Some(d.greenhouse.clone());
        }
    }

    /// Resolve against a snapshot. Unknown or missing choices fall back to
    /// the first greenhouse and its first device; the selected device always
    /// belongs to the resolved greenhouse.
    pub fn resolve<'a>(&self, store: &'a DeviceStore) -> Dashboard<'a> {
        let greenhouses = store.greenhouse_names();

        let selected_greenhouse = self
            .greenhouse
            .as_deref()
            .and_then(|name| store.greenhouse(name))
            .map(|g| g.name.as_str())
            .or_else(|| greenhouses.first().copied());

        let devices = selected_greenhouse
            .map(|name| store.devices_in_greenhouse(name))
            .unwrap_or_default();

        // A stored device outside the resolved greenhouse is not shown.
        let selected_device = self
            .device
            .as_deref()
            .and_then(|id| devices.iter().find(|d| d.id == id).copied())
            .or_else(|| devices.first().copied());

        Dashboard {
            greenhouses,
            selected_greenhouse,
            devices,
            selected_device,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_store;

    #[test]
    fn default_selection_picks_first_greenhouse_and_device() {
        let store = test_store();
        let view = Selection::default().resolve(&store);
        assert_eq!(view.selected_greenhouse, Some("Greenhouse A"));
        assert_eq!(view.devices.len(), 3);
        assert_eq!(view.selected_device.map(|d| d.id.as_str()), Some("a1"));
    }

    #[test]
    fn select_greenhouse_jumps_to_its_first_device() {
        let store = test_store();
        let mut sel = Selection::default();
        sel.select_device(&store, "a3");
        sel.select_greenhouse(&store, "Greenhouse B");
        assert_eq!(sel.device.as_deref(), Some("b1"));

        let view = sel.resolve(&store);
        assert_eq!(view.selected_greenhouse, Some("Greenhouse B"));
        assert_eq!(view.devices.len(), 1);
    }

    #[test]
    fn select_unknown_greenhouse_keeps_device() {
        let store = test_store();
        let mut sel = Selection::default();
        sel.select_device(&store, "a3");
        sel.select_greenhouse(&store, "Greenhouse Z");
        assert_eq!(sel.device.as_deref(), Some("a3"));

        // Resolution falls back to the first greenhouse.
        let view = sel.resolve(&store);
        assert_eq!(view.selected_greenhouse, Some("Greenhouse A"));
        assert_eq!(view.selected_device.map(|d| d.id.as_str()), Some("a3"));
    }

    #[test]
    fn fallback_greenhouse_drops_device_from_elsewhere() {
        let store = test_store();
        let mut sel = Selection::default();
        sel.select_device(&store, "b1");
        sel.select_greenhouse(&store, "Greenhouse Z");

        let view = sel.resolve(&store);
        assert_eq!(view.selected_greenhouse, Some("Greenhouse A"));
        assert_eq!(view.selected_device.map(|d| d.id.as_str()), Some("a1"));
        assert!(view
            .devices
            .iter()
            .all(|d| d.greenhouse == "Greenhouse A"));
    }

    #[test]
    fn select_device_moves_greenhouse() {
        let store = test_store();
        let mut sel = Selection::default();
        sel.select_device(&store, "b1");
        assert_eq!(sel.greenhouse.as_deref(), Some("Greenhouse B"));
    }

    #[test]
    fn empty_store_resolves_to_nothing() {
        let store = DeviceStore::default();
        let view = Selection::default().resolve(&store);
        assert!(view.greenhouses.is_empty());
        assert!(view.selected_greenhouse.is_none());
        assert!(view.selected_device.is_none());
    }
}
