//! Device actuation. Automation only ever switches devices on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::DeviceCategory;
use crate::store::DeviceStore;

pub struct DeviceActuator {
    // ---
    devices: Arc<dyn DeviceStore>,
    /// One writer per category so concurrent readings cannot lose a
    /// `last_activated` update.
    locks: HashMap<DeviceCategory, Mutex<()>>,
}

impl DeviceActuator {
    // ---
    pub fn new(devices: Arc<dyn DeviceStore>) -> Self {
        // ---
        let locks = DeviceCategory::ALL
            .iter()
            .map(|category| (*category, Mutex::new(())))
            .collect();
        DeviceActuator { devices, locks }
    }

    /// Switch on every device of `category` and stamp `last_activated`.
    ///
    /// Idempotent; returns the number of devices touched, 0 when none are
    /// provisioned for the category.
    pub async fn activate(&self, category: DeviceCategory, now: DateTime<Utc>) -> Result<usize> {
        // ---
        let _guard = self.locks[&category].lock().await;

        let devices = self.devices.by_category(category).await?;
        for mut device in devices.iter().cloned() {
            device.active = true;
            device.last_activated = Some(now);
            self.devices.save_device(&device).await?;
        }

        if devices.is_empty() {
            tracing::debug!("No {} devices provisioned, actuation is a no-op", category);
        } else {
            tracing::info!("{} activated: {} unit(s)", category, devices.len());
        }
        Ok(devices.len())
    }
}
