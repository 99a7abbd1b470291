//! Storage gateway (EMBP).
//!
//! The decision core only sees these traits. Two backends are provided:
//! [`MemoryStore`] for tests and database-less runs, and [`PgStore`] on top
//! of a `sqlx` Postgres pool.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AlertDelivery, AlertEvent, AlertKind, ControlDevice, DeviceCategory, ExamWindow, Reading,
    SystemConfig,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn save(&self, reading: &Reading) -> Result<()>;

    /// Readings in `[from, to]`, optionally for a single device, ordered by
    /// timestamp ascending.
    async fn query(
        &self,
        device_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>>;

    async fn latest(&self) -> Result<Option<Reading>>;
}

/// Holds the single [`SystemConfig`]. Implementations enforce that at most
/// one instance ever exists.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Return the configuration, creating a default one on first access.
    async fn get_singleton(&self) -> Result<SystemConfig>;

    /// Create the configuration. Fails with `ConfigConflict` if one exists.
    async fn create(&self, config: SystemConfig) -> Result<SystemConfig>;

    async fn update(&self, config: SystemConfig) -> Result<()>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Active windows with `start <= now <= end`.
    async fn ongoing_windows(&self, now: DateTime<Utc>) -> Result<Vec<ExamWindow>>;

    async fn save_window(&self, window: &ExamWindow) -> Result<()>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn by_category(&self, category: DeviceCategory) -> Result<Vec<ControlDevice>>;

    async fn save_device(&self, device: &ControlDevice) -> Result<()>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist an alert event. Written before any channel is attempted, so
    /// cooldown sees the alert even if delivery bookkeeping later fails.
    async fn record_event(&self, event: &AlertEvent) -> Result<()>;

    /// Persist the per-channel outcomes of an already recorded event.
    async fn record_deliveries(&self, deliveries: &[AlertDelivery]) -> Result<()>;

    /// Creation time of the most recent alert of `kind` created at or before
    /// `now`.
    async fn last_created(&self, kind: AlertKind, now: DateTime<Utc>)
        -> Result<Option<DateTime<Utc>>>;

    /// Most recent alert events first.
    async fn recent(&self, limit: usize) -> Result<Vec<AlertEvent>>;

    async fn deliveries(&self, alert_id: Uuid) -> Result<Vec<AlertDelivery>>;

    async fn count_since(&self, since: DateTime<Utc>) -> Result<usize>;

    /// Mark an alert resolved. Fails with `NotFound` for an unknown id.
    async fn acknowledge(&self, alert_id: Uuid, at: DateTime<Utc>) -> Result<AlertEvent>;
}

// ---

/// The full set of collaborators the engine needs.
#[derive(Clone)]
pub struct Stores {
    // ---
    pub readings: Arc<dyn ReadingStore>,
    pub configs: Arc<dyn ConfigStore>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub devices: Arc<dyn DeviceStore>,
    pub alerts: Arc<dyn AlertStore>,
}

impl Stores {
    // ---
    /// Use one backend for every store.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ReadingStore + ConfigStore + ScheduleStore + DeviceStore + AlertStore + 'static,
    {
        // ---
        Stores {
            readings: backend.clone(),
            configs: backend.clone(),
            schedules: backend.clone(),
            devices: backend.clone(),
            alerts: backend,
        }
    }
}
