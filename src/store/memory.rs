//! In-memory backend. Used by the test suite and when no `DATABASE_URL` is
//! configured.
//!
//! Every collection is keyed by id, so saves and acknowledgements are O(1).
//! Nothing is ever evicted: memory grows with the number of readings and
//! alerts, which is fine for tests and short unattended runs but not for a
//! long-lived deployment. Configure Postgres for that.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AlertStore, ConfigStore, DeviceStore, ReadingStore, ScheduleStore};
use crate::error::{EngineError, Result};
use crate::models::{
    AlertDelivery, AlertEvent, AlertKind, ControlDevice, DeviceCategory, ExamWindow, Reading,
    SystemConfig,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    // ---
    readings: RwLock<HashMap<Uuid, Reading>>,
    config: RwLock<Option<SystemConfig>>,
    windows: RwLock<HashMap<Uuid, ExamWindow>>,
    devices: RwLock<HashMap<Uuid, ControlDevice>>,
    alerts: RwLock<HashMap<Uuid, AlertEvent>>,
    /// Keyed by the owning alert id, in insertion order.
    deliveries: RwLock<HashMap<Uuid, Vec<AlertDelivery>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn save(&self, reading: &Reading) -> Result<()> {
        // ---
        self.readings.write().await.insert(reading.id, reading.clone());
        Ok(())
    }

    async fn query(
        &self,
        device_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        // ---
        let readings = self.readings.read().await;
        let mut found: Vec<Reading> = readings
            .values()
            .filter(|r| device_id.map_or(true, |id| r.device_id == id))
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.timestamp);
        Ok(found)
    }

    async fn latest(&self) -> Result<Option<Reading>> {
        // ---
        let readings = self.readings.read().await;
        Ok(readings.values().max_by_key(|r| r.timestamp).cloned())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_singleton(&self) -> Result<SystemConfig> {
        // ---
        let mut slot = self.config.write().await;
        Ok(slot.get_or_insert_with(SystemConfig::default).clone())
    }

    async fn create(&self, config: SystemConfig) -> Result<SystemConfig> {
        // ---
        let mut slot = self.config.write().await;
        if slot.is_some() {
            return Err(EngineError::ConfigConflict);
        }
        *slot = Some(config.clone());
        Ok(config)
    }

    async fn update(&self, config: SystemConfig) -> Result<()> {
        *self.config.write().await = Some(config);
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn ongoing_windows(&self, now: DateTime<Utc>) -> Result<Vec<ExamWindow>> {
        // ---
        let windows = self.windows.read().await;
        let mut ongoing: Vec<ExamWindow> =
            windows.values().filter(|w| w.is_ongoing(now)).cloned().collect();
        ongoing.sort_by_key(|w| w.start);
        Ok(ongoing)
    }

    async fn save_window(&self, window: &ExamWindow) -> Result<()> {
        // ---
        self.windows.write().await.insert(window.id, window.clone());
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn by_category(&self, category: DeviceCategory) -> Result<Vec<ControlDevice>> {
        // ---
        let devices = self.devices.read().await;
        let mut found: Vec<ControlDevice> = devices
            .values()
            .filter(|d| d.category == category)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn save_device(&self, device: &ControlDevice) -> Result<()> {
        // ---
        self.devices.write().await.insert(device.id, device.clone());
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn record_event(&self, event: &AlertEvent) -> Result<()> {
        // ---
        self.alerts.write().await.insert(event.id, event.clone());
        Ok(())
    }

    async fn record_deliveries(&self, deliveries: &[AlertDelivery]) -> Result<()> {
        // ---
        let mut stored = self.deliveries.write().await;
        for delivery in deliveries {
            stored
                .entry(delivery.alert_id)
                .or_default()
                .push(delivery.clone());
        }
        Ok(())
    }

    async fn last_created(
        &self,
        kind: AlertKind,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        // ---
        let alerts = self.alerts.read().await;
        Ok(alerts
            .values()
            .filter(|a| a.kind == kind && a.created_at <= now)
            .map(|a| a.created_at)
            .max())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AlertEvent>> {
        // ---
        let alerts = self.alerts.read().await;
        let mut recent: Vec<AlertEvent> = alerts.values().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }

    async fn deliveries(&self, alert_id: Uuid) -> Result<Vec<AlertDelivery>> {
        // ---
        let deliveries = self.deliveries.read().await;
        Ok(deliveries.get(&alert_id).cloned().unwrap_or_default())
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<usize> {
        // ---
        let alerts = self.alerts.read().await;
        Ok(alerts.values().filter(|a| a.created_at >= since).count())
    }

    async fn acknowledge(&self, alert_id: Uuid, at: DateTime<Utc>) -> Result<AlertEvent> {
        // ---
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .get_mut(&alert_id)
            .ok_or_else(|| EngineError::NotFound(format!("alert {}", alert_id)))?;
        alert.resolved = true;
        alert.acknowledged_at = Some(at);
        Ok(alert.clone())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone};
    use tokio_test::{assert_err, assert_ok};

    use crate::models::{Channel, DeliveryStatus, Severity};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_config_singleton_created_on_first_access() {
        // ---
        let store = MemoryStore::new();
        let cfg = assert_ok!(store.get_singleton().await);
        assert_eq!(cfg, SystemConfig::default());

        // A second creation must conflict.
        assert_err!(store.create(SystemConfig::default()).await);
    }

    #[tokio::test]
    async fn test_config_create_then_conflict() {
        // ---
        let store = MemoryStore::new();
        let custom = SystemConfig {
            temp_threshold: 30.0,
            ..SystemConfig::default()
        };
        assert_ok!(store.create(custom.clone()).await);
        assert!(matches!(
            store.create(SystemConfig::default()).await,
            Err(EngineError::ConfigConflict)
        ));
        assert_eq!(store.get_singleton().await.unwrap().temp_threshold, 30.0);
    }

    #[tokio::test]
    async fn test_query_filters_and_orders_by_time() {
        // ---
        let store = MemoryStore::new();
        store.save(&Reading::new("b", at(12), 20.0, 30.0, 40.0)).await.unwrap();
        store.save(&Reading::new("a", at(10), 21.0, 31.0, 41.0)).await.unwrap();
        store.save(&Reading::new("a", at(11), 22.0, 32.0, 42.0)).await.unwrap();
        store.save(&Reading::new("a", at(20), 23.0, 33.0, 43.0)).await.unwrap();

        let found = store.query(Some("a"), at(9), at(12)).await.unwrap();
        let temps: Vec<f64> = found.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![21.0, 22.0]);

        let all = store.query(None, at(0), at(23)).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(store.latest().await.unwrap().unwrap().temperature, 23.0);
    }

    #[tokio::test]
    async fn test_resaving_a_reading_replaces_it() {
        // ---
        let store = MemoryStore::new();
        let mut reading = Reading::new("a", at(10), 21.0, 31.0, 41.0);
        store.save(&reading).await.unwrap();
        reading.flags.alert_sent = true;
        store.save(&reading).await.unwrap();

        let all = store.query(None, at(0), at(23)).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].flags.alert_sent);
    }

    #[tokio::test]
    async fn test_deliveries_grouped_by_alert() {
        // ---
        let store = MemoryStore::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let delivery = |alert_id: Uuid, channel: Channel| AlertDelivery {
            id: Uuid::new_v4(),
            alert_id,
            channel,
            recipient: "r".into(),
            message: "m".into(),
            severity: Severity::High,
            status: DeliveryStatus::Sent,
            detail: None,
            attempted_at: at(10),
        };
        store
            .record_deliveries(&[
                delivery(first, Channel::Sms),
                delivery(second, Channel::Sms),
                delivery(first, Channel::Email),
            ])
            .await
            .unwrap();

        let channels: Vec<Channel> = store
            .deliveries(first)
            .await
            .unwrap()
            .iter()
            .map(|d| d.channel)
            .collect();
        assert_eq!(channels, vec![Channel::Sms, Channel::Email]);
        assert!(store.deliveries(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_alert_is_not_found() {
        // ---
        let store = MemoryStore::new();
        let result = store.acknowledge(Uuid::new_v4(), at(10)).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_last_created_ignores_future_alerts() {
        // ---
        let store = MemoryStore::new();
        let event = AlertEvent {
            id: Uuid::new_v4(),
            kind: AlertKind::TempHigh,
            severity: Severity::Medium,
            message: "hot".into(),
            reading_id: None,
            created_at: at(12),
            resolved: false,
            acknowledged_at: None,
        };
        store.record_event(&event).await.unwrap();

        assert_eq!(store.last_created(AlertKind::TempHigh, at(11)).await.unwrap(), None);
        assert_eq!(
            store.last_created(AlertKind::TempHigh, at(12) + Duration::minutes(1)).await.unwrap(),
            Some(at(12))
        );
        assert_eq!(store.last_created(AlertKind::NoiseHigh, at(13)).await.unwrap(), None);
    }
}
