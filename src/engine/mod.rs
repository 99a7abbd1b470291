//! Automation and alerting decision engine (EMBP gateway).
//!
//! A reading flows through four steps:
//! - threshold resolution (`thresholds`), once per reading
//! - pure rule evaluation (`rules`), whose flags are stored with the reading
//! - commit: actuation (`actuator`), then per alert candidate a cooldown
//!   check, the event record and the fan-out (`cooldown`, `dispatcher`)
//! - `alert_sent` written back once a noise alert actually fired
//!
//! Nothing is actuated or dispatched until every rule has been evaluated.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::insights::{self, InsightsSnapshot, Recommendation};
use crate::models::{AlertDelivery, AlertEvent, AlertKind, DeviceCategory, Reading, SystemConfig};
use crate::store::{AlertStore, ConfigStore, DeviceStore, ReadingStore, ScheduleStore, Stores};

mod actuator;
mod cooldown;
mod dispatcher;
mod rules;
mod thresholds;

pub use actuator::DeviceActuator;
pub use cooldown::CooldownTracker;
pub use dispatcher::{AlertDispatcher, DEFAULT_CHANNEL_TIMEOUT, DEFAULT_SCREEN_TARGET};
pub use rules::{classify_anomaly, evaluate, AlertCandidate, Evaluation};
pub use thresholds::{resolve, EffectiveThresholds};

/// Window used by [`Engine::status`] to count recent alerts.
const RECENT_ALERT_WINDOW_MINUTES: i64 = 5;

// ---

#[derive(Debug, Clone, Serialize)]
pub struct Actuation {
    pub category: DeviceCategory,
    pub affected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaisedAlert {
    pub event: AlertEvent,
    pub deliveries: Vec<AlertDelivery>,
}

/// Everything one call to [`Engine::process`] decided and committed.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionResult {
    // ---
    /// The reading with its flags filled in, as persisted.
    pub reading: Reading,
    pub thresholds: EffectiveThresholds,
    pub actuations: Vec<Actuation>,
    pub alerts: Vec<RaisedAlert>,
    /// Candidates that were held back by cooldown.
    pub suppressed: Vec<AlertKind>,
}

impl DecisionResult {
    pub fn alert_kinds(&self) -> Vec<AlertKind> {
        self.alerts.iter().map(|a| a.event.kind).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    // ---
    pub latest: Option<Reading>,
    pub ac_active: bool,
    pub ventilation_active: bool,
    pub recent_alerts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    #[serde(flatten)]
    pub event: AlertEvent,
    pub deliveries: Vec<AlertDelivery>,
}

// ---

pub struct Engine {
    // ---
    readings: Arc<dyn ReadingStore>,
    configs: Arc<dyn ConfigStore>,
    schedules: Arc<dyn ScheduleStore>,
    devices: Arc<dyn DeviceStore>,
    alerts: Arc<dyn AlertStore>,
    actuator: DeviceActuator,
    cooldown: CooldownTracker,
    dispatcher: AlertDispatcher,
}

impl Engine {
    // ---
    pub fn new(stores: Stores, dispatcher: AlertDispatcher) -> Self {
        // ---
        Engine {
            actuator: DeviceActuator::new(stores.devices.clone()),
            cooldown: CooldownTracker::new(stores.alerts.clone()),
            readings: stores.readings,
            configs: stores.configs,
            schedules: stores.schedules,
            devices: stores.devices,
            alerts: stores.alerts,
            dispatcher,
        }
    }

    /// Evaluate one validated reading and commit its side effects.
    ///
    /// Channel failures are recorded on the delivery records and never fail
    /// this call; only store errors do.
    pub async fn process(&self, reading: Reading, now: DateTime<Utc>) -> Result<DecisionResult> {
        // ---
        let config = self.configs.get_singleton().await?;
        let windows = self.schedules.ongoing_windows(now).await?;
        let thresholds = thresholds::resolve(&config, &windows, now);

        let eval = rules::evaluate(&reading, &thresholds, &config);

        // Alerts reference the reading, so it exists before they do.
        let mut reading = reading;
        reading.flags = eval.flags.clone();
        self.readings.save(&reading).await?;

        let mut actuations = Vec::new();
        for category in &eval.actuate {
            let affected = self.actuator.activate(*category, now).await?;
            actuations.push(Actuation {
                category: *category,
                affected,
            });
        }

        let mut alerts = Vec::new();
        let mut suppressed = Vec::new();
        for candidate in &eval.alerts {
            match self.raise(candidate, &config, reading.id, now).await? {
                Some(raised) => {
                    if candidate.kind == AlertKind::NoiseHigh {
                        reading.flags.alert_sent = true;
                        let affected = self.actuator.activate(DeviceCategory::Screen, now).await?;
                        actuations.push(Actuation {
                            category: DeviceCategory::Screen,
                            affected,
                        });
                    }
                    alerts.push(raised);
                }
                None => suppressed.push(candidate.kind),
            }
        }

        if reading.flags.alert_sent {
            self.readings.save(&reading).await?;
        }

        tracing::info!(
            device = %reading.device_id,
            "Processed reading T={} AQ={} N={}: {} actuation(s), {} alert(s), {} suppressed",
            reading.temperature,
            reading.air_quality,
            reading.noise_level,
            actuations.len(),
            alerts.len(),
            suppressed.len()
        );

        Ok(DecisionResult {
            reading,
            thresholds,
            actuations,
            alerts,
            suppressed,
        })
    }

    /// Cooldown check, record and fan-out under the kind's lock.
    async fn raise(
        &self,
        candidate: &AlertCandidate,
        config: &SystemConfig,
        reading_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<RaisedAlert>> {
        // ---
        let _guard = self.cooldown.lock(candidate.kind).await;

        if !self
            .cooldown
            .allow(candidate.kind, now, config.alert_cooldown_minutes)
            .await?
        {
            return Ok(None);
        }

        // Recorded before any send: a store failure here sends nothing, and a
        // recorded event keeps the cooldown in force even if delivery
        // bookkeeping fails afterwards.
        let event = AlertEvent::new(
            candidate.kind,
            candidate.severity,
            candidate.message.clone(),
            Some(reading_id),
            now,
        );
        self.alerts.record_event(&event).await?;

        let deliveries = self.dispatcher.deliver(&event, config, now).await;
        self.alerts.record_deliveries(&deliveries).await?;

        Ok(Some(RaisedAlert { event, deliveries }))
    }

    /// Insights over the stored readings in `[from, to]`.
    pub async fn insights(
        &self,
        device_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(InsightsSnapshot, Vec<Recommendation>)> {
        // ---
        let readings = self.readings.query(device_id, from, to).await?;
        let snapshot = insights::compute_insights(&readings)?;
        let recommendations = insights::recommend(&snapshot);
        Ok((snapshot, recommendations))
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<SystemStatus> {
        // ---
        let latest = self.readings.latest().await?;
        let ac_active = self
            .devices
            .by_category(DeviceCategory::Ac)
            .await?
            .iter()
            .any(|d| d.active);
        let ventilation_active = self
            .devices
            .by_category(DeviceCategory::Fan)
            .await?
            .iter()
            .any(|d| d.active);
        let recent_alerts = self
            .alerts
            .count_since(now - Duration::minutes(RECENT_ALERT_WINDOW_MINUTES))
            .await?;

        Ok(SystemStatus {
            latest,
            ac_active,
            ventilation_active,
            recent_alerts,
        })
    }

    pub async fn alert_history(&self, limit: usize) -> Result<Vec<AlertRecord>> {
        // ---
        let mut history = Vec::new();
        for event in self.alerts.recent(limit).await? {
            let deliveries = self.alerts.deliveries(event.id).await?;
            history.push(AlertRecord { event, deliveries });
        }
        Ok(history)
    }

    pub async fn acknowledge(&self, alert_id: Uuid, now: DateTime<Utc>) -> Result<AlertEvent> {
        // ---
        let event = self.alerts.acknowledge(alert_id, now).await?;
        tracing::info!("Alert {} ({}) acknowledged", event.id, event.kind);
        Ok(event)
    }

    pub async fn config(&self) -> Result<SystemConfig> {
        self.configs.get_singleton().await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::channels::{ChannelError, NotificationChannel};
    use crate::error::EngineError;
    use crate::models::{AnomalyType, Channel, ControlDevice, DeliveryStatus, ExamWindow};
    use crate::store::MemoryStore;

    /// Alert store whose writes always fail.
    struct UnwritableAlerts;

    #[async_trait]
    impl AlertStore for UnwritableAlerts {
        async fn record_event(&self, _event: &AlertEvent) -> Result<()> {
            Err(EngineError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn record_deliveries(&self, _deliveries: &[AlertDelivery]) -> Result<()> {
            Err(EngineError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn last_created(
            &self,
            _kind: AlertKind,
            _now: DateTime<Utc>,
        ) -> Result<Option<DateTime<Utc>>> {
            Ok(None)
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<AlertEvent>> {
            Ok(Vec::new())
        }

        async fn deliveries(&self, _alert_id: Uuid) -> Result<Vec<AlertDelivery>> {
            Ok(Vec::new())
        }

        async fn count_since(&self, _since: DateTime<Utc>) -> Result<usize> {
            Ok(0)
        }

        async fn acknowledge(&self, alert_id: Uuid, _at: DateTime<Utc>) -> Result<AlertEvent> {
            Err(EngineError::NotFound(format!("alert {}", alert_id)))
        }
    }

    #[derive(Default)]
    struct CountingChannel {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        async fn send(
            &self,
            _recipient: &str,
            _message: &str,
        ) -> std::result::Result<(), ChannelError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, min, 0).unwrap()
    }

    fn reading(ts: DateTime<Utc>, temperature: f64, air_quality: f64, noise: f64) -> Reading {
        Reading::new("lab-1", ts, temperature, air_quality, noise)
    }

    async fn setup() -> (Arc<MemoryStore>, Engine) {
        // ---
        let store = Arc::new(MemoryStore::new());
        for (name, category) in [
            ("AC 1", DeviceCategory::Ac),
            ("Fan 1", DeviceCategory::Fan),
            ("Screen 1", DeviceCategory::Screen),
        ] {
            store
                .save_device(&ControlDevice::new(name, category, "Main Lab"))
                .await
                .unwrap();
        }
        let engine = Engine::new(Stores::from_backend(store.clone()), AlertDispatcher::default());
        (store, engine)
    }

    #[tokio::test]
    async fn test_nominal_reading_has_no_effects() {
        // ---
        let (store, engine) = setup().await;
        let result = engine
            .process(reading(at(10, 0), 22.0, 40.0, 45.0), at(10, 0))
            .await
            .unwrap();

        assert!(result.actuations.is_empty());
        assert!(result.alerts.is_empty());
        assert!(!result.reading.flags.ac_activated);
        assert!(!result.reading.flags.is_anomaly);
        assert_eq!(store.recent(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_high_temperature_full_path() {
        // ---
        let (store, engine) = setup().await;
        let r = reading(at(10, 0), 30.0, 40.0, 45.0);
        let id = r.id;
        let result = engine.process(r, at(10, 0)).await.unwrap();

        assert!(result.reading.flags.ac_activated);
        assert_eq!(result.alert_kinds(), vec![AlertKind::TempHigh, AlertKind::Anomaly]);
        assert_eq!(result.actuations[0].category, DeviceCategory::Ac);
        assert_eq!(result.actuations[0].affected, 1);

        let temp_alert = &result.alerts[0];
        assert_eq!(temp_alert.deliveries.len(), 3);
        assert!(temp_alert.deliveries.iter().all(|d| d.alert_id == temp_alert.event.id));
        assert_eq!(temp_alert.event.reading_id, Some(id));

        // Persisted reading carries the annotations.
        let saved = store.latest().await.unwrap().unwrap();
        assert_eq!(saved.id, id);
        assert!(saved.flags.ac_activated);
        assert!(saved.flags.is_anomaly);

        let acs = store.by_category(DeviceCategory::Ac).await.unwrap();
        assert!(acs[0].active);
    }

    #[tokio::test]
    async fn test_cooldown_between_readings() {
        // ---
        let (_, engine) = setup().await;

        let first = engine
            .process(reading(at(10, 0), 30.0, 40.0, 45.0), at(10, 0))
            .await
            .unwrap();
        assert!(first.alert_kinds().contains(&AlertKind::TempHigh));

        // 4 minutes later: suppressed, but the AC is still actuated.
        let second = engine
            .process(reading(at(10, 4), 30.0, 40.0, 45.0), at(10, 4))
            .await
            .unwrap();
        assert!(second.alerts.is_empty());
        assert!(second.suppressed.contains(&AlertKind::TempHigh));
        assert!(second.reading.flags.ac_activated);

        // Exactly 5 minutes after the first alert: allowed again.
        let third = engine
            .process(reading(at(10, 5), 30.0, 40.0, 45.0), at(10, 5))
            .await
            .unwrap();
        assert!(third.alert_kinds().contains(&AlertKind::TempHigh));
    }

    #[tokio::test]
    async fn test_exam_window_tightens_noise_threshold() {
        // ---
        let (store, engine) = setup().await;
        store
            .save_window(&ExamWindow::new("Algebra", "Main Lab", at(9, 0), at(11, 0), 50.0))
            .await
            .unwrap();

        let inside = engine
            .process(reading(at(10, 0), 22.0, 40.0, 55.0), at(10, 0))
            .await
            .unwrap();
        assert_eq!(inside.thresholds.noise, 50.0);
        assert!(inside.alert_kinds().contains(&AlertKind::NoiseHigh));
        assert!(inside.reading.flags.alert_sent);

        let outside = engine
            .process(reading(at(12, 0), 22.0, 40.0, 55.0), at(12, 0))
            .await
            .unwrap();
        assert_eq!(outside.thresholds.noise, 60.0);
        assert!(!outside.alert_kinds().contains(&AlertKind::NoiseHigh));
        assert!(!outside.reading.flags.alert_sent);
    }

    #[tokio::test]
    async fn test_noise_alert_drives_screen() {
        // ---
        let (store, engine) = setup().await;
        let result = engine
            .process(reading(at(10, 0), 22.0, 40.0, 80.0), at(10, 0))
            .await
            .unwrap();

        assert!(result.reading.flags.alert_sent);
        assert!(result
            .actuations
            .iter()
            .any(|a| a.category == DeviceCategory::Screen && a.affected == 1));
        let screens = store.by_category(DeviceCategory::Screen).await.unwrap();
        assert!(screens[0].active);

        // Suppressed noise alert does not touch the screen again.
        let again = engine
            .process(reading(at(10, 1), 22.0, 40.0, 80.0), at(10, 1))
            .await
            .unwrap();
        assert!(!again.reading.flags.alert_sent);
        assert!(again.actuations.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_toggles_skip_actions_but_keep_classification() {
        // ---
        let (store, engine) = setup().await;
        let cfg = SystemConfig {
            auto_ac_enabled: false,
            alerts_enabled: false,
            ..engine.config().await.unwrap()
        };
        store.update(cfg).await.unwrap();

        let result = engine
            .process(reading(at(10, 0), 30.0, 40.0, 80.0), at(10, 0))
            .await
            .unwrap();

        assert!(result.actuations.is_empty());
        assert!(result.alerts.is_empty());
        assert!(!result.reading.flags.ac_activated);
        assert!(!result.reading.flags.alert_sent);
        assert_eq!(result.reading.flags.anomaly_type, Some(AnomalyType::HighTemperature));
        assert_eq!(store.recent(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_unrecorded_alert_is_never_sent() {
        // ---
        let store = Arc::new(MemoryStore::new());
        let stores = Stores {
            alerts: Arc::new(UnwritableAlerts),
            ..Stores::from_backend(store.clone())
        };
        let counter = Arc::new(CountingChannel::default());
        let dispatcher = [Channel::Sms, Channel::Email, Channel::Screen]
            .into_iter()
            .fold(AlertDispatcher::default(), |d, c| d.with_sender(c, counter.clone()));
        let engine = Engine::new(stores, dispatcher);

        let result = engine
            .process(reading(at(10, 0), 30.0, 40.0, 45.0), at(10, 0))
            .await;

        assert!(matches!(result, Err(EngineError::Database(_))));
        assert_eq!(counter.sent.load(Ordering::SeqCst), 0);

        // The reading was stored with its evaluated flags, not empty ones.
        let saved = store.latest().await.unwrap().unwrap();
        assert!(saved.flags.ac_activated);
        assert_eq!(saved.flags.anomaly_type, Some(AnomalyType::HighTemperature));
    }

    #[tokio::test]
    async fn test_status_and_acknowledge() {
        // ---
        let (_, engine) = setup().await;
        engine
            .process(reading(at(10, 0), 22.0, 70.0, 45.0), at(10, 0))
            .await
            .unwrap();

        let status = engine.status(at(10, 2)).await.unwrap();
        assert!(status.ventilation_active);
        assert!(!status.ac_active);
        assert_eq!(status.recent_alerts, 2);
        assert_eq!(status.latest.unwrap().air_quality, 70.0);

        let history = engine.alert_history(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history
            .iter()
            .all(|h| h.deliveries.len() == 3
                && h.deliveries.iter().all(|d| d.status == DeliveryStatus::Sent)));

        let acked = engine.acknowledge(history[0].event.id, at(10, 3)).await.unwrap();
        assert!(acked.resolved);
        assert_eq!(acked.acknowledged_at, Some(at(10, 3)));
    }

    #[tokio::test]
    async fn test_concurrent_readings_fire_once() {
        // ---
        let (store, engine) = setup().await;
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .process(reading(at(10, 0), 30.0, 40.0, 45.0), at(10, 0))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let temp_alerts = store
            .recent(100)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.kind == AlertKind::TempHigh)
            .count();
        assert_eq!(temp_alerts, 1);
    }
}
