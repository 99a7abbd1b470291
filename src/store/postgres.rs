//! Postgres backend on a `sqlx` pool. Tables are created by
//! [`crate::schema::create_schema`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AlertStore, ConfigStore, DeviceStore, ReadingStore, ScheduleStore};
use crate::error::{EngineError, Result};
use crate::models::{
    AlertDelivery, AlertEvent, AlertKind, AnomalyType, ControlDevice, DeviceCategory, ExamWindow,
    Reading, ReadingFlags, SystemConfig,
};

/// Fixed primary key of the one `system_config` row.
const CONFIG_ROW_ID: i16 = 1;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

// ---

#[derive(sqlx::FromRow)]
struct ReadingRow {
    // ---
    id: Uuid,
    device_id: String,
    timestamp_utc: DateTime<Utc>,
    temperature: f64,
    air_quality: f64,
    noise_level: f64,
    ac_activated: bool,
    ventilation_activated: bool,
    alert_sent: bool,
    is_anomaly: bool,
    anomaly_type: Option<String>,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = EngineError;

    fn try_from(row: ReadingRow) -> Result<Self> {
        // ---
        Ok(Reading {
            id: row.id,
            device_id: row.device_id,
            timestamp: row.timestamp_utc,
            temperature: row.temperature,
            air_quality: row.air_quality,
            noise_level: row.noise_level,
            flags: ReadingFlags {
                ac_activated: row.ac_activated,
                ventilation_activated: row.ventilation_activated,
                alert_sent: row.alert_sent,
                is_anomaly: row.is_anomaly,
                anomaly_type: row
                    .anomaly_type
                    .map(|t| t.parse::<AnomalyType>())
                    .transpose()?,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConfigRow {
    // ---
    temp_threshold: f64,
    noise_threshold: f64,
    air_quality_threshold: f64,
    guard_phone: String,
    admin_email: String,
    auto_ac_enabled: bool,
    auto_ventilation_enabled: bool,
    alerts_enabled: bool,
    ai_analysis_enabled: bool,
    alert_cooldown_minutes: i64,
}

impl From<ConfigRow> for SystemConfig {
    fn from(row: ConfigRow) -> Self {
        // ---
        SystemConfig {
            temp_threshold: row.temp_threshold,
            noise_threshold: row.noise_threshold,
            air_quality_threshold: row.air_quality_threshold,
            guard_phone: row.guard_phone,
            admin_email: row.admin_email,
            auto_ac_enabled: row.auto_ac_enabled,
            auto_ventilation_enabled: row.auto_ventilation_enabled,
            alerts_enabled: row.alerts_enabled,
            ai_analysis_enabled: row.ai_analysis_enabled,
            alert_cooldown_minutes: row.alert_cooldown_minutes,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    // ---
    id: Uuid,
    name: String,
    category: String,
    location: String,
    active: bool,
    last_activated: Option<DateTime<Utc>>,
}

impl TryFrom<DeviceRow> for ControlDevice {
    type Error = EngineError;

    fn try_from(row: DeviceRow) -> Result<Self> {
        // ---
        Ok(ControlDevice {
            id: row.id,
            name: row.name,
            category: row.category.parse()?,
            location: row.location,
            active: row.active,
            last_activated: row.last_activated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    // ---
    id: Uuid,
    kind: String,
    severity: String,
    message: String,
    reading_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    resolved: bool,
    acknowledged_at: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRow> for AlertEvent {
    type Error = EngineError;

    fn try_from(row: AlertRow) -> Result<Self> {
        // ---
        Ok(AlertEvent {
            id: row.id,
            kind: row.kind.parse()?,
            severity: row.severity.parse()?,
            message: row.message,
            reading_id: row.reading_id,
            created_at: row.created_at,
            resolved: row.resolved,
            acknowledged_at: row.acknowledged_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    // ---
    id: Uuid,
    alert_id: Uuid,
    channel: String,
    recipient: String,
    message: String,
    severity: String,
    status: String,
    detail: Option<String>,
    attempted_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for AlertDelivery {
    type Error = EngineError;

    fn try_from(row: DeliveryRow) -> Result<Self> {
        // ---
        Ok(AlertDelivery {
            id: row.id,
            alert_id: row.alert_id,
            channel: row.channel.parse()?,
            recipient: row.recipient,
            message: row.message,
            severity: row.severity.parse()?,
            status: row.status.parse()?,
            detail: row.detail,
            attempted_at: row.attempted_at,
        })
    }
}

const READING_COLUMNS: &str = "id, device_id, timestamp_utc, temperature, air_quality, \
    noise_level, ac_activated, ventilation_activated, alert_sent, is_anomaly, anomaly_type";

const CONFIG_COLUMNS: &str = "temp_threshold, noise_threshold, air_quality_threshold, \
    guard_phone, admin_email, auto_ac_enabled, auto_ventilation_enabled, alerts_enabled, \
    ai_analysis_enabled, alert_cooldown_minutes";

const ALERT_COLUMNS: &str =
    "id, kind, severity, message, reading_id, created_at, resolved, acknowledged_at";

// ---

#[async_trait]
impl ReadingStore for PgStore {
    async fn save(&self, reading: &Reading) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO readings (
                id, device_id, timestamp_utc, temperature, air_quality, noise_level,
                ac_activated, ventilation_activated, alert_sent, is_anomaly, anomaly_type
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                ac_activated          = EXCLUDED.ac_activated,
                ventilation_activated = EXCLUDED.ventilation_activated,
                alert_sent            = EXCLUDED.alert_sent,
                is_anomaly            = EXCLUDED.is_anomaly,
                anomaly_type          = EXCLUDED.anomaly_type
            "#,
        )
        .bind(reading.id)
        .bind(&reading.device_id)
        .bind(reading.timestamp)
        .bind(reading.temperature)
        .bind(reading.air_quality)
        .bind(reading.noise_level)
        .bind(reading.flags.ac_activated)
        .bind(reading.flags.ventilation_activated)
        .bind(reading.flags.alert_sent)
        .bind(reading.flags.is_anomaly)
        .bind(reading.flags.anomaly_type.map(|t| t.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        device_id: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        // ---
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE timestamp_utc BETWEEN $1 AND $2 \
               AND ($3::TEXT IS NULL OR device_id = $3) \
             ORDER BY timestamp_utc ASC"
        );
        let rows: Vec<ReadingRow> = sqlx::query_as(&sql)
            .bind(from)
            .bind(to)
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Reading::try_from).collect()
    }

    async fn latest(&self) -> Result<Option<Reading>> {
        // ---
        let sql =
            format!("SELECT {READING_COLUMNS} FROM readings ORDER BY timestamp_utc DESC LIMIT 1");
        let row: Option<ReadingRow> = sqlx::query_as(&sql).fetch_optional(&self.pool).await?;
        row.map(Reading::try_from).transpose()
    }
}

#[async_trait]
impl ConfigStore for PgStore {
    async fn get_singleton(&self) -> Result<SystemConfig> {
        // ---
        // First access seeds the defaults; concurrent seeders collapse on the
        // fixed primary key.
        insert_config(&self.pool, &SystemConfig::default()).await?;

        let sql = format!("SELECT {CONFIG_COLUMNS} FROM system_config WHERE id = $1");
        let row: ConfigRow = sqlx::query_as(&sql)
            .bind(CONFIG_ROW_ID)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn create(&self, config: SystemConfig) -> Result<SystemConfig> {
        // ---
        if insert_config(&self.pool, &config).await? == 0 {
            return Err(EngineError::ConfigConflict);
        }
        Ok(config)
    }

    async fn update(&self, config: SystemConfig) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            UPDATE system_config SET
                temp_threshold           = $2,
                noise_threshold          = $3,
                air_quality_threshold    = $4,
                guard_phone              = $5,
                admin_email              = $6,
                auto_ac_enabled          = $7,
                auto_ventilation_enabled = $8,
                alerts_enabled           = $9,
                ai_analysis_enabled      = $10,
                alert_cooldown_minutes   = $11
            WHERE id = $1
            "#,
        )
        .bind(CONFIG_ROW_ID)
        .bind(config.temp_threshold)
        .bind(config.noise_threshold)
        .bind(config.air_quality_threshold)
        .bind(&config.guard_phone)
        .bind(&config.admin_email)
        .bind(config.auto_ac_enabled)
        .bind(config.auto_ventilation_enabled)
        .bind(config.alerts_enabled)
        .bind(config.ai_analysis_enabled)
        .bind(config.alert_cooldown_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Returns the number of rows inserted (0 when the singleton already exists).
async fn insert_config(pool: &PgPool, config: &SystemConfig) -> Result<u64> {
    // ---
    let result = sqlx::query(
        r#"
        INSERT INTO system_config (
            id, temp_threshold, noise_threshold, air_quality_threshold,
            guard_phone, admin_email, auto_ac_enabled, auto_ventilation_enabled,
            alerts_enabled, ai_analysis_enabled, alert_cooldown_minutes
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(CONFIG_ROW_ID)
    .bind(config.temp_threshold)
    .bind(config.noise_threshold)
    .bind(config.air_quality_threshold)
    .bind(&config.guard_phone)
    .bind(&config.admin_email)
    .bind(config.auto_ac_enabled)
    .bind(config.auto_ventilation_enabled)
    .bind(config.alerts_enabled)
    .bind(config.ai_analysis_enabled)
    .bind(config.alert_cooldown_minutes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn ongoing_windows(&self, now: DateTime<Utc>) -> Result<Vec<ExamWindow>> {
        // ---
        let windows: Vec<(Uuid, String, String, DateTime<Utc>, DateTime<Utc>, f64, bool)> =
            sqlx::query_as(
                r#"
                SELECT id, name, room, start_time, end_time, strict_noise_threshold, active
                FROM exam_windows
                WHERE active AND start_time <= $1 AND end_time >= $1
                ORDER BY start_time ASC
                "#,
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(windows
            .into_iter()
            .map(
                |(id, name, room, start, end, strict_noise_threshold, active)| ExamWindow {
                    id,
                    name,
                    room,
                    start,
                    end,
                    strict_noise_threshold,
                    active,
                },
            )
            .collect())
    }

    async fn save_window(&self, window: &ExamWindow) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO exam_windows (
                id, name, room, start_time, end_time, strict_noise_threshold, active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name                   = EXCLUDED.name,
                room                   = EXCLUDED.room,
                start_time             = EXCLUDED.start_time,
                end_time               = EXCLUDED.end_time,
                strict_noise_threshold = EXCLUDED.strict_noise_threshold,
                active                 = EXCLUDED.active
            "#,
        )
        .bind(window.id)
        .bind(&window.name)
        .bind(&window.room)
        .bind(window.start)
        .bind(window.end)
        .bind(window.strict_noise_threshold)
        .bind(window.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DeviceStore for PgStore {
    async fn by_category(&self, category: DeviceCategory) -> Result<Vec<ControlDevice>> {
        // ---
        let rows: Vec<DeviceRow> = sqlx::query_as(
            r#"
            SELECT id, name, category, location, active, last_activated
            FROM control_devices
            WHERE category = $1
            ORDER BY name
            "#,
        )
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ControlDevice::try_from).collect()
    }

    async fn save_device(&self, device: &ControlDevice) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO control_devices (id, name, category, location, active, last_activated)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name           = EXCLUDED.name,
                category       = EXCLUDED.category,
                location       = EXCLUDED.location,
                active         = EXCLUDED.active,
                last_activated = EXCLUDED.last_activated
            "#,
        )
        .bind(device.id)
        .bind(&device.name)
        .bind(device.category.as_str())
        .bind(&device.location)
        .bind(device.active)
        .bind(device.last_activated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn record_event(&self, event: &AlertEvent) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO alert_events (
                id, kind, severity, message, reading_id, created_at, resolved, acknowledged_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.kind.as_str())
        .bind(event.severity.as_str())
        .bind(&event.message)
        .bind(event.reading_id)
        .bind(event.created_at)
        .bind(event.resolved)
        .bind(event.acknowledged_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_deliveries(&self, deliveries: &[AlertDelivery]) -> Result<()> {
        // ---
        let mut tx = self.pool.begin().await?;

        for delivery in deliveries {
            sqlx::query(
                r#"
                INSERT INTO alert_deliveries (
                    id, alert_id, channel, recipient, message, severity,
                    status, detail, attempted_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(delivery.id)
            .bind(delivery.alert_id)
            .bind(delivery.channel.as_str())
            .bind(&delivery.recipient)
            .bind(&delivery.message)
            .bind(delivery.severity.as_str())
            .bind(delivery.status.as_str())
            .bind(&delivery.detail)
            .bind(delivery.attempted_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn last_created(
        &self,
        kind: AlertKind,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        // ---
        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM alert_events WHERE kind = $1 AND created_at <= $2",
        )
        .bind(kind.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(last)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AlertEvent>> {
        // ---
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alert_events ORDER BY created_at DESC LIMIT $1"
        );
        let rows: Vec<AlertRow> = sqlx::query_as(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(AlertEvent::try_from).collect()
    }

    async fn deliveries(&self, alert_id: Uuid) -> Result<Vec<AlertDelivery>> {
        // ---
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            r#"
            SELECT id, alert_id, channel, recipient, message, severity,
                   status, detail, attempted_at
            FROM alert_deliveries
            WHERE alert_id = $1
            ORDER BY attempted_at, channel
            "#,
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertDelivery::try_from).collect()
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<usize> {
        // ---
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM alert_events WHERE created_at >= $1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn acknowledge(&self, alert_id: Uuid, at: DateTime<Utc>) -> Result<AlertEvent> {
        // ---
        let sql = format!(
            "UPDATE alert_events SET resolved = TRUE, acknowledged_at = $2 \
             WHERE id = $1 RETURNING {ALERT_COLUMNS}"
        );
        let row: Option<AlertRow> = sqlx::query_as(&sql)
            .bind(alert_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| EngineError::NotFound(format!("alert {}", alert_id)))?
            .try_into()
    }
}
