//! Database schema management for `ecoguardian`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` when a database is configured.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Safe to call on every startup; no-op if objects already exist.
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    let statements = [
        // Raw readings plus the flags written back by the decision engine
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id                    UUID PRIMARY KEY,
            device_id             TEXT             NOT NULL,
            timestamp_utc         TIMESTAMPTZ      NOT NULL,
            temperature           DOUBLE PRECISION NOT NULL,
            air_quality           DOUBLE PRECISION NOT NULL,
            noise_level           DOUBLE PRECISION NOT NULL,
            ac_activated          BOOLEAN          NOT NULL DEFAULT FALSE,
            ventilation_activated BOOLEAN          NOT NULL DEFAULT FALSE,
            alert_sent            BOOLEAN          NOT NULL DEFAULT FALSE,
            is_anomaly            BOOLEAN          NOT NULL DEFAULT FALSE,
            anomaly_type          TEXT
        );
        "#,
        // The CHECK on the fixed key is what makes the configuration a singleton
        r#"
        CREATE TABLE IF NOT EXISTS system_config (
            id                       SMALLINT PRIMARY KEY CHECK (id = 1),
            temp_threshold           DOUBLE PRECISION NOT NULL,
            noise_threshold          DOUBLE PRECISION NOT NULL,
            air_quality_threshold    DOUBLE PRECISION NOT NULL,
            guard_phone              TEXT             NOT NULL,
            admin_email              TEXT             NOT NULL,
            auto_ac_enabled          BOOLEAN          NOT NULL,
            auto_ventilation_enabled BOOLEAN          NOT NULL,
            alerts_enabled           BOOLEAN          NOT NULL,
            ai_analysis_enabled      BOOLEAN          NOT NULL,
            alert_cooldown_minutes   BIGINT           NOT NULL
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS exam_windows (
            id                     UUID PRIMARY KEY,
            name                   TEXT             NOT NULL,
            room                   TEXT             NOT NULL,
            start_time             TIMESTAMPTZ      NOT NULL,
            end_time               TIMESTAMPTZ      NOT NULL,
            strict_noise_threshold DOUBLE PRECISION NOT NULL,
            active                 BOOLEAN          NOT NULL DEFAULT TRUE
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS control_devices (
            id             UUID PRIMARY KEY,
            name           TEXT    NOT NULL,
            category       TEXT    NOT NULL,
            location       TEXT    NOT NULL,
            active         BOOLEAN NOT NULL DEFAULT FALSE,
            last_activated TIMESTAMPTZ
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS alert_events (
            id              UUID PRIMARY KEY,
            kind            TEXT        NOT NULL,
            severity        TEXT        NOT NULL,
            message         TEXT        NOT NULL,
            reading_id      UUID        REFERENCES readings (id) ON DELETE SET NULL,
            created_at      TIMESTAMPTZ NOT NULL,
            resolved        BOOLEAN     NOT NULL DEFAULT FALSE,
            acknowledged_at TIMESTAMPTZ
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS alert_deliveries (
            id           UUID PRIMARY KEY,
            alert_id     UUID        NOT NULL REFERENCES alert_events (id),
            channel      TEXT        NOT NULL,
            recipient    TEXT        NOT NULL,
            message      TEXT        NOT NULL,
            severity     TEXT        NOT NULL,
            status       TEXT        NOT NULL,
            detail       TEXT,
            attempted_at TIMESTAMPTZ NOT NULL
        );
        "#,
        // Indexes for the history window and cooldown lookups
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_device_time
            ON readings (device_id, timestamp_utc);
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_time
            ON readings (timestamp_utc);
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_alert_events_kind_created
            ON alert_events (kind, created_at);
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_control_devices_category
            ON control_devices (category);
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
