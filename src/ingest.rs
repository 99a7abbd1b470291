//! Ingestion codec: turns device payloads into validated [`Reading`]s.
//!
//! Two wire formats are accepted, matching what the sensor bridge emits:
//! - JSON objects (`temperature`, `air_quality`, `noise_level` or `noise`)
//! - serial CSV lines `TEMP:<c>,AIR:<adc>,NOISE:<adc>` with 10-bit ADC values
//!
//! Validation fails fast with [`EngineError::InvalidReading`]; no partial
//! reading is ever produced.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{EngineError, Result};
use crate::models::Reading;

/// Device id assigned when the payload does not carry one.
pub const DEFAULT_DEVICE_ID: &str = "sensor-01";

const ADC_MAX: f64 = 1023.0;
const AQI_FLOOR: f64 = 20.0;
const AQI_SPAN: f64 = 60.0;
const DB_FLOOR: f64 = 30.0;
const DB_SPAN: f64 = 60.0;

// ---

/// Raw telemetry as posted by a device, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct RawReading {
    // ---
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub temperature: Option<f64>,
    pub air_quality: Option<f64>,
    #[serde(alias = "noise")]
    pub noise_level: Option<f64>,
}

impl RawReading {
    // ---
    /// Validate into a [`Reading`]. `received_at` stamps readings that do not
    /// carry their own timestamp.
    pub fn into_reading(self, received_at: DateTime<Utc>) -> Result<Reading> {
        // ---
        let temperature = require_finite("temperature", self.temperature)?;
        let air_quality = require_finite("air_quality", self.air_quality)?;
        let noise_level = require_finite("noise_level", self.noise_level)?;

        let device_id = self
            .device_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string());

        Ok(Reading::new(
            device_id,
            self.timestamp.unwrap_or(received_at),
            temperature,
            air_quality,
            noise_level,
        ))
    }
}

fn require_finite(field: &str, value: Option<f64>) -> Result<f64> {
    // ---
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(EngineError::InvalidReading(format!(
            "{} is not a finite number: {}",
            field, v
        ))),
        None => Err(EngineError::InvalidReading(format!("missing field {}", field))),
    }
}

/// Parse a JSON telemetry payload.
pub fn parse_json(body: &str, received_at: DateTime<Utc>) -> Result<Reading> {
    // ---
    let raw: RawReading = serde_json::from_str(body)
        .map_err(|e| EngineError::InvalidReading(format!("malformed JSON payload: {}", e)))?;
    raw.into_reading(received_at)
}

/// Parse a serial CSV line such as `TEMP:29.0,AIR:872,NOISE:583`.
///
/// AIR and NOISE are raw ADC counts and are scaled to 20..80 AQI and
/// 30..90 dB respectively, rounded to one decimal.
pub fn parse_serial_line(
    line: &str,
    device_id: &str,
    received_at: DateTime<Utc>,
) -> Result<Reading> {
    // ---
    let mut raw = RawReading {
        device_id: Some(device_id.to_string()),
        ..RawReading::default()
    };

    for field in line.trim().split(',') {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let value: f64 = value.trim().parse().map_err(|_| {
            EngineError::InvalidReading(format!("{} is not numeric: '{}'", key.trim(), value))
        })?;

        match key.trim() {
            "TEMP" => raw.temperature = Some(round1(value)),
            "AIR" => raw.air_quality = Some(scale_adc("AIR", value, AQI_FLOOR, AQI_SPAN)?),
            "NOISE" => raw.noise_level = Some(scale_adc("NOISE", value, DB_FLOOR, DB_SPAN)?),
            _ => {}
        }
    }

    raw.into_reading(received_at)
}

/// Counts outside the 10-bit range mean a wiring or framing fault.
fn scale_adc(key: &str, raw: f64, floor: f64, span: f64) -> Result<f64> {
    // ---
    if !(0.0..=ADC_MAX).contains(&raw) {
        return Err(EngineError::InvalidReading(format!(
            "{} count {} outside 0..={}",
            key, raw, ADC_MAX
        )));
    }
    Ok(round1(floor + (raw / ADC_MAX) * span))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
