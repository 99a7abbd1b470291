//! Domain data model for the telemetry pipeline.
//!
//! Readings are immutable facts apart from the derived [`ReadingFlags`];
//! devices and alerts carry explicit timestamps assigned by their call sites.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

// ---

/// Declares a closed, string-backed enum with `as_str`, `Display` and
/// `FromStr` so it can be stored as TEXT and round-tripped at the boundary.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(EngineError::Decode(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

// ---

/// One timestamped sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub id: Uuid,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Unitless air-quality index.
    pub air_quality: f64,
    /// Decibels.
    pub noise_level: f64,
    #[serde(default)]
    pub flags: ReadingFlags,
}

impl Reading {
    // ---
    pub fn new(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        temperature: f64,
        air_quality: f64,
        noise_level: f64,
    ) -> Self {
        // ---
        Reading {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            timestamp,
            temperature,
            air_quality,
            noise_level,
            flags: ReadingFlags::default(),
        }
    }
}

/// Annotations the decision engine writes back onto a reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingFlags {
    // ---
    pub ac_activated: bool,
    pub ventilation_activated: bool,
    pub alert_sent: bool,
    pub is_anomaly: bool,
    pub anomaly_type: Option<AnomalyType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    HighTemperature,
    HighNoise,
    PoorAirQuality,
}

text_enum!(AnomalyType {
    HighTemperature => "high_temperature",
    HighNoise => "high_noise",
    PoorAirQuality => "poor_air_quality",
});

// ---

/// The singleton system configuration: thresholds, contacts and toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // ---
    pub temp_threshold: f64,
    pub noise_threshold: f64,
    pub air_quality_threshold: f64,

    pub guard_phone: String,
    pub admin_email: String,

    pub auto_ac_enabled: bool,
    pub auto_ventilation_enabled: bool,
    pub alerts_enabled: bool,
    /// Enables the rule-based anomaly classification alert.
    pub ai_analysis_enabled: bool,

    /// Minimum minutes between two alerts of the same kind.
    pub alert_cooldown_minutes: i64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        // ---
        SystemConfig {
            temp_threshold: 26.0,
            noise_threshold: 60.0,
            air_quality_threshold: 55.0,
            guard_phone: "+254700000000".to_string(),
            admin_email: "admin@uon.ac.ke".to_string(),
            auto_ac_enabled: true,
            auto_ventilation_enabled: true,
            alerts_enabled: true,
            ai_analysis_enabled: true,
            alert_cooldown_minutes: 5,
        }
    }
}

/// A scheduled interval during which a stricter noise threshold applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamWindow {
    // ---
    pub id: Uuid,
    pub name: String,
    pub room: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub strict_noise_threshold: f64,
    pub active: bool,
}

impl ExamWindow {
    // ---
    pub fn new(
        name: impl Into<String>,
        room: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        strict_noise_threshold: f64,
    ) -> Self {
        // ---
        ExamWindow {
            id: Uuid::new_v4(),
            name: name.into(),
            room: room.into(),
            start,
            end,
            strict_noise_threshold,
            active: true,
        }
    }

    /// Inclusive on both ends.
    pub fn is_ongoing(&self, now: DateTime<Utc>) -> bool {
        self.active && self.start <= now && now <= self.end
    }
}

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceCategory {
    Ac,
    Fan,
    Alarm,
    Screen,
}

text_enum!(DeviceCategory {
    Ac => "AC",
    Fan => "FAN",
    Alarm => "ALARM",
    Screen => "SCREEN",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDevice {
    // ---
    pub id: Uuid,
    pub name: String,
    pub category: DeviceCategory,
    pub location: String,
    pub active: bool,
    pub last_activated: Option<DateTime<Utc>>,
}

impl ControlDevice {
    // ---
    pub fn new(
        name: impl Into<String>,
        category: DeviceCategory,
        location: impl Into<String>,
    ) -> Self {
        // ---
        ControlDevice {
            id: Uuid::new_v4(),
            name: name.into(),
            category,
            location: location.into(),
            active: false,
            last_activated: None,
        }
    }
}

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    TempHigh,
    NoiseHigh,
    AirPoor,
    Anomaly,
    Multiple,
}

text_enum!(AlertKind {
    TempHigh => "TEMP_HIGH",
    NoiseHigh => "NOISE_HIGH",
    AirPoor => "AIR_POOR",
    Anomaly => "ANOMALY",
    Multiple => "MULTIPLE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

text_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Sms,
    Email,
    Screen,
    Whatsapp,
    System,
    Guard,
}

text_enum!(Channel {
    Sms => "SMS",
    Email => "EMAIL",
    Screen => "SCREEN",
    Whatsapp => "WHATSAPP",
    System => "SYSTEM",
    Guard => "GUARD",
});

/// One logical alert. Content is immutable; only resolution fields change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    // ---
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// The reading that raised this alert, if any.
    pub reading_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    // ---
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        message: impl Into<String>,
        reading_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> Self {
        // ---
        AlertEvent {
            id: Uuid::new_v4(),
            kind,
            severity,
            message: message.into(),
            reading_id,
            created_at,
            resolved: false,
            acknowledged_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    TimedOut,
}

text_enum!(DeliveryStatus {
    Sent => "sent",
    Failed => "failed",
    TimedOut => "timed_out",
});

/// Per-channel fan-out record of an [`AlertEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDelivery {
    // ---
    pub id: Uuid,
    pub alert_id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub message: String,
    pub severity: Severity,
    pub status: DeliveryStatus,
    /// Failure reason for non-`Sent` outcomes.
    pub detail: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, min, 0).unwrap()
    }

    #[test]
    fn test_exam_window_bounds_are_inclusive() {
        // ---
        let window = ExamWindow::new("Calculus I", "LT-3", at(9, 0), at(11, 0), 50.0);

        assert!(window.is_ongoing(at(9, 0)));
        assert!(window.is_ongoing(at(10, 30)));
        assert!(window.is_ongoing(at(11, 0)));
        assert!(!window.is_ongoing(at(11, 0) + Duration::seconds(1)));
        assert!(!window.is_ongoing(at(8, 59)));
    }

    #[test]
    fn test_inactive_exam_window_never_ongoing() {
        // ---
        let mut window = ExamWindow::new("Physics", "LT-1", at(9, 0), at(11, 0), 45.0);
        window.active = false;
        assert!(!window.is_ongoing(at(10, 0)));
    }

    #[test]
    fn test_text_enums_parse_their_storage_names() {
        // ---
        assert_eq!("NOISE_HIGH".parse::<AlertKind>().unwrap(), AlertKind::NoiseHigh);
        assert_eq!("FAN".parse::<DeviceCategory>().unwrap(), DeviceCategory::Fan);
        assert_eq!("timed_out".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::TimedOut);
        assert!(matches!(
            "BUZZER".parse::<DeviceCategory>(),
            Err(EngineError::Decode(_))
        ));
    }

    #[test]
    fn test_serde_names_match_storage_names() {
        // ---
        let json = serde_json::to_string(&AlertKind::AirPoor).unwrap();
        assert_eq!(json, "\"AIR_POOR\"");

        let json = serde_json::to_string(&Channel::Sms).unwrap();
        assert_eq!(json, "\"SMS\"");

        let json = serde_json::to_string(&AnomalyType::PoorAirQuality).unwrap();
        assert_eq!(json, "\"poor_air_quality\"");
    }

    #[test]
    fn test_default_config_values() {
        // ---
        let cfg = SystemConfig::default();
        assert_eq!(cfg.temp_threshold, 26.0);
        assert_eq!(cfg.noise_threshold, 60.0);
        assert_eq!(cfg.air_quality_threshold, 55.0);
        assert_eq!(cfg.alert_cooldown_minutes, 5);
        assert!(cfg.alerts_enabled);
    }
}
