//! Rule evaluation for a single reading.
//!
//! Evaluation is pure: it decides which device categories to actuate and
//! which alerts are candidates. Cooldown gating and every side effect happen
//! afterwards, in the engine's commit phase.

use crate::models::{
    AlertKind, AnomalyType, DeviceCategory, Reading, ReadingFlags, Severity, SystemConfig,
};

use super::thresholds::EffectiveThresholds;

/// An alert the rules want to raise, subject to cooldown.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    // ---
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
}

/// Outcome of evaluating every rule against one reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    // ---
    /// Categories gated by the auto-enable flags, in rule order.
    pub actuate: Vec<DeviceCategory>,
    /// Candidates in rule order: temperature, air quality, noise, anomaly.
    pub alerts: Vec<AlertCandidate>,
    /// `alert_sent` is left for the commit phase, it depends on cooldown.
    pub flags: ReadingFlags,
}

pub fn evaluate(
    reading: &Reading,
    thresholds: &EffectiveThresholds,
    config: &SystemConfig,
) -> Evaluation {
    // ---
    let mut eval = Evaluation::default();

    // 1. Temperature: auto AC
    if reading.temperature > thresholds.temp && config.auto_ac_enabled {
        eval.actuate.push(DeviceCategory::Ac);
        eval.flags.ac_activated = true;

        if config.alerts_enabled {
            eval.alerts.push(AlertCandidate {
                kind: AlertKind::TempHigh,
                severity: Severity::Medium,
                message: format!(
                    "High temperature detected: {}°C. AC activated automatically.",
                    reading.temperature
                ),
            });
        }
    }

    // 2. Air quality: auto ventilation
    if reading.air_quality > thresholds.air_quality && config.auto_ventilation_enabled {
        eval.actuate.push(DeviceCategory::Fan);
        eval.flags.ventilation_activated = true;

        if config.alerts_enabled {
            eval.alerts.push(AlertCandidate {
                kind: AlertKind::AirPoor,
                severity: Severity::Medium,
                message: format!(
                    "Poor air quality: {} AQI. Ventilation activated.",
                    reading.air_quality
                ),
            });
        }
    }

    // 3. Noise: alert only, the screen is driven by the alert itself
    if reading.noise_level > thresholds.noise && config.alerts_enabled {
        eval.alerts.push(AlertCandidate {
            kind: AlertKind::NoiseHigh,
            severity: Severity::High,
            message: format!(
                "HIGH NOISE ALERT: {} dB detected (limit {} dB). Please investigate.",
                reading.noise_level, thresholds.noise
            ),
        });
    }

    // 4. Rule-based anomaly classification
    let anomaly = classify_anomaly(reading, thresholds);
    eval.flags.is_anomaly = anomaly.is_some();
    eval.flags.anomaly_type = anomaly;

    if let Some(anomaly) = anomaly {
        if config.ai_analysis_enabled && config.alerts_enabled {
            eval.alerts.push(AlertCandidate {
                kind: AlertKind::Anomaly,
                severity: Severity::Medium,
                message: format!(
                    "Anomaly detected on {}: {} (T {}°C, AQ {}, N {} dB)",
                    reading.device_id,
                    anomaly,
                    reading.temperature,
                    reading.air_quality,
                    reading.noise_level
                ),
            });
        }
    }

    eval
}

/// Single-valued classification, first match wins:
/// temperature, then noise, then air quality.
pub fn classify_anomaly(
    reading: &Reading,
    thresholds: &EffectiveThresholds,
) -> Option<AnomalyType> {
    // ---
    if reading.temperature > thresholds.temp {
        Some(AnomalyType::HighTemperature)
    } else if reading.noise_level > thresholds.noise {
        Some(AnomalyType::HighNoise)
    } else if reading.air_quality > thresholds.air_quality {
        Some(AnomalyType::PoorAirQuality)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reading(temperature: f64, air_quality: f64, noise_level: f64) -> Reading {
        // ---
        let ts = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        Reading::new("lab-1", ts, temperature, air_quality, noise_level)
    }

    fn thresholds() -> EffectiveThresholds {
        EffectiveThresholds {
            temp: 26.0,
            noise: 60.0,
            air_quality: 55.0,
        }
    }

    fn kinds(eval: &Evaluation) -> Vec<AlertKind> {
        eval.alerts.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn test_values_at_threshold_trigger_nothing() {
        // ---
        let eval = evaluate(&reading(26.0, 55.0, 60.0), &thresholds(), &SystemConfig::default());

        assert!(eval.actuate.is_empty());
        assert!(eval.alerts.is_empty());
        assert_eq!(eval.flags, ReadingFlags::default());
    }

    #[test]
    fn test_high_temperature_actuates_ac_and_alerts() {
        // ---
        let eval = evaluate(&reading(30.5, 40.0, 40.0), &thresholds(), &SystemConfig::default());

        assert_eq!(eval.actuate, vec![DeviceCategory::Ac]);
        assert!(eval.flags.ac_activated);
        assert_eq!(kinds(&eval), vec![AlertKind::TempHigh, AlertKind::Anomaly]);
        assert_eq!(eval.alerts[0].severity, Severity::Medium);
        assert!(eval.alerts[0].message.contains("30.5"));
    }

    #[test]
    fn test_auto_ac_disabled_suppresses_actuation_and_alert() {
        // ---
        let cfg = SystemConfig {
            auto_ac_enabled: false,
            ai_analysis_enabled: false,
            ..SystemConfig::default()
        };
        let eval = evaluate(&reading(30.0, 40.0, 40.0), &thresholds(), &cfg);

        assert!(eval.actuate.is_empty());
        assert!(!eval.flags.ac_activated);
        assert!(eval.alerts.is_empty());
        // Classification still annotates the reading.
        assert!(eval.flags.is_anomaly);
    }

    #[test]
    fn test_poor_air_actuates_fan() {
        // ---
        let eval = evaluate(&reading(20.0, 70.0, 40.0), &thresholds(), &SystemConfig::default());

        assert_eq!(eval.actuate, vec![DeviceCategory::Fan]);
        assert!(eval.flags.ventilation_activated);
        assert_eq!(kinds(&eval), vec![AlertKind::AirPoor, AlertKind::Anomaly]);
    }

    #[test]
    fn test_noise_alerts_without_device_actuation() {
        // ---
        let eval = evaluate(&reading(20.0, 40.0, 75.0), &thresholds(), &SystemConfig::default());

        assert!(eval.actuate.is_empty());
        assert_eq!(kinds(&eval), vec![AlertKind::NoiseHigh, AlertKind::Anomaly]);
        assert_eq!(eval.alerts[0].severity, Severity::High);
        // Decided at commit time, after the cooldown check.
        assert!(!eval.flags.alert_sent);
    }

    #[test]
    fn test_alerts_disabled_still_actuates() {
        // ---
        let cfg = SystemConfig {
            alerts_enabled: false,
            ..SystemConfig::default()
        };
        let eval = evaluate(&reading(30.0, 70.0, 75.0), &thresholds(), &cfg);

        assert_eq!(eval.actuate, vec![DeviceCategory::Ac, DeviceCategory::Fan]);
        assert!(eval.alerts.is_empty());
    }

    #[test]
    fn test_anomaly_priority_order() {
        // ---
        let t = thresholds();
        assert_eq!(
            classify_anomaly(&reading(30.0, 70.0, 75.0), &t),
            Some(AnomalyType::HighTemperature)
        );
        assert_eq!(
            classify_anomaly(&reading(20.0, 70.0, 75.0), &t),
            Some(AnomalyType::HighNoise)
        );
        assert_eq!(
            classify_anomaly(&reading(20.0, 70.0, 40.0), &t),
            Some(AnomalyType::PoorAirQuality)
        );
        assert_eq!(classify_anomaly(&reading(20.0, 40.0, 40.0), &t), None);
    }

    #[test]
    fn test_all_signals_high() {
        // ---
        let eval = evaluate(&reading(31.0, 80.0, 90.0), &thresholds(), &SystemConfig::default());

        assert_eq!(eval.actuate, vec![DeviceCategory::Ac, DeviceCategory::Fan]);
        assert_eq!(
            kinds(&eval),
            vec![
                AlertKind::TempHigh,
                AlertKind::AirPoor,
                AlertKind::NoiseHigh,
                AlertKind::Anomaly
            ]
        );
        assert_eq!(eval.flags.anomaly_type, Some(AnomalyType::HighTemperature));
    }
}
