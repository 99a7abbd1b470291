//! Maps an insights snapshot to prioritized guidance.

use serde::Serialize;

use super::InsightsSnapshot;

const TEMP_TREND_LIMIT: f64 = 8.0;
const AIR_TREND_LIMIT: f64 = 15.0;
const NOISE_TREND_LIMIT: f64 = 20.0;
/// Peak hours quieter than this are not worth reporting.
const PEAK_NOISE_LEVEL: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: &'static str,
    pub message: String,
}

impl Recommendation {
    fn new(priority: Priority, category: &'static str, message: impl Into<String>) -> Self {
        Recommendation {
            priority,
            category,
            message: message.into(),
        }
    }
}

/// Never empty: with no matching rule a single `info` item is returned.
/// Ordered by priority, rule order within a priority.
pub fn recommend(snapshot: &InsightsSnapshot) -> Vec<Recommendation> {
    // ---
    let mut out = Vec::new();
    let trends = &snapshot.trends;

    if trends.temperature > TEMP_TREND_LIMIT {
        out.push(Recommendation::new(
            Priority::High,
            "temperature",
            "Significant temperature increase detected. Check the HVAC system, \
             increase ventilation and look for overheating equipment.",
        ));
    }

    if trends.air_quality > AIR_TREND_LIMIT {
        out.push(Recommendation::new(
            Priority::Medium,
            "air_quality",
            "Air quality declining. Verify air filters, increase fresh air intake \
             and schedule an air quality audit.",
        ));
    }

    if trends.noise > NOISE_TREND_LIMIT {
        out.push(Recommendation::new(
            Priority::Medium,
            "noise",
            "Noise levels increasing. Consider soundproofing or moving maintenance \
             to quieter hours.",
        ));
    }

    if let Some(peak) = snapshot.peak_hours.first() {
        if peak.average > PEAK_NOISE_LEVEL {
            out.push(Recommendation::new(
                Priority::Low,
                "noise",
                format!(
                    "Noise peaks at {:02}:00 ({} dB on average). Avoid scheduling quiet \
                     activities in this hour.",
                    peak.hour, peak.average
                ),
            ));
        }
    }

    if snapshot.patterns.temperature.is_some_and(|p| p.has_spikes) {
        out.push(Recommendation::new(
            Priority::Medium,
            "temperature",
            "Temperature spikes detected. Check for equipment faults or door and \
             window opening patterns.",
        ));
    }

    if snapshot.patterns.air_quality.is_some_and(|p| p.has_spikes) {
        out.push(Recommendation::new(
            Priority::Low,
            "air_quality",
            "Short air quality spikes detected. Look for intermittent pollution sources nearby.",
        ));
    }

    if out.is_empty() {
        out.push(Recommendation::new(
            Priority::Info,
            "system",
            "All parameters within optimal ranges. Continue regular monitoring.",
        ));
    }

    out.sort_by_key(|r| r.priority);
    out
}
