//! Threshold policy: resolves the effective thresholds for one evaluation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ExamWindow, SystemConfig};

/// Thresholds in force for a single reading. Recomputed per evaluation and
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveThresholds {
    // ---
    pub temp: f64,
    pub noise: f64,
    pub air_quality: f64,
}

/// Exam windows only override the noise threshold. When several windows are
/// ongoing, the one with the earliest start wins.
pub fn resolve(
    config: &SystemConfig,
    windows: &[ExamWindow],
    now: DateTime<Utc>,
) -> EffectiveThresholds {
    // ---
    let exam = windows
        .iter()
        .filter(|w| w.is_ongoing(now))
        .min_by_key(|w| w.start);

    if let Some(exam) = exam {
        tracing::debug!(
            "Exam '{}' in {} ongoing, noise threshold {} dB",
            exam.name,
            exam.room,
            exam.strict_noise_threshold
        );
    }

    EffectiveThresholds {
        temp: config.temp_threshold,
        noise: exam.map_or(config.noise_threshold, |w| w.strict_noise_threshold),
        air_quality: config.air_quality_threshold,
    }
}
