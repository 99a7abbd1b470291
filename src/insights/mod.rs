//! Statistical insights over a window of historical readings (EMBP gateway).
//!
//! Everything here is a pure function of the input slice: same ordered
//! readings in, same snapshot out.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::models::Reading;

mod recommend;
mod stats;

pub use recommend::{recommend, Priority, Recommendation};

/// Stability/spike flags need more samples than this.
const MIN_PATTERN_SAMPLES: usize = 10;
const PEAK_HOURS: usize = 3;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    AirQuality,
    Noise,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::AirQuality => "air_quality",
            Metric::Noise => "noise",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per monitored metric.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricSet<T> {
    pub temperature: T,
    pub air_quality: T,
    pub noise: T,
}

impl<T> MetricSet<T> {
    // ---
    fn from_fn(mut f: impl FnMut(Metric) -> T) -> Self {
        MetricSet {
            temperature: f(Metric::Temperature),
            air_quality: f(Metric::AirQuality),
            noise: f(Metric::Noise),
        }
    }

    pub fn get(&self, metric: Metric) -> &T {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::AirQuality => &self.air_quality,
            Metric::Noise => &self.noise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pattern {
    /// Standard deviation below 10% of the mean.
    pub stable: bool,
    /// Some sample lies more than 2 standard deviations from the mean.
    pub has_spikes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub first: Metric,
    pub second: Metric,
    pub coefficient: f64,
}

impl Correlation {
    pub fn name(&self) -> String {
        format!("{}_vs_{}", self.first, self.second)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakHour {
    pub hour: u32,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightsSnapshot {
    // ---
    pub sample_count: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Percent change, first vs last samples.
    pub trends: MetricSet<f64>,
    /// `None` when the window is too short to judge.
    pub patterns: MetricSet<Option<Pattern>>,
    pub correlations: Vec<Correlation>,
    /// Loudest hours of day (UTC), highest mean noise first.
    pub peak_hours: Vec<PeakHour>,
    pub statistics: MetricSet<Summary>,
}

// ---

/// Compute a snapshot over readings ordered by timestamp.
///
/// An empty window is [`EngineError::NoData`], never a zero-filled snapshot.
pub fn compute_insights(readings: &[Reading]) -> Result<InsightsSnapshot> {
    // ---
    let (Some(first), Some(last)) = (readings.first(), readings.last()) else {
        return Err(EngineError::NoData);
    };

    let series = MetricSet::from_fn(|metric| {
        readings
            .iter()
            .map(|r| match metric {
                Metric::Temperature => r.temperature,
                Metric::AirQuality => r.air_quality,
                Metric::Noise => r.noise_level,
            })
            .collect::<Vec<f64>>()
    });

    Ok(InsightsSnapshot {
        sample_count: readings.len(),
        window_start: first.timestamp,
        window_end: last.timestamp,
        trends: MetricSet::from_fn(|m| stats::trend(series.get(m))),
        patterns: MetricSet::from_fn(|m| detect_pattern(series.get(m))),
        correlations: correlations(&series),
        peak_hours: peak_hours(readings),
        statistics: MetricSet::from_fn(|m| summarize(series.get(m))),
    })
}

fn detect_pattern(values: &[f64]) -> Option<Pattern> {
    // ---
    if values.len() <= MIN_PATTERN_SAMPLES {
        return None;
    }
    let mean = stats::mean(values);
    let std = stats::std_dev(values);

    Some(Pattern {
        stable: std < mean * 0.1,
        has_spikes: values.iter().any(|v| (v - mean).abs() > 2.0 * std),
    })
}

fn correlations(series: &MetricSet<Vec<f64>>) -> Vec<Correlation> {
    // ---
    let pairs = [
        (Metric::Temperature, Metric::AirQuality),
        (Metric::Temperature, Metric::Noise),
        (Metric::AirQuality, Metric::Noise),
    ];

    pairs
        .into_iter()
        .filter_map(|(first, second)| {
            stats::pearson(series.get(first), series.get(second)).map(|r| Correlation {
                first,
                second,
                coefficient: stats::round_to(r, 3),
            })
        })
        .collect()
}

/// Mean noise per hour of day; top 3, ties resolved by the earlier hour.
fn peak_hours(readings: &[Reading]) -> Vec<PeakHour> {
    // ---
    let mut by_hour: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for r in readings {
        by_hour.entry(r.timestamp.hour()).or_default().push(r.noise_level);
    }

    let mut ranked: Vec<(u32, f64)> = by_hour
        .into_iter()
        .map(|(hour, values)| (hour, stats::mean(&values)))
        .collect();
    // Stable sort over ascending hours keeps the earlier hour first on ties.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
        .into_iter()
        .take(PEAK_HOURS)
        .map(|(hour, avg)| PeakHour {
            hour,
            average: stats::round_to(avg, 1),
        })
        .collect()
}

fn summarize(values: &[f64]) -> Summary {
    // ---
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Summary {
        min: stats::round_to(min, 1),
        max: stats::round_to(max, 1),
        avg: stats::round_to(stats::mean(values), 1),
        std: stats::round_to(stats::std_dev(values), 1),
    }
}
