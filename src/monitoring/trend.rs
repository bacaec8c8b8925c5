//! Trend sampling: windowed, ordered metric series projected onto a canvas.
//!
//! Non-finite values are dropped rather than interpolated, so a gap just
//! shows up as uneven spacing between the surviving points.

use chrono::{DateTime, Duration, Utc};

use crate::config::{HUMIDITY_CEILING_HINT, TEMPERATURE_CEILING_HINT};
use crate::models::enums::TrendMetric;
use crate::models::SensorReading;

use super::types::{Point, TrendEntry, TrendRequest};

pub const DEFAULT_CANVAS_WIDTH: f64 = 300.0;
pub const DEFAULT_CANVAS_HEIGHT: f64 = 80.0;

impl TrendRequest {
    /// Default canvas and the metric's nominal ceiling.
    pub fn for_metric(metric: TrendMetric, window: Duration) -> Self {
        Self {
            metric,
            window,
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            ceiling_hint: ceiling_hint(metric),
        }
    }
}

pub fn ceiling_hint(metric: TrendMetric) -> f64 {
    match metric {
        TrendMetric::Temperature => TEMPERATURE_CEILING_HINT,
        TrendMetric::Humidity => HUMIDITY_CEILING_HINT,
    }
}

/// Readings recorded within `window` of `now`, oldest first. Readings with
/// no timestamp cannot be placed in the window and are left out. A window
/// reaching past the representable range keeps every timed reading.
pub fn windowed<'a>(
    readings: &'a [SensorReading],
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<&'a SensorReading> {
    let start = now.checked_sub_signed(window);
    let mut inside: Vec<&SensorReading> = readings
        .iter()
        .filter(|r| {
            r.recorded_at
                .is_some_and(|at| start.map_or(true, |start| at >= start))
        })
        .collect();
    inside.sort_by_key(|r| (r.recorded_at, r.ingest_seq));
    inside
}

/// Map values to canvas coordinates.
///
/// x spreads points evenly across the width (a single point sits at 0).
/// y is inverted canvas space over the range
/// `max(observed_max, ceiling) - min(observed_min, 0)`.
pub fn project(values: &[f64], canvas_width: f64, canvas_height: f64, ceiling_hint: f64) -> Vec<Point> {
    let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return Vec::new();
    }

    let max = values.iter().copied().fold(ceiling_hint, f64::max);
    let min = values.iter().copied().fold(0.0, f64::min);
    let range = if max - min == 0.0 { 1.0 } else { max - min };
    let last_index = (values.len() - 1).max(1) as f64;

    values
        .iter()
        .enumerate()
        .map(|(i, value)| Point {
            x: i as f64 / last_index * canvas_width,
            y: canvas_height - (value - min) / range * canvas_height,
        })
        .collect()
}

/// Sample one metric for visualization.
pub fn sample(readings: &[SensorReading], request: &TrendRequest, now: DateTime<Utc>) -> Vec<Point> {
    let values: Vec<f64> = windowed(readings, request.window, now)
        .into_iter()
        .filter_map(|r| r.metric(request.metric))
        .collect();

    project(
        &values,
        request.canvas_width,
        request.canvas_height,
        request.ceiling_hint,
    )
}

/// Raw windowed series for the `box-status` document. Entries keep a
/// `null` value when the reading lacks the metric.
pub fn trend_series(
    readings: &[SensorReading],
    metric: TrendMetric,
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<TrendEntry> {
    windowed(readings, window, now)
        .into_iter()
        .filter_map(|r| {
            r.recorded_at.map(|recorded_at| TrendEntry {
                user_id: r.device_user_id.clone(),
                recorded_at,
                value: r.metric(metric),
            })
        })
        .collect()
}
