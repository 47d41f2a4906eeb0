//! Rotation speed and track skew statistics.
//!
//! All tick values are virtual timer ticks, which are microseconds at the
//! drive's 1 MHz clock.

use crate::sampler::TrackMeasurement;
use serde::Serialize;
use std::f64::consts::TAU;

/// Microseconds per minute at the 1 MHz drive clock.
pub const TICKS_PER_MINUTE: f64 = 60_000_000.0;

/// Rotation speed of one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpmResult {
    /// Measured track.
    pub track: u8,
    /// Extended tick of the first snapshot.
    pub start_tick: u32,
    /// Intervals between consecutive snapshots (µs).
    pub deltas: Vec<u32>,
    /// Shortest interval (µs).
    pub min_delta: u32,
    /// Longest interval (µs).
    pub max_delta: u32,
    /// Mean time of one revolution (µs).
    pub mean_time_us: f64,
    /// Revolutions per minute.
    pub rpm: f64,
}

/// Mean revolution time and RPM for `span` ticks over `retries` revolutions.
#[must_use]
pub fn mean_rotation(span: u32, retries: usize) -> (f64, f64) {
    let mean_time = f64::from(span) / retries.max(1) as f64;
    (mean_time, TICKS_PER_MINUTE / mean_time)
}

/// Reduce one track's measurement to its rotation speed.
#[must_use]
pub fn analyze_rpm(measurement: &TrackMeasurement) -> RpmResult {
    let (mean_time_us, rpm) = mean_rotation(measurement.span(), measurement.retries());
    let (min_delta, max_delta) = measurement.delta_range().unwrap_or_default();
    RpmResult {
        track: measurement.track,
        start_tick: measurement.start_tick,
        deltas: measurement.deltas.clone(),
        min_delta,
        max_delta,
        mean_time_us,
        rpm,
    }
}

/// Phase offset between two adjacent tracks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkewResult {
    /// The earlier measured track.
    pub previous_track: u8,
    /// The later measured track.
    pub track: u8,
    /// Mean revolution time over both tracks (µs).
    pub mean_delta: f64,
    /// Revolutions per minute of the later track.
    pub rpm: f64,
    /// Ticks from the last snapshot of the previous track to the first of this one.
    pub raw_skew: u32,
    /// Raw skew reduced into `(-mean_delta / 2, mean_delta / 2]` (µs).
    pub skew: f64,
    /// Skew as a fraction of one revolution.
    pub fraction: f64,
    /// Skew in degrees.
    pub degrees: f64,
    /// Skew in radians.
    pub radians: f64,
}

/// Reduce `raw_skew` modulo one revolution into `(-mean_delta / 2, mean_delta / 2]`.
#[must_use]
pub fn fold_skew(raw_skew: u32, mean_delta: f64) -> f64 {
    if mean_delta <= 0.0 {
        return 0.0;
    }
    let mut skew = f64::from(raw_skew) % mean_delta;
    // move from range 0..1 into range -0.5..0.5
    if 2.0 * skew > mean_delta {
        skew -= mean_delta;
    }
    skew
}

/// Compare two tracks sampled back to back with the same retry count.
#[must_use]
pub fn analyze_skew(
    previous: &TrackMeasurement,
    current: &TrackMeasurement,
    retries: u8,
) -> SkewResult {
    let retries = f64::from(retries.max(1));
    let total = u64::from(current.span()) + u64::from(previous.span());
    let mean_delta = total as f64 / (2.0 * retries);
    let rpm = TICKS_PER_MINUTE * retries / f64::from(current.span());

    let raw_skew = current.start_tick.wrapping_sub(previous.end_tick);
    let skew = fold_skew(raw_skew, mean_delta);
    let fraction = if mean_delta > 0.0 { skew / mean_delta } else { 0.0 };

    SkewResult {
        previous_track: previous.track,
        track: current.track,
        mean_delta,
        rpm,
        raw_skew,
        skew,
        fraction,
        degrees: fraction * 360.0,
        radians: fraction * TAU,
    }
}
