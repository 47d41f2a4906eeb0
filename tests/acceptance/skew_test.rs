//! Track to track skew acceptance tests.
//!
//! The simulated drive places each track's reference point a fixed time
//! after the previous track's. The measured skew must reproduce that
//! offset, folded into half a revolution either side of zero.

use super::common::{assert_close, config, run_simulated, run_simulated_json, simulated};
use cbm_common::JobKind;
use std::f64::consts::FRAC_PI_2;

#[test]
fn test_quarter_turn_skew() {
    let mut run = config(JobKind::Skew, 1, 35, 5);
    run.transport.simulated = simulated(200, 50);
    let (outcome, _) = run_simulated(run);

    assert_eq!(outcome.skew.len(), 34);
    for (row, track) in outcome.skew.iter().zip(2u8..) {
        assert_eq!((row.previous_track, row.track), (track - 1, track));
        assert_close(row.mean_delta, 200_000.0);
        assert_close(row.rpm, 300.0);
        assert_eq!(row.raw_skew, 50_000);
        assert_close(row.skew, 50_000.0);
        assert_close(row.fraction, 0.25);
        assert_close(row.degrees, 90.0);
        assert_close(row.radians, FRAC_PI_2);
    }
}

#[test]
fn test_skew_shorter_than_head_step_spans_a_revolution() {
    // Stepping and the bus round trips take longer than 12ms, so the
    // next reference point is only seen one revolution later.
    let (outcome, _) = run_simulated(config(JobKind::Skew, 10, 15, 3));

    assert_eq!(outcome.skew.len(), 5);
    for row in &outcome.skew {
        assert_eq!(row.raw_skew, 212_000);
        assert_close(row.skew, 12_000.0);
        assert_close(row.degrees, 21.6);
    }
}

#[test]
fn test_late_reference_folds_negative() {
    let mut run = config(JobKind::Skew, 1, 4, 2);
    run.transport.simulated = simulated(200, 150);
    let (outcome, _) = run_simulated(run);

    for row in &outcome.skew {
        assert_eq!(row.raw_skew, 150_000);
        assert_close(row.skew, -50_000.0);
        assert_close(row.degrees, -90.0);
    }
}

#[test]
fn test_half_turn_stays_positive() {
    let mut run = config(JobKind::Skew, 1, 3, 2);
    run.transport.simulated = simulated(200, 100);
    let (outcome, _) = run_simulated(run);

    for row in &outcome.skew {
        assert_close(row.skew, 100_000.0);
        assert_close(row.degrees, 180.0);
    }
}

#[test]
fn test_single_track_has_no_rows() {
    let (outcome, drive) = run_simulated(config(JobKind::Skew, 18, 18, 5));

    assert!(outcome.skew.is_empty());
    assert_eq!(outcome.output.lines().count(), 3);
    // The track is still sampled.
    assert_eq!(drive.jobs_run(), 6);
}

#[test]
fn test_table_layout() {
    let mut run = config(JobKind::Skew, 1, 3, 5);
    run.transport.simulated = simulated(200, 50);
    let (outcome, _) = run_simulated(run);
    let lines: Vec<&str> = outcome.output.lines().collect();

    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with(" Tracks |mean delta|"));
    assert_eq!(
        lines[3],
        "  1.. 2 |200000.000|300.000|| 50000|  50000.0|  90.000| 1.570796"
    );
}

#[test]
fn test_json_records() {
    let mut run = config(JobKind::Skew, 5, 7, 2);
    run.transport.simulated = simulated(200, 50);
    let records = run_simulated_json(run);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["kind"], "skew");
    assert_eq!(records[0]["previous_track"], 5);
    assert_eq!(records[1]["track"], 7);
    assert_eq!(records[1]["raw_skew"], 50_000);
}
