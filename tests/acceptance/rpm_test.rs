//! Rotation speed acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A drive turning once per 200ms measures exactly 300 rpm on every track
//! - Every delta equals the simulated revolution time
//! - Timer wraparounds during the run leave no trace in the results
//! - The drive is restored to its DOS configuration afterwards

use super::common::{assert_close, config, run_simulated, run_simulated_json, simulated};
use cbm_common::{JobKind, EXTENDED_END_TRACK, STANDARD_END_TRACK, VIRTUAL_TIMER_MODULUS};

#[test]
fn test_standard_disk_at_300_rpm() {
    let (outcome, drive) = run_simulated(config(JobKind::Rpm, 1, STANDARD_END_TRACK, 5));

    assert_eq!(outcome.rpm.len(), 35);
    for (row, track) in outcome.rpm.iter().zip(1u8..) {
        assert_eq!(row.track, track);
        assert_eq!(row.deltas, vec![200_000; 5]);
        assert_close(row.mean_time_us, 200_000.0);
        assert_close(row.rpm, 300.0);
    }

    assert_eq!(drive.jobs_run(), 35 * 6);
    assert!(!drive.vector_table_installed());
}

#[test]
fn test_timer_wraps_during_run() {
    let (outcome, drive) = run_simulated(config(JobKind::Rpm, 1, STANDARD_END_TRACK, 5));

    // The run lasts several periods of the virtual timer.
    assert!(drive.clock_us() > 3 * u64::from(VIRTUAL_TIMER_MODULUS));

    // The extended counter keeps growing across every wrap.
    for pair in outcome.rpm.windows(2) {
        assert!(pair[1].start_tick > pair[0].start_tick);
        let span: u32 = pair[0].deltas.iter().sum();
        assert!(pair[1].start_tick - pair[0].start_tick > span);
    }
}

#[test]
fn test_extended_disk_measures_40_tracks() {
    let mut run = config(JobKind::Rpm, 1, EXTENDED_END_TRACK, 2);
    run.transport.simulated = simulated(200, 0);
    let (outcome, _) = run_simulated(run);

    assert_eq!(outcome.rpm.len(), 40);
    assert_eq!(outcome.rpm.last().map(|row| row.track), Some(40));
}

#[test]
fn test_slow_drive() {
    // 60_000_000 / 206_897 µs per revolution.
    let mut run = config(JobKind::Rpm, 17, 19, 10);
    run.transport.simulated.rotation_period = std::time::Duration::from_micros(206_897);
    let (outcome, _) = run_simulated(run);

    for row in &outcome.rpm {
        assert_eq!(row.deltas, vec![206_897; 10]);
        assert_close(row.rpm, 60_000_000.0 / 206_897.0);
        assert!((row.rpm - 290.0).abs() < 0.01);
    }
}

#[test]
fn test_table_layout() {
    let (outcome, _) = run_simulated(config(JobKind::Rpm, 18, 20, 3));
    let lines: Vec<&str> = outcome.output.lines().collect();

    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with(" TR | timer abs. ||"));
    for (line, track) in lines[3..].iter().zip(18..) {
        assert!(line.starts_with(&format!(" {track} |")), "{line}");
        assert!(line.contains("200000 200000 200000 "));
        assert!(line.ends_with(" 200000.0 | 300.000"));
    }
}

#[test]
fn test_json_records() {
    let records = run_simulated_json(config(JobKind::Rpm, 1, 3, 4));

    assert_eq!(records.len(), 3);
    for (record, track) in records.iter().zip(1u64..) {
        assert_eq!(record["kind"], "rpm");
        assert_eq!(record["track"], track);
        assert_eq!(record["deltas"].as_array().map(Vec::len), Some(4));
        assert_eq!(record["rpm"], 300.0);
        assert_eq!(record["min_delta"], 200_000);
        assert_eq!(record["max_delta"], 200_000);
    }
}
