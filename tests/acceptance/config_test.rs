//! Configuration acceptance tests.
//!
//! Parameters are checked before the drive is touched, and a TOML file
//! fully describes a simulated run.

use super::common::{assert_close, config, run_session, run_simulated, CountingTransport};
use cbm_common::{CbmError, JobKind, MeasurementConfig, SimulatedDriveConfig};
use cbm_transport::SimulatedDrive;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_reversed_range_rejected_before_transport() {
    let mut run = config(JobKind::Rpm, 5, 3, 5);
    let mut transport =
        CountingTransport::new(SimulatedDrive::new(8, &SimulatedDriveConfig::default()));

    let err = run_session(&mut run, &mut transport).unwrap_err();
    assert!(matches!(&err, CbmError::Config(msg) if msg.contains("greater than ending track")));
    assert_eq!(transport.calls, 0);
    assert!(transport.inner.commands().is_empty());
}

#[test]
fn test_out_of_range_parameters_rejected() {
    for (begin, end, drive) in [(0, 35, 8), (1, 43, 8), (1, 35, 7), (1, 35, 12)] {
        let mut run = config(JobKind::Skew, begin, end, 5);
        run.drive = drive;
        let mut transport =
            CountingTransport::new(SimulatedDrive::new(8, &SimulatedDriveConfig::default()));
        assert!(run_session(&mut run, &mut transport).is_err());
        assert_eq!(transport.calls, 0);
    }
}

#[test]
fn test_retries_clamped() {
    let (outcome, _) = run_simulated(config(JobKind::Rpm, 1, 1, 0));
    assert_eq!(outcome.rpm[0].deltas.len(), 1);

    let (outcome, _) = run_simulated(config(JobKind::Rpm, 1, 1, 200));
    assert_eq!(outcome.rpm[0].deltas.len(), 63);
}

#[test]
fn test_toml_file_describes_run() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
job = "skew"
drive = 9
begin_track = 30
end_track = 33
retries = 4

[transport]
driver = "simulated"

[transport.simulated]
rotation_period = "150ms"
track_skew = "30ms"
"#
    )
    .unwrap();

    let run = MeasurementConfig::from_file(file.path()).unwrap();
    assert_eq!(run.drive, 9);
    let (outcome, _) = run_simulated(run);

    assert_eq!(outcome.skew.len(), 3);
    for row in &outcome.skew {
        assert_close(row.rpm, 400.0);
        assert_close(row.degrees, 72.0);
    }
}

#[test]
fn test_failed_initialisation_restores_drive() {
    let mut run = config(JobKind::Rpm, 1, 35, 5);
    let mut transport =
        CountingTransport::failing(SimulatedDrive::new(8, &SimulatedDriveConfig::default()), "I0");

    let err = run_session(&mut run, &mut transport).unwrap_err();
    assert!(matches!(err, CbmError::Transport { .. }));

    let drive = &transport.inner;
    assert!(!drive.vector_table_installed());
    assert_eq!(drive.commands(), ["U4", "U5", "U6", "I"]);
    assert_eq!(drive.jobs_run(), 0);
}
