//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Building simulated drive configurations
//! - Running a complete session the way the command line tool does
//! - Counting transport traffic

#![allow(dead_code)]

use cbm_common::{
    CbmError, CbmResult, DeviceStatus, JobKind, MeasurementConfig, OutputFormat, SimulatedDriveConfig,
    TransportDriver,
};
use cbm_rpm::report::reporter_for;
use cbm_rpm::{measure_rpm, measure_skew, DriveSession, RpmResult, SkewResult};
use cbm_transport::{DriveTransport, SimulatedDrive};
use std::time::Duration;

/// Placeholder job code blob, the simulated drive only stores it.
pub const JOB_CODE: [u8; 16] = [
    0x4c, 0x00, 0x05, 0x03, 0x05, 0x78, 0xa9, 0x00, 0x8d, 0x0b, 0x18, 0x58, 0x60, 0xea, 0xea, 0xea,
];

/// Simulated drive turning once per `period_ms` with `skew_ms` between tracks.
pub fn simulated(period_ms: u64, skew_ms: u64) -> SimulatedDriveConfig {
    SimulatedDriveConfig {
        rotation_period: Duration::from_millis(period_ms),
        track_skew: Duration::from_millis(skew_ms),
        ..SimulatedDriveConfig::default()
    }
}

/// Measurement configuration for a track range on drive 8.
pub fn config(job: JobKind, begin: u8, end: u8, retries: u8) -> MeasurementConfig {
    let mut config = MeasurementConfig {
        job,
        begin_track: begin,
        end_track: end,
        retries,
        ..MeasurementConfig::default()
    };
    config.transport.driver = TransportDriver::Simulated;
    config
}

/// Results and output of one complete session.
#[derive(Debug, Default)]
pub struct Outcome {
    pub rpm: Vec<RpmResult>,
    pub skew: Vec<SkewResult>,
    pub output: String,
}

/// Validate `config` and run one complete session on `transport`.
pub fn run_session<T: DriveTransport>(
    config: &mut MeasurementConfig,
    mut transport: T,
) -> CbmResult<(Outcome, T)> {
    config.validate()?;

    let mut out = Vec::new();
    let mut outcome = Outcome::default();
    {
        let mut reporter = reporter_for(config.output, &mut out);
        let mut session = DriveSession::open(&mut transport, config.drive, &JOB_CODE)?;
        let (begin, end, retries) = (config.begin_track, config.end_track, config.retries);
        match config.job {
            JobKind::Rpm => {
                outcome.rpm = measure_rpm(session.sampler(), begin, end, retries, reporter.as_mut())?;
            }
            JobKind::Skew => {
                outcome.skew =
                    measure_skew(session.sampler(), begin, end, retries, reporter.as_mut())?;
            }
        }
        session.close()?;
    }
    outcome.output = String::from_utf8(out).expect("reports are UTF-8");
    Ok((outcome, transport))
}

/// Run `config` on a fresh simulated drive built from its own settings.
pub fn run_simulated(mut config: MeasurementConfig) -> (Outcome, SimulatedDrive) {
    let drive = SimulatedDrive::new(config.drive, &config.transport.simulated);
    run_session(&mut config, drive).expect("simulated session succeeds")
}

/// Same as [`run_simulated`] with JSON lines output.
pub fn run_simulated_json(mut config: MeasurementConfig) -> Vec<serde_json::Value> {
    config.output = OutputFormat::Json;
    let (outcome, _) = run_simulated(config);
    outcome
        .output
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid JSON line"))
        .collect()
}

/// Transport wrapper counting every call that reaches the drive.
#[derive(Debug)]
pub struct CountingTransport<T> {
    pub inner: T,
    pub calls: usize,
    /// Command that fails on the bus instead of reaching the drive.
    pub failing_command: Option<&'static str>,
}

impl<T> CountingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            calls: 0,
            failing_command: None,
        }
    }

    pub fn failing(inner: T, command: &'static str) -> Self {
        Self {
            failing_command: Some(command),
            ..Self::new(inner)
        }
    }
}

impl<T: DriveTransport> DriveTransport for CountingTransport<T> {
    fn exec_command(&mut self, device: u8, command: &[u8]) -> CbmResult<()> {
        self.calls += 1;
        if self.failing_command.map(str::as_bytes) == Some(command) {
            return Err(CbmError::transport("exec_command", "no answer from drive"));
        }
        self.inner.exec_command(device, command)
    }

    fn device_status(&mut self, device: u8) -> CbmResult<DeviceStatus> {
        self.calls += 1;
        self.inner.device_status(device)
    }

    fn upload(&mut self, device: u8, address: u16, data: &[u8]) -> CbmResult<usize> {
        self.calls += 1;
        self.inner.upload(device, address, data)
    }

    fn download(&mut self, device: u8, address: u16, buf: &mut [u8]) -> CbmResult<usize> {
        self.calls += 1;
        self.inner.download(device, address, buf)
    }

    fn reset(&mut self) -> CbmResult<()> {
        self.calls += 1;
        self.inner.reset()
    }
}

/// Tolerance for values derived from whole microsecond ticks.
pub const EPSILON: f64 = 1e-9;

/// Assert `actual` is within [`EPSILON`] of `expected`.
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPSILON,
        "expected {expected}, got {actual}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_transport_counts_calls() {
        let drive = SimulatedDrive::new(8, &SimulatedDriveConfig::default());
        let mut transport = CountingTransport::new(drive);
        transport.exec_command(8, b"I").unwrap();
        transport.device_status(8).unwrap();
        assert_eq!(transport.calls, 2);
    }

    #[test]
    fn test_simulated_config_defaults() {
        let config = simulated(150, 30);
        assert_eq!(config.rotation_period, Duration::from_millis(150));
        assert_eq!(config.command_latency, Duration::from_millis(4));
    }
}
