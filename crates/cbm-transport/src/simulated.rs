//! Simulated 1541 running the measurement job code.
//!
//! The model keeps a microsecond clock that only advances through bus
//! traffic, head stepping and waiting for the rotating disk, so every
//! run is deterministic. Both VIA timers decrement once per
//! microsecond from a common seed, which makes the reconstructed
//! virtual timer exactly `seed - elapsed` modulo its period.

use crate::DriveTransport;
use cbm_common::config::{SimulatedDriveConfig, MAX_TRACK, MIN_TRACK};
use cbm_common::error::{CbmError, CbmResult};
use cbm_common::jobcode::{
    RawTimerSample, UxCommand, COMMAND_VECTOR_TABLE, TIMER_SNAPSHOT, UX_VECTOR_DEFAULT,
    UX_VECTOR_POINTER, VIA1_TIMER2_MODULUS, VIA2_TIMER2_MODULUS, VIRTUAL_TIMER_MODULUS,
};
use cbm_common::status::DeviceStatus;
use tracing::{debug, trace};

/// Size of the 1541 drive RAM.
pub const RAM_SIZE: usize = 0x0800;

/// Track the head rests on after power up and `I`.
const DIRECTORY_TRACK: u8 = 18;

/// In-memory 1541 for tests and demonstrations.
#[derive(Debug)]
pub struct SimulatedDrive {
    device: u8,
    rotation_period_us: u64,
    track_skew_us: u64,
    command_latency_us: u64,
    step_time_us: u64,
    timer_seed: u32,
    ram: Box<[u8; RAM_SIZE]>,
    clock_us: u64,
    timers_started_at: Option<u64>,
    head_track: u8,
    status: DeviceStatus,
    jobs_run: u64,
    commands: Vec<String>,
}

fn duration_us(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl SimulatedDrive {
    /// Create a simulated drive answering as IEC `device`.
    pub fn new(device: u8, config: &SimulatedDriveConfig) -> Self {
        let mut drive = Self {
            device,
            rotation_period_us: duration_us(config.rotation_period).max(1),
            track_skew_us: duration_us(config.track_skew),
            command_latency_us: duration_us(config.command_latency),
            step_time_us: duration_us(config.step_time),
            timer_seed: config.timer_seed % VIRTUAL_TIMER_MODULUS,
            ram: Box::new([0u8; RAM_SIZE]),
            clock_us: 0,
            timers_started_at: None,
            head_track: DIRECTORY_TRACK,
            status: DeviceStatus::ok(),
            jobs_run: 0,
            commands: Vec::new(),
        };
        drive.power_on();
        drive
    }

    fn power_on(&mut self) {
        self.write_vector(UX_VECTOR_DEFAULT);
        self.timers_started_at = None;
        self.head_track = DIRECTORY_TRACK;
        self.status = DeviceStatus::new(73, "CBM DOS V2.6 1541", 0, 0);
    }

    fn write_vector(&mut self, vector: u16) {
        let at = usize::from(UX_VECTOR_POINTER);
        self.ram[at..at + 2].copy_from_slice(&vector.to_le_bytes());
    }

    fn read_vector(&self) -> u16 {
        let at = usize::from(UX_VECTOR_POINTER);
        u16::from_le_bytes([self.ram[at], self.ram[at + 1]])
    }

    /// Current simulated time in microseconds.
    pub fn clock_us(&self) -> u64 {
        self.clock_us
    }

    /// Number of timing jobs executed so far.
    pub fn jobs_run(&self) -> u64 {
        self.jobs_run
    }

    /// Every command string received, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Whether the job code's `U` vector table is currently installed.
    pub fn vector_table_installed(&self) -> bool {
        self.read_vector() == COMMAND_VECTOR_TABLE
    }

    /// Whether the 23 bit timers are running.
    pub fn timers_running(&self) -> bool {
        self.timers_started_at.is_some()
    }

    /// Virtual timer value at the current time, if the timers run.
    pub fn virtual_timer(&self) -> Option<u32> {
        let started = self.timers_started_at?;
        let modulus = u64::from(VIRTUAL_TIMER_MODULUS);
        let elapsed = (self.clock_us - started) % modulus;
        let value = (u64::from(self.timer_seed) + modulus - elapsed) % modulus;
        u32::try_from(value).ok()
    }

    /// Register snapshot for a virtual timer value.
    pub fn encode_timer(value: u32) -> RawTimerSample {
        let via1 = value % VIA1_TIMER2_MODULUS;
        let via2 = value % VIA2_TIMER2_MODULUS;
        RawTimerSample {
            via2_timer2_low: via2.to_le_bytes()[0],
            via1_timer2_low: via1.to_le_bytes()[0],
            via1_timer2_high: via1.to_le_bytes()[1],
        }
    }

    fn check_device(&self, device: u8, operation: &'static str) -> CbmResult<()> {
        if device == self.device {
            Ok(())
        } else {
            Err(CbmError::transport(
                operation,
                format!("device {device} not present"),
            ))
        }
    }

    fn bus_transfer(&mut self) {
        self.clock_us += self.command_latency_us;
    }

    fn step_to(&mut self, track: u8) {
        let distance = u64::from(track.abs_diff(self.head_track));
        self.clock_us += distance * self.step_time_us;
        self.head_track = track;
    }

    /// Rotational phase of the reference point on `track`.
    fn track_phase(&self, track: u8) -> u64 {
        (u64::from(track - MIN_TRACK) * self.track_skew_us) % self.rotation_period_us
    }

    fn wait_for_reference(&mut self, track: u8) {
        let period = self.rotation_period_us;
        let position = self.clock_us % period;
        let wait = (self.track_phase(track) + period - position) % period;
        self.clock_us += wait;
    }

    fn run_job(&mut self, args: &str) {
        let mut fields = args.split_whitespace().map(str::parse::<u8>);
        let track = match (fields.next(), fields.next()) {
            (Some(Ok(track)), Some(Ok(_sector))) => track,
            _ => {
                self.status = DeviceStatus::new(30, "SYNTAX ERROR", 0, 0);
                return;
            }
        };
        if !(MIN_TRACK..=MAX_TRACK).contains(&track) {
            self.status = DeviceStatus::new(66, "ILLEGAL TRACK OR SECTOR", track, 0);
            return;
        }
        if self.timers_started_at.is_none() {
            self.status = DeviceStatus::new(31, "SYNTAX ERROR", 0, 0);
            return;
        }

        self.step_to(track);
        self.wait_for_reference(track);

        let value = self.virtual_timer().unwrap_or_default();
        let at = usize::from(TIMER_SNAPSHOT);
        self.ram[at..at + RawTimerSample::SIZE]
            .copy_from_slice(&Self::encode_timer(value).to_bytes());
        self.jobs_run += 1;
        trace!(track, clock_us = self.clock_us, value, "job sampled timers");
    }

    fn run_ux(&mut self, command: UxCommand, args: &str) {
        match command {
            UxCommand::ExecuteJobInBuffer => self.run_job(args),
            UxCommand::Init23BitTimers => {
                self.timers_started_at = Some(self.clock_us);
                debug!(clock_us = self.clock_us, "23 bit timers started");
            }
            UxCommand::ResetVia2ShiftRegConfig => {}
            UxCommand::ResetUxVectorTable => self.write_vector(UX_VECTOR_DEFAULT),
        }
    }
}

impl DriveTransport for SimulatedDrive {
    fn exec_command(&mut self, device: u8, command: &[u8]) -> CbmResult<()> {
        self.check_device(device, "exec_command")?;
        self.bus_transfer();

        let text = String::from_utf8_lossy(command).into_owned();
        self.commands.push(text.clone());
        self.status = DeviceStatus::ok();

        match command {
            [b'U', letter, rest @ ..] => {
                let args = String::from_utf8_lossy(rest);
                match UxCommand::from_letter(*letter) {
                    Some(ux) if self.vector_table_installed() => self.run_ux(ux, &args),
                    _ => self.status = DeviceStatus::new(31, "SYNTAX ERROR", 0, 0),
                }
            }
            [b'I', ..] => self.step_to(DIRECTORY_TRACK),
            _ => self.status = DeviceStatus::new(31, "SYNTAX ERROR", 0, 0),
        }
        Ok(())
    }

    fn device_status(&mut self, device: u8) -> CbmResult<DeviceStatus> {
        self.check_device(device, "device_status")?;
        self.bus_transfer();
        // Reading the error channel clears the error.
        Ok(std::mem::take(&mut self.status))
    }

    fn upload(&mut self, device: u8, address: u16, data: &[u8]) -> CbmResult<usize> {
        self.check_device(device, "upload")?;
        self.bus_transfer();
        let start = usize::from(address).min(RAM_SIZE);
        let count = data.len().min(RAM_SIZE - start);
        self.ram[start..start + count].copy_from_slice(&data[..count]);
        Ok(count)
    }

    fn download(&mut self, device: u8, address: u16, buf: &mut [u8]) -> CbmResult<usize> {
        self.check_device(device, "download")?;
        self.bus_transfer();
        let start = usize::from(address).min(RAM_SIZE);
        let count = buf.len().min(RAM_SIZE - start);
        buf[..count].copy_from_slice(&self.ram[start..start + count]);
        Ok(count)
    }

    fn reset(&mut self) -> CbmResult<()> {
        debug!("simulated bus reset");
        self.power_on();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> SimulatedDriveConfig {
        SimulatedDriveConfig {
            rotation_period: Duration::from_millis(200),
            track_skew: Duration::from_millis(50),
            command_latency: Duration::from_millis(1),
            step_time: Duration::from_millis(3),
            timer_seed: 5_000_000,
        }
    }

    fn install(drive: &mut SimulatedDrive) {
        drive
            .upload(8, UX_VECTOR_POINTER, &COMMAND_VECTOR_TABLE.to_le_bytes())
            .unwrap();
        drive.exec_command(8, b"U4").unwrap();
        assert!(drive.device_status(8).unwrap().is_ok());
    }

    #[test]
    fn test_power_on_status() {
        let mut drive = SimulatedDrive::new(8, &config());
        let status = drive.device_status(8).unwrap();
        assert_eq!(status.code, 73);
        assert!(drive.device_status(8).unwrap().is_ok());
    }

    #[test]
    fn test_wrong_device() {
        let mut drive = SimulatedDrive::new(8, &config());
        assert!(drive.exec_command(9, b"I0").is_err());
        assert!(drive.device_status(9).is_err());
    }

    #[test]
    fn test_ux_needs_vector_table() {
        let mut drive = SimulatedDrive::new(8, &config());
        drive.exec_command(8, b"U4").unwrap();
        assert_eq!(drive.device_status(8).unwrap().code, 31);
        assert!(!drive.timers_running());

        install(&mut drive);
        assert!(drive.vector_table_installed());
        assert!(drive.timers_running());

        drive.exec_command(8, b"U6").unwrap();
        assert!(!drive.vector_table_installed());
    }

    #[test]
    fn test_encode_timer_residues() {
        let sample = SimulatedDrive::encode_timer(1_234_567);
        assert_eq!(u32::from(sample.via1_timer2()), 1_234_567 % 65_536);
        assert_eq!(u32::from(sample.via2_timer2_low), 1_234_567 % 187);
    }

    #[test]
    fn test_job_samples_once_per_revolution() {
        let mut drive = SimulatedDrive::new(8, &config());
        install(&mut drive);

        let mut values = Vec::new();
        for _ in 0..3 {
            drive.exec_command(8, b"U3 18 0").unwrap();
            assert!(drive.device_status(8).unwrap().is_ok());
            let mut buf = [0u8; RawTimerSample::SIZE];
            assert_eq!(drive.download(8, TIMER_SNAPSHOT, &mut buf).unwrap(), 3);
            values.push(drive.clock_us());
        }
        assert_eq!(drive.jobs_run(), 3);
        // Sampling happened at consecutive reference points; the clock
        // after each download is a fixed offset past the sample.
        assert_eq!(values[1] - values[0], 200_000);
        assert_eq!(values[2] - values[1], 200_000);
    }

    #[test]
    fn test_job_rejects_illegal_track() {
        let mut drive = SimulatedDrive::new(8, &config());
        install(&mut drive);
        drive.exec_command(8, b"U3 43 0").unwrap();
        let status = drive.device_status(8).unwrap();
        assert_eq!(status.code, 66);
        assert_eq!(status.track, 43);
        assert_eq!(drive.jobs_run(), 0);
    }

    #[test]
    fn test_reset_restores_dos_vector() {
        let mut drive = SimulatedDrive::new(8, &config());
        install(&mut drive);
        drive.reset().unwrap();
        assert!(!drive.vector_table_installed());
        assert!(!drive.timers_running());
    }

    #[test]
    fn test_memory_bounds() {
        let mut drive = SimulatedDrive::new(8, &config());
        assert_eq!(drive.upload(8, 0x07fe, &[1, 2, 3, 4]).unwrap(), 2);
        let mut buf = [0u8; 4];
        assert_eq!(drive.download(8, 0x07fe, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[1, 2]);
    }
}
