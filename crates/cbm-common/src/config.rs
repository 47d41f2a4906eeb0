//! Configuration structures for a measurement run.
//!
//! Supports TOML deserialization with defaults that match the classic
//! `cbmrpm41` command line (job 1, tracks 1..=35, 5 retries, drive 8).

use crate::error::{CbmError, CbmResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Lowest track the measurement accepts.
pub const MIN_TRACK: u8 = 1;
/// Highest track the measurement accepts (requires a DOS extension above 35).
pub const MAX_TRACK: u8 = 42;
/// Last track of a standard 35 track disk.
pub const STANDARD_END_TRACK: u8 = 35;
/// Last track of an extended 40 track disk.
pub const EXTENDED_END_TRACK: u8 = 40;
/// Lowest accepted retry count.
pub const MIN_RETRIES: u8 = 1;
/// Highest accepted retry count.
pub const MAX_RETRIES: u8 = 63;
/// Valid IEC device numbers for disk drives.
pub const DRIVE_RANGE: std::ops::RangeInclusive<u8> = 8..=11;

/// Top-level measurement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Measurement job to run.
    pub job: JobKind,

    /// IEC device number of the drive.
    pub drive: u8,

    /// First track to measure.
    pub begin_track: u8,

    /// Last track to measure.
    pub end_track: u8,

    /// Number of measurements per track (deltas between `retries + 1` samples).
    pub retries: u8,

    /// Print the drive status after initialisation and at the end.
    pub show_status: bool,

    /// Output format for the measurement rows.
    pub output: OutputFormat,

    /// Drive-side job code binary (required for real hardware).
    pub job_code: Option<PathBuf>,

    /// Transport configuration.
    pub transport: TransportConfig,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            job: JobKind::Rpm,
            drive: 8,
            begin_track: MIN_TRACK,
            end_track: STANDARD_END_TRACK,
            retries: 5,
            show_status: false,
            output: OutputFormat::Table,
            job_code: None,
            transport: TransportConfig::default(),
        }
    }
}

/// Measurement job selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Detailed rotation speed printout per track (job 1).
    #[default]
    Rpm,
    /// Track to track synchronisation skew (job 2).
    Skew,
}

impl JobKind {
    /// Map the numeric job id used on the command line.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Rpm),
            2 => Some(Self::Skew),
            _ => None,
        }
    }
}

/// Output format for measurement results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable table.
    #[default]
    Table,
    /// One JSON object per line.
    Json,
}

/// Drive transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport driver type.
    pub driver: TransportDriver,

    /// Settings for the `cbmctrl` subprocess transport.
    pub cbmctrl: CbmctrlConfig,

    /// Settings for the simulated drive.
    pub simulated: SimulatedDriveConfig,
}

/// Supported transport drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportDriver {
    /// In-process 1541 model for testing.
    Simulated,
    /// The opencbm `cbmctrl` utility.
    #[default]
    Cbmctrl,
}

/// Configuration of the `cbmctrl` subprocess transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CbmctrlConfig {
    /// Program name or path of `cbmctrl`.
    pub program: PathBuf,

    /// Maximum time a single `cbmctrl` invocation may take.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CbmctrlConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("cbmctrl"),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Parameters of the simulated drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedDriveConfig {
    /// Time for one disk revolution (200ms is exactly 300 rpm).
    #[serde(with = "humantime_serde")]
    pub rotation_period: Duration,

    /// Rotational offset of each track's reference point against the previous track.
    #[serde(with = "humantime_serde")]
    pub track_skew: Duration,

    /// Host round trip time of one command.
    #[serde(with = "humantime_serde")]
    pub command_latency: Duration,

    /// Head stepping time per track.
    #[serde(with = "humantime_serde")]
    pub step_time: Duration,

    /// Virtual timer value when the timers are started.
    pub timer_seed: u32,
}

impl Default for SimulatedDriveConfig {
    fn default() -> Self {
        Self {
            rotation_period: Duration::from_millis(200),
            track_skew: Duration::from_millis(12),
            command_latency: Duration::from_millis(4),
            step_time: Duration::from_millis(3),
            timer_seed: 0x00ab_cdef,
        }
    }
}

impl MeasurementConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check the measurement parameters before any drive access.
    ///
    /// Out of range retry counts are clamped into `1..=63`; everything
    /// else that is out of range is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CbmError::Config`] describing the first invalid parameter.
    pub fn validate(&mut self) -> CbmResult<()> {
        let clamped = self.retries.clamp(MIN_RETRIES, MAX_RETRIES);
        if clamped != self.retries {
            warn!(requested = self.retries, clamped, "retry count clamped");
            self.retries = clamped;
        }

        if !DRIVE_RANGE.contains(&self.drive) {
            return Err(CbmError::Config(format!(
                "invalid drive number {}, it should be between {} and {}",
                self.drive,
                DRIVE_RANGE.start(),
                DRIVE_RANGE.end()
            )));
        }
        if self.begin_track < MIN_TRACK {
            return Err(CbmError::Config(format!(
                "beginning track is less than {MIN_TRACK}, it should be {MIN_TRACK} or greater"
            )));
        }
        if self.end_track > MAX_TRACK {
            return Err(CbmError::Config(format!(
                "ending track is greater than {MAX_TRACK}, it should be {MAX_TRACK} or less"
            )));
        }
        if self.begin_track > self.end_track {
            return Err(CbmError::Config(format!(
                "beginning track {} is greater than ending track {}, it should be less or equal",
                self.begin_track, self.end_track
            )));
        }
        if self.transport.driver == TransportDriver::Cbmctrl && self.job_code.is_none() {
            return Err(CbmError::Config(
                "the cbmctrl transport needs a job_code binary to upload".to_string(),
            ));
        }
        if self.transport.simulated.rotation_period.is_zero() {
            return Err(CbmError::Config(
                "simulated rotation_period must not be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
