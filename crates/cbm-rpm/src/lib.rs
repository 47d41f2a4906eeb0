//! High precision rotation speed and track skew measurement for the
//! CBM 1541.
//!
//! This crate provides:
//! - [`timer`]: CRT reconstruction of the virtual 23.589 bit VIA timer
//!   and its software extension to a monotonic 32 bit counter
//! - [`sampler`]: repeated timer snapshots on one track
//! - [`analysis`]: RPM and skew statistics
//! - [`measure`]: the RPM and skew jobs over a track range
//! - [`session`]: job code installation and removal
//! - [`report`]: table and JSON lines output
//!
//! # Example
//!
//! ```
//! use cbm_common::SimulatedDriveConfig;
//! use cbm_rpm::report::TableReporter;
//! use cbm_rpm::session::DriveSession;
//! use cbm_transport::SimulatedDrive;
//!
//! let drive = SimulatedDrive::new(8, &SimulatedDriveConfig::default());
//! let mut session = DriveSession::open(drive, 8, &[]).unwrap();
//! let mut reporter = TableReporter::new(Vec::new());
//! let rows = cbm_rpm::measure::measure_rpm(session.sampler(), 18, 18, 5, &mut reporter).unwrap();
//! assert!((rows[0].rpm - 300.0).abs() < 1e-6);
//! session.close().unwrap();
//! ```

pub mod analysis;
pub mod measure;
pub mod report;
pub mod sampler;
pub mod session;
pub mod timer;

pub use analysis::{analyze_rpm, analyze_skew, fold_skew, RpmResult, SkewResult};
pub use measure::{measure_rpm, measure_skew};
pub use sampler::{JitterSampler, SampleEvent, TrackMeasurement};
pub use session::DriveSession;
pub use timer::{extend, reconstruct, MonotonicCounter, ReconstructedTick};
