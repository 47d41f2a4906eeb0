//! The two measurement jobs.

use crate::analysis::{analyze_rpm, analyze_skew, RpmResult, SkewResult};
use crate::report::Reporter;
use crate::sampler::{JitterSampler, SampleEvent, TrackMeasurement};
use cbm_common::error::CbmResult;
use cbm_transport::DriveTransport;
use tracing::info;

/// Measure the rotation speed of every track in `begin..=end`.
///
/// Each track's deltas are reported while they are measured.
///
/// # Errors
///
/// Aborts on the first failing track; rows already reported stay.
pub fn measure_rpm<T: DriveTransport>(
    sampler: &mut JitterSampler<T>,
    begin: u8,
    end: u8,
    retries: u8,
    reporter: &mut dyn Reporter,
) -> CbmResult<Vec<RpmResult>> {
    info!(begin, end, retries, "starting rpm measurement");
    reporter.begin_rpm()?;

    let mut results = Vec::new();
    for track in begin..=end {
        reporter.begin_track(track)?;
        let measurement = sampler.sample_with(track, retries, |event| reporter.sample_event(&event))?;
        let result = analyze_rpm(&measurement);
        reporter.rpm_result(&result)?;
        results.push(result);
    }
    Ok(results)
}

/// Measure the skew between each pair of adjacent tracks in `begin..=end`.
///
/// Every track is sampled once; its measurement serves as the later
/// track of one pair and the earlier track of the next. A range of a
/// single track produces no pairs.
///
/// # Errors
///
/// Aborts on the first failing track; rows already reported stay.
pub fn measure_skew<T: DriveTransport>(
    sampler: &mut JitterSampler<T>,
    begin: u8,
    end: u8,
    retries: u8,
    reporter: &mut dyn Reporter,
) -> CbmResult<Vec<SkewResult>> {
    info!(begin, end, retries, "starting skew measurement");
    reporter.begin_skew()?;

    let mut results = Vec::new();
    let mut previous: Option<TrackMeasurement> = None;
    for track in begin..=end {
        let current = sampler.sample_with(track, retries, |event| match event {
            SampleEvent::Status(status) => reporter.status(&status),
            SampleEvent::Start(_) | SampleEvent::Delta(_) => Ok(()),
        })?;

        if let Some(previous) = &previous {
            let result = analyze_skew(previous, &current, retries);
            reporter.skew_result(&result)?;
            results.push(result);
        }
        previous = Some(current);
    }
    Ok(results)
}
