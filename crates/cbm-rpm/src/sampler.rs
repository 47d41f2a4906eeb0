//! Repeated timer snapshots on one track.

use crate::timer::{reconstruct, MonotonicCounter};
use cbm_common::error::{CbmError, CbmResult};
use cbm_common::jobcode::{job_command, RawTimerSample, TIMER_SNAPSHOT};
use cbm_common::status::DeviceStatus;
use cbm_transport::DriveTransport;
use tracing::{debug, trace, warn};

/// Timer readings of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMeasurement {
    /// Measured track.
    pub track: u8,
    /// Extended tick of the first snapshot.
    pub start_tick: u32,
    /// Extended tick of the last snapshot.
    pub end_tick: u32,
    /// Tick differences between consecutive snapshots.
    pub deltas: Vec<u32>,
}

impl TrackMeasurement {
    /// Ticks between the first and the last snapshot.
    #[must_use]
    pub fn span(&self) -> u32 {
        self.end_tick.wrapping_sub(self.start_tick)
    }

    /// Number of measured intervals.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.deltas.len()
    }

    /// Smallest and largest interval.
    #[must_use]
    pub fn delta_range(&self) -> Option<(u32, u32)> {
        let min = self.deltas.iter().copied().min()?;
        let max = self.deltas.iter().copied().max()?;
        Some((min, max))
    }
}

/// Progress reported while a track is sampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleEvent {
    /// The first snapshot of the track, as an extended tick.
    Start(u32),
    /// One interval between consecutive snapshots.
    Delta(u32),
    /// The drive answered a job with a non-OK status.
    Status(DeviceStatus),
}

/// Runs the timing job repeatedly and folds the snapshots into one
/// monotonic tick sequence.
///
/// The sampler owns the wraparound state, so all tracks of one run must
/// go through the same sampler, strictly one after another.
#[derive(Debug)]
pub struct JitterSampler<T> {
    transport: T,
    device: u8,
    counter: MonotonicCounter,
}

impl<T: DriveTransport> JitterSampler<T> {
    /// Create a sampler for `device` with a fresh counter.
    pub fn new(transport: T, device: u8) -> Self {
        Self {
            transport,
            device,
            counter: MonotonicCounter::new(),
        }
    }

    /// The drive this sampler talks to.
    pub fn device(&self) -> u8 {
        self.device
    }

    /// Access the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Restart the tick sequence, e.g. after the drive timers were restarted.
    pub fn reset_counter(&mut self) {
        self.counter.reset();
    }

    /// Take `retries + 1` snapshots on `track`.
    ///
    /// # Errors
    ///
    /// Fails on the first transport call that does not succeed.
    pub fn sample(&mut self, track: u8, retries: u8) -> CbmResult<TrackMeasurement> {
        self.sample_with(track, retries, |_| Ok(()))
    }

    /// Like [`sample`](Self::sample), reporting each snapshot to `on_event`
    /// as soon as it is read.
    ///
    /// # Errors
    ///
    /// Fails on the first transport call that does not succeed, or when
    /// `on_event` fails.
    pub fn sample_with<F>(
        &mut self,
        track: u8,
        retries: u8,
        mut on_event: F,
    ) -> CbmResult<TrackMeasurement>
    where
        F: FnMut(SampleEvent) -> CbmResult<()>,
    {
        let command = job_command(track);
        let mut deltas = Vec::with_capacity(usize::from(retries));
        let mut start_tick = 0;
        let mut timer_value = 0u32;

        for measurement in 0..=retries {
            let last_value = timer_value;

            self.transport.exec_command(self.device, command.as_bytes())?;

            // Reading the status waits for the job to finish.
            let status = self.transport.device_status(self.device)?;
            if !status.is_ok() {
                warn!(track, %status, "drive reported status during job");
                on_event(SampleEvent::Status(status))?;
            }

            let sample = self.read_snapshot()?;
            timer_value = self.counter.extend(reconstruct(sample));
            trace!(track, measurement, ?sample, timer_value, "timer snapshot");

            if measurement == 0 {
                start_tick = timer_value;
                on_event(SampleEvent::Start(timer_value))?;
            } else {
                let delta = timer_value.wrapping_sub(last_value);
                deltas.push(delta);
                on_event(SampleEvent::Delta(delta))?;
            }
        }

        debug!(track, start_tick, end_tick = timer_value, "track sampled");
        Ok(TrackMeasurement {
            track,
            start_tick,
            end_tick: timer_value,
            deltas,
        })
    }

    fn read_snapshot(&mut self) -> CbmResult<RawTimerSample> {
        let mut buf = [0u8; RawTimerSample::SIZE];
        let read = self
            .transport
            .download(self.device, TIMER_SNAPSHOT, &mut buf)?;
        if read != buf.len() {
            return Err(CbmError::ShortTransfer {
                address: TIMER_SNAPSHOT,
                expected: buf.len(),
                actual: read,
            });
        }
        Ok(RawTimerSample::from_bytes(buf))
    }
}
