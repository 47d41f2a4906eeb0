//! Streaming output of measurement results.
//!
//! Rows are written as soon as they are known, so a run that fails half
//! way still leaves every completed row on the output.

use crate::analysis::{RpmResult, SkewResult};
use crate::sampler::SampleEvent;
use cbm_common::config::OutputFormat;
use cbm_common::error::{CbmError, CbmResult};
use cbm_common::status::DeviceStatus;
use serde::Serialize;
use std::io::Write;

/// Receives measurement progress and results.
pub trait Reporter {
    /// An RPM run starts.
    fn begin_rpm(&mut self) -> CbmResult<()>;

    /// Sampling of `track` starts in an RPM run.
    fn begin_track(&mut self, track: u8) -> CbmResult<()>;

    /// A snapshot of the track being sampled in an RPM run.
    fn sample_event(&mut self, event: &SampleEvent) -> CbmResult<()>;

    /// Rotation speed of one track.
    fn rpm_result(&mut self, result: &RpmResult) -> CbmResult<()>;

    /// A skew run starts.
    fn begin_skew(&mut self) -> CbmResult<()>;

    /// Skew between two adjacent tracks.
    fn skew_result(&mut self, result: &SkewResult) -> CbmResult<()>;

    /// A drive status line to show to the user.
    fn status(&mut self, status: &DeviceStatus) -> CbmResult<()>;
}

/// Create the reporter for `format` writing to `out`.
pub fn reporter_for<'a, W: Write + 'a>(format: OutputFormat, out: W) -> Box<dyn Reporter + 'a> {
    match format {
        OutputFormat::Table => Box::new(TableReporter::new(out)),
        OutputFormat::Json => Box::new(JsonReporter::new(out)),
    }
}

/// Fixed width tables in the layout of the classic `cbmrpm41` tool.
#[derive(Debug)]
pub struct TableReporter<W> {
    out: W,
}

impl<W: Write> TableReporter<W> {
    /// Create a table reporter.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for TableReporter<W> {
    fn begin_rpm(&mut self) -> CbmResult<()> {
        write!(
            self.out,
            " TR | timer abs. ||delta1,delta2,...                 |mean delta|mean rpm\n\
             \x20 # |      (~us) || (~us), (~us),...                 |     (~us)| (1/min)\n\
             ----+------------++------+---------------------------+----------+---------\n"
        )?;
        Ok(())
    }

    fn begin_track(&mut self, track: u8) -> CbmResult<()> {
        write!(self.out, " {track:2} |")?;
        self.out.flush()?;
        Ok(())
    }

    fn sample_event(&mut self, event: &SampleEvent) -> CbmResult<()> {
        match event {
            SampleEvent::Start(tick) => write!(self.out, " {tick:10} ||")?,
            SampleEvent::Delta(delta) => write!(self.out, "{delta:6} ")?,
            SampleEvent::Status(status) => return self.status(status),
        }
        self.out.flush()?;
        Ok(())
    }

    fn rpm_result(&mut self, result: &RpmResult) -> CbmResult<()> {
        writeln!(self.out, " {:8.1} | {:7.3}", result.mean_time_us, result.rpm)?;
        Ok(())
    }

    fn begin_skew(&mut self) -> CbmResult<()> {
        write!(
            self.out,
            " Tracks |mean delta|meanrpm||  skew| skew mod|  degree|  radians\n\
             \x20   (#) |     (~us)|(1/min)|| (~us)|    (~us)|     (o)|    (rad)\n\
             --------+----------+-------++------+---------+--------+----------\n"
        )?;
        Ok(())
    }

    fn skew_result(&mut self, result: &SkewResult) -> CbmResult<()> {
        writeln!(
            self.out,
            " {:2}..{:2} |{:10.3}|{:7.3}||{:6}|{:9.1}|{:8.3}|{:9.6}",
            result.previous_track,
            result.track,
            result.mean_delta,
            result.rpm,
            result.raw_skew,
            result.skew,
            result.degrees,
            result.radians
        )?;
        Ok(())
    }

    fn status(&mut self, status: &DeviceStatus) -> CbmResult<()> {
        writeln!(self.out, "{status}")?;
        Ok(())
    }
}

/// One JSON record per line.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Rpm(&'a RpmResult),
    Skew(&'a SkewResult),
    Status {
        code: u8,
        message: &'a str,
        track: u8,
        sector: u8,
    },
}

/// JSON lines output for further processing.
#[derive(Debug)]
pub struct JsonReporter<W> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    /// Create a JSON lines reporter.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn record(&mut self, record: &Record<'_>) -> CbmResult<()> {
        serde_json::to_writer(&mut self.out, record).map_err(|e| CbmError::Io(e.to_string()))?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn begin_rpm(&mut self) -> CbmResult<()> {
        Ok(())
    }

    fn begin_track(&mut self, _track: u8) -> CbmResult<()> {
        Ok(())
    }

    fn sample_event(&mut self, event: &SampleEvent) -> CbmResult<()> {
        match event {
            SampleEvent::Status(status) => self.status(status),
            SampleEvent::Start(_) | SampleEvent::Delta(_) => Ok(()),
        }
    }

    fn rpm_result(&mut self, result: &RpmResult) -> CbmResult<()> {
        self.record(&Record::Rpm(result))
    }

    fn begin_skew(&mut self) -> CbmResult<()> {
        Ok(())
    }

    fn skew_result(&mut self, result: &SkewResult) -> CbmResult<()> {
        self.record(&Record::Skew(result))
    }

    fn status(&mut self, status: &DeviceStatus) -> CbmResult<()> {
        self.record(&Record::Status {
            code: status.code,
            message: &status.message,
            track: status.track,
            sector: status.sector,
        })
    }
}
