//! cbmrpm41 entry point.
//!
//! High precision CBM-1541 rotation speed and track skew measurement.
//! Resolves the configuration, installs the measurement job code on the
//! drive and streams the result table to stdout.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use cbm_common::config::{
    JobKind, MeasurementConfig, OutputFormat, TransportDriver, EXTENDED_END_TRACK, MIN_TRACK,
};
use cbm_common::{CbmError, CbmResult};
use cbm_rpm::report::{reporter_for, Reporter};
use cbm_rpm::{measure_rpm, measure_skew, DriveSession};
use cbm_transport::{CbmctrlTransport, DriveTransport, SimulatedDrive};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::signals::{InterruptibleTransport, SignalHandler};

/// Environment variable naming a configuration file.
const CONFIG_ENV: &str = "CBMRPM41_CONFIG";

/// System wide configuration file.
const SYSTEM_CONFIG: &str = "/etc/opencbm/cbmrpm41.toml";

/// cbmrpm41 command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "cbmrpm41",
    about = "High precision CBM-1541 rpm measurement",
    version,
    long_about = None
)]
struct Args {
    /// IEC device number of the drive (8-11).
    #[arg(value_name = "DRIVE")]
    drive: u8,

    /// Measurement job: 1 = detailed RPM printout, 2 = track synchronization.
    #[arg(long, short = 'j', value_name = "JOBID", value_parser = clap::value_parser!(u8).range(1..=2))]
    job: Option<u8>,

    /// Display drive status after the measurements.
    #[arg(long, short = 's')]
    status: bool,

    /// Measure out a 40 track disk.
    #[arg(long, short = 'x')]
    extended: bool,

    /// Number of measurement retries for each track.
    #[arg(long, short = 'r', value_name = "N")]
    retries: Option<u8>,

    /// Start track (1 <= start <= end).
    #[arg(long, short = 'b', value_name = "TRACK")]
    begin_track: Option<u8>,

    /// End track (start <= end <= 42).
    #[arg(long, short = 'e', value_name = "TRACK")]
    end_track: Option<u8>,

    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Drive-side job code binary (overrides config file).
    #[arg(long, value_name = "FILE")]
    job_code: Option<PathBuf>,

    /// Measure a simulated drive instead of real hardware.
    #[arg(long)]
    simulated: bool,

    /// Write one JSON object per result instead of the table.
    #[arg(long)]
    json: bool,

    /// Do not wait for confirmation before touching the drive.
    #[arg(long, short = 'y')]
    yes: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config = load_config(args.config.as_deref())?;
    apply_args(&mut config, &args);
    config.validate().context("invalid measurement parameters")?;

    info!(
        job = ?config.job,
        drive = config.drive,
        begin = config.begin_track,
        end = config.end_track,
        retries = config.retries,
        driver = ?config.transport.driver,
        "configuration loaded"
    );

    if !args.yes && config.transport.driver != TransportDriver::Simulated {
        confirm(config.drive)?;
    }

    let signals = SignalHandler::install().context("failed to set up signal handlers")?;
    let job_code = read_job_code(config.job_code.as_deref())?;

    match config.transport.driver {
        TransportDriver::Simulated => {
            info!("using simulated drive");
            let drive = SimulatedDrive::new(config.drive, &config.transport.simulated);
            run(drive, &config, &job_code, signals)
        }
        TransportDriver::Cbmctrl => {
            info!(program = %config.transport.cbmctrl.program.display(), "using cbmctrl transport");
            let transport = CbmctrlTransport::new(&config.transport.cbmctrl);
            run(transport, &config, &job_code, signals)
        }
    }
}

/// Initialize logging with the specified log level.
///
/// Log lines go to stderr so the result table on stdout stays clean.
fn init_logging(level: &str) {
    let filter = format!(
        "cbmrpm41={level},cbm_rpm={level},cbm_transport={level},cbm_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `CBMRPM41_CONFIG` environment variable
/// 3. `/etc/opencbm/cbmrpm41.toml` (system path)
/// 4. Built-in defaults
fn load_config(cli_path: Option<&Path>) -> Result<MeasurementConfig> {
    if let Some(config_path) = cli_path {
        info!(?config_path, "loading config from command-line argument");
        return MeasurementConfig::from_file(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "loading config from {CONFIG_ENV}");
            return MeasurementConfig::from_file(&config_path)
                .with_context(|| format!("failed to load config from {CONFIG_ENV}={env_path}"));
        }
        warn!(
            path = %env_path,
            "{CONFIG_ENV} set but file does not exist, checking other locations"
        );
    }

    let system_path = Path::new(SYSTEM_CONFIG);
    if system_path.exists() {
        info!(?system_path, "loading config from system path");
        return MeasurementConfig::from_file(system_path)
            .with_context(|| format!("failed to load config from {SYSTEM_CONFIG}"));
    }

    info!("no config file found, using built-in defaults");
    Ok(MeasurementConfig::default())
}

/// Apply command line overrides on top of the file configuration.
fn apply_args(config: &mut MeasurementConfig, args: &Args) {
    config.drive = args.drive;
    if let Some(job) = args.job.and_then(JobKind::from_id) {
        config.job = job;
    }
    if args.status {
        config.show_status = true;
    }
    if args.extended {
        config.begin_track = MIN_TRACK;
        config.end_track = EXTENDED_END_TRACK;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(begin) = args.begin_track {
        config.begin_track = begin;
    }
    if let Some(end) = args.end_track {
        config.end_track = end;
    }
    if let Some(path) = &args.job_code {
        config.job_code = Some(path.clone());
    }
    if args.simulated {
        config.transport.driver = TransportDriver::Simulated;
    }
    if args.json {
        config.output = OutputFormat::Json;
    }
}

/// Ask the user to insert a scratch disk.
fn confirm(drive: u8) -> Result<()> {
    let mut stderr = std::io::stderr().lock();
    write!(
        stderr,
        "Please remove any diskettes used with production data on it. Insert a freshly\n\
         formatted disk into drive {drive}; you can format a disk with e.g. the command:\n\n\
         \x20       cbmforng -o -v {drive} freshdisk,fd\n\n\
         If you desperately need to examine a production disk or even an original\n\
         diskette, then please protect the disk with a write protect adhesive label.\n\n\
         Press <Enter>, when ready or press <CTRL>-C to abort.\r"
    )?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read confirmation")?;
    Ok(())
}

fn read_job_code(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            let code = std::fs::read(path)
                .with_context(|| format!("failed to read job code {}", path.display()))?;
            info!(bytes = code.len(), path = %path.display(), "job code loaded");
            Ok(code)
        }
        None => Ok(Vec::new()),
    }
}

/// Run the configured job, resetting the bus if the run was interrupted.
fn run<T: DriveTransport>(
    transport: T,
    config: &MeasurementConfig,
    job_code: &[u8],
    signals: SignalHandler,
) -> Result<()> {
    let mut transport = InterruptibleTransport::new(transport, signals.clone());
    let stdout = std::io::stdout();
    let mut reporter = reporter_for(config.output, stdout.lock());

    run_interruptible(&mut transport, &signals, config, job_code, reporter.as_mut())
        .with_context(|| format!("measurement on drive {} failed", config.drive))
}

/// One session on `transport`, followed by a bus reset if a signal
/// arrived at any point.
///
/// A signal can also kill an in-flight `cbmctrl` child, so the run may
/// end with a transport error instead of [`CbmError::Interrupted`].
fn run_interruptible<T: DriveTransport>(
    transport: &mut InterruptibleTransport<T>,
    signals: &SignalHandler,
    config: &MeasurementConfig,
    job_code: &[u8],
    reporter: &mut dyn Reporter,
) -> CbmResult<()> {
    let result = measure(transport, config, job_code, reporter);
    if signals.interrupt_requested() {
        warn!(
            signals = signals.state().signal_count(),
            "interrupted, resetting IEC bus"
        );
        if let Err(e) = transport.reset() {
            warn!(error = %e, "bus reset failed");
        }
        return result.and(Err(CbmError::Interrupted));
    }
    result
}

/// One complete measurement session.
fn measure<T: DriveTransport>(
    transport: &mut T,
    config: &MeasurementConfig,
    job_code: &[u8],
    reporter: &mut dyn Reporter,
) -> CbmResult<()> {
    let drive = config.drive;
    let mut session = DriveSession::open(transport, drive, job_code)?;

    let init_ok = session.init_status().is_ok();
    if !init_ok && config.show_status {
        reporter.status(session.init_status())?;
    }

    let (begin, end, retries) = (config.begin_track, config.end_track, config.retries);
    let outcome = match config.job {
        JobKind::Rpm => measure_rpm(session.sampler(), begin, end, retries, reporter).map(drop),
        JobKind::Skew => measure_skew(session.sampler(), begin, end, retries, reporter).map(drop),
    };

    match outcome {
        Ok(()) => {
            let transport = session.close()?;
            if init_ok && config.show_status {
                let status = transport.device_status(drive)?;
                reporter.status(&status)?;
            }
            Ok(())
        }
        Err(CbmError::Interrupted) => Err(CbmError::Interrupted),
        Err(e) => {
            session.abort();
            Err(e)
        }
    }
}
