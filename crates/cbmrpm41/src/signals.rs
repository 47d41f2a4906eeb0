//! Interrupt handling for measurement runs.
//!
//! SIGINT and SIGTERM only set a flag. The run notices the flag before
//! its next drive transaction, stops with [`CbmError::Interrupted`] and
//! the caller resets the bus. Nothing is sent to the drive from inside
//! the signal handler.

use cbm_common::{CbmError, CbmResult, DeviceStatus};
use cbm_transport::DriveTransport;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static SIGINT_FLAG: AtomicBool = AtomicBool::new(false);
static SIGTERM_FLAG: AtomicBool = AtomicBool::new(false);

/// Signals that end a measurement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGINT - Interrupt (Ctrl+C).
    Interrupt,
    /// SIGTERM - Termination request.
    Terminate,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Shared interrupt state.
#[derive(Debug, Default)]
pub struct SignalState {
    interrupt_requested: AtomicBool,
    signal_count: AtomicU32,
}

impl SignalState {
    /// Create a new signal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the run should stop.
    #[inline]
    pub fn interrupt_requested(&self) -> bool {
        self.interrupt_requested.load(Ordering::Relaxed)
    }

    /// Request the run to stop.
    pub fn request_interrupt(&self) {
        self.interrupt_requested.store(true, Ordering::Relaxed);
    }

    fn record_signal(&self, kind: SignalKind) {
        warn!(signal = %kind, "signal caught, stopping measurement");
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        self.request_interrupt();
    }

    /// Number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Handle for checking interrupt requests.
#[derive(Debug, Clone, Default)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a handler and register the process signal handlers.
    ///
    /// # Errors
    ///
    /// Fails if a handler cannot be installed.
    pub fn install() -> std::io::Result<Self> {
        let handler = Self::default();

        #[cfg(unix)]
        register_unix_handlers()?;

        Ok(handler)
    }

    /// Collect signals caught since the last check.
    fn poll(&self) {
        if SIGINT_FLAG.swap(false, Ordering::Relaxed) {
            self.state.record_signal(SignalKind::Interrupt);
        }
        if SIGTERM_FLAG.swap(false, Ordering::Relaxed) {
            self.state.record_signal(SignalKind::Terminate);
        }
    }

    /// Check if the run should stop.
    pub fn interrupt_requested(&self) -> bool {
        self.poll();
        self.state.interrupt_requested()
    }

    /// Manually request the run to stop.
    pub fn request_interrupt(&self) {
        self.state.request_interrupt();
    }

    /// Get the signal state for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }

    fn check(&self) -> CbmResult<()> {
        if self.interrupt_requested() {
            Err(CbmError::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn register_unix_handlers() -> std::io::Result<()> {
    use std::os::raw::c_int;

    extern "C" fn sigint_handler(_: c_int) {
        SIGINT_FLAG.store(true, Ordering::Relaxed);
    }

    extern "C" fn sigterm_handler(_: c_int) {
        SIGTERM_FLAG.store(true, Ordering::Relaxed);
    }

    // SAFETY: the handlers only store to atomics, which is async-signal-safe.
    let results = unsafe {
        [
            libc::signal(libc::SIGINT, sigint_handler as libc::sighandler_t),
            libc::signal(libc::SIGTERM, sigterm_handler as libc::sighandler_t),
        ]
    };
    if results.contains(&libc::SIG_ERR) {
        return Err(std::io::Error::last_os_error());
    }

    debug!("Unix signal handlers registered");
    Ok(())
}

/// Transport wrapper that refuses to start a transaction once an
/// interrupt was requested.
///
/// [`reset`](DriveTransport::reset) always goes through so the bus can
/// be reset after the run stopped.
#[derive(Debug)]
pub struct InterruptibleTransport<T> {
    inner: T,
    signals: SignalHandler,
}

impl<T: DriveTransport> InterruptibleTransport<T> {
    /// Wrap `inner`.
    pub fn new(inner: T, signals: SignalHandler) -> Self {
        Self { inner, signals }
    }

    /// Give back the wrapped transport.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: DriveTransport> DriveTransport for InterruptibleTransport<T> {
    fn exec_command(&mut self, device: u8, command: &[u8]) -> CbmResult<()> {
        self.signals.check()?;
        self.inner.exec_command(device, command)
    }

    fn device_status(&mut self, device: u8) -> CbmResult<DeviceStatus> {
        self.signals.check()?;
        self.inner.device_status(device)
    }

    fn upload(&mut self, device: u8, address: u16, data: &[u8]) -> CbmResult<usize> {
        self.signals.check()?;
        self.inner.upload(device, address, data)
    }

    fn download(&mut self, device: u8, address: u16, buf: &mut [u8]) -> CbmResult<usize> {
        self.signals.check()?;
        self.inner.download(device, address, buf)
    }

    fn reset(&mut self) -> CbmResult<()> {
        self.inner.reset()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
