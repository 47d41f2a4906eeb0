//! Transport that drives the opencbm `cbmctrl` utility.
//!
//! Each transport call runs one `cbmctrl` invocation:
//!
//! | call | invocation |
//! |------|------------|
//! | `exec_command` | `cbmctrl command <dev> <cmd>` |
//! | `device_status` | `cbmctrl status <dev>` |
//! | `upload` | `cbmctrl upload <dev> <addr> -` (data on stdin) |
//! | `download` | `cbmctrl download <dev> <addr> <count> -` (data on stdout) |
//! | `reset` | `cbmctrl reset` |

use crate::DriveTransport;
use cbm_common::config::CbmctrlConfig;
use cbm_common::error::{CbmError, CbmResult};
use cbm_common::status::DeviceStatus;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Poll interval while waiting for `cbmctrl` to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Drive transport backed by the `cbmctrl` command line utility.
#[derive(Debug, Clone)]
pub struct CbmctrlTransport {
    program: PathBuf,
    timeout: Duration,
}

impl CbmctrlTransport {
    /// Create a transport from configuration.
    pub fn new(config: &CbmctrlConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout,
        }
    }

    fn run(
        &self,
        operation: &'static str,
        args: &[OsString],
        stdin: Option<&[u8]>,
    ) -> CbmResult<Vec<u8>> {
        debug!(program = ?self.program, ?args, "running cbmctrl");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CbmError::transport(operation, format!("failed to start {:?}: {e}", self.program))
            })?;

        // Drain both pipes while the child runs so it never blocks on a
        // full pipe buffer.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let outcome = Self::feed(&mut child, stdin).and_then(|()| self.wait(&mut child));
        if outcome.is_err() {
            let _ = child.kill();
            let _ = child.wait();
        }

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        match outcome {
            Ok(status) if status.success() => {
                let stdout = stdout.map_err(|e| CbmError::transport(operation, e.to_string()))?;
                trace!(bytes = stdout.len(), "cbmctrl finished");
                Ok(stdout)
            }
            Ok(status) => {
                let stderr = String::from_utf8_lossy(&stderr.unwrap_or_default()).into_owned();
                Err(CbmError::transport(
                    operation,
                    format!("cbmctrl exited with {status}: {}", stderr.trim()),
                ))
            }
            Err(e) => Err(CbmError::transport(operation, e)),
        }
    }

    fn feed(child: &mut Child, stdin: Option<&[u8]>) -> Result<(), String> {
        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(data).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, String> {
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if start.elapsed() >= self.timeout => {
                    warn!(timeout = ?self.timeout, "cbmctrl timed out, killing it");
                    return Err(format!("cbmctrl did not finish within {:?}", self.timeout));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(e.to_string()),
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> std::io::Result<Vec<u8>> {
    match reader {
        Some(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("pipe reader panicked"))),
        None => Ok(Vec::new()),
    }
}

fn arg(value: impl ToString) -> OsString {
    OsString::from(value.to_string())
}

fn address_arg(address: u16) -> OsString {
    OsString::from(format!("0x{address:04x}"))
}

impl DriveTransport for CbmctrlTransport {
    fn exec_command(&mut self, device: u8, command: &[u8]) -> CbmResult<()> {
        let command = String::from_utf8_lossy(command).into_owned();
        self.run(
            "exec_command",
            &[arg("command"), arg(device), OsString::from(command)],
            None,
        )?;
        Ok(())
    }

    fn device_status(&mut self, device: u8) -> CbmResult<DeviceStatus> {
        let output = self.run("device_status", &[arg("status"), arg(device)], None)?;
        let line = String::from_utf8_lossy(&output);
        line.trim()
            .to_uppercase()
            .parse()
            .map_err(|e: cbm_common::StatusParseError| {
                CbmError::transport("device_status", e.to_string())
            })
    }

    fn upload(&mut self, device: u8, address: u16, data: &[u8]) -> CbmResult<usize> {
        self.run(
            "upload",
            &[arg("upload"), arg(device), address_arg(address), arg("-")],
            Some(data),
        )?;
        Ok(data.len())
    }

    fn download(&mut self, device: u8, address: u16, buf: &mut [u8]) -> CbmResult<usize> {
        let output = self.run(
            "download",
            &[
                arg("download"),
                arg(device),
                address_arg(address),
                arg(buf.len()),
                arg("-"),
            ],
            None,
        )?;
        let count = output.len().min(buf.len());
        buf[..count].copy_from_slice(&output[..count]);
        Ok(count)
    }

    fn reset(&mut self) -> CbmResult<()> {
        self.run("reset", &[arg("reset")], None)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cbmctrl"
    }
}
