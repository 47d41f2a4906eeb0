//! Installing and removing the measurement job code on the drive.

use crate::sampler::JitterSampler;
use cbm_common::error::{CbmError, CbmResult};
use cbm_common::jobcode::{UxCommand, COMMAND_VECTOR_TABLE, JOB_CODE_START, UX_VECTOR_POINTER};
use cbm_common::status::DeviceStatus;
use cbm_transport::DriveTransport;
use tracing::{debug, info, warn};

/// A drive with the measurement job code installed and its timers running.
///
/// Dropping a session leaves the drive patched; call
/// [`close`](Self::close) on success and [`abort`](Self::abort) on failure.
#[derive(Debug)]
pub struct DriveSession<T: DriveTransport> {
    sampler: JitterSampler<T>,
    init_status: DeviceStatus,
}

fn upload_all<T: DriveTransport>(
    transport: &mut T,
    device: u8,
    address: u16,
    data: &[u8],
) -> CbmResult<()> {
    let written = transport.upload(device, address, data)?;
    if written != data.len() {
        return Err(CbmError::ShortTransfer {
            address,
            expected: data.len(),
            actual: written,
        });
    }
    Ok(())
}

/// Send a bare `U` command.
///
/// # Errors
///
/// Propagates the transport failure.
pub fn send_ux_command<T: DriveTransport>(
    transport: &mut T,
    device: u8,
    command: UxCommand,
) -> CbmResult<()> {
    debug!(%command, "sending user command");
    transport.exec_command(device, &command.command())
}

/// Point the `U` commands at the job code, start the timers and read
/// the disk ID. Returns the drive status afterwards.
fn install_vector_table<T: DriveTransport>(
    transport: &mut T,
    device: u8,
) -> CbmResult<DeviceStatus> {
    // Location of the new U vector user commands table.
    upload_all(
        transport,
        device,
        UX_VECTOR_POINTER,
        &COMMAND_VECTOR_TABLE.to_le_bytes(),
    )?;

    send_ux_command(transport, device, UxCommand::Init23BitTimers)?;

    // Read disk ID and initialise the other parameters from the
    // currently inserted disk.
    transport.exec_command(device, b"I0")?;
    transport.device_status(device)
}

/// Undo [`install_vector_table`]: default VIA2 shift register setup,
/// DOS `U` vector table, then reinitialise.
fn restore_drive<T: DriveTransport>(transport: &mut T, device: u8) -> CbmResult<()> {
    send_ux_command(transport, device, UxCommand::ResetVia2ShiftRegConfig)?;
    send_ux_command(transport, device, UxCommand::ResetUxVectorTable)?;
    transport.exec_command(device, b"I")
}

impl<T: DriveTransport> DriveSession<T> {
    /// Install the job code and start the 23 bit timers.
    ///
    /// An empty `job_code` skips the upload for drives that already have
    /// it resident.
    ///
    /// # Errors
    ///
    /// Fails on the first transport call that does not succeed. Once
    /// the vector table pointer may have been written, a failure first
    /// restores the DOS configuration as far as the drive still answers.
    pub fn open(mut transport: T, device: u8, job_code: &[u8]) -> CbmResult<Self> {
        if job_code.is_empty() {
            debug!("no job code given, assuming it is resident");
        } else {
            info!(bytes = job_code.len(), address = JOB_CODE_START, "uploading job code");
            upload_all(&mut transport, device, JOB_CODE_START, job_code)?;
        }

        let init_status = match install_vector_table(&mut transport, device) {
            Ok(status) => status,
            Err(e) => {
                if let Err(restore_err) = restore_drive(&mut transport, device) {
                    warn!(error = %restore_err, "could not restore drive configuration");
                }
                return Err(e);
            }
        };
        if init_status.is_ok() {
            info!(device, "drive initialised");
        } else {
            warn!(device, status = %init_status, "drive reported status after initialisation");
        }

        Ok(Self {
            sampler: JitterSampler::new(transport, device),
            init_status,
        })
    }

    /// Drive status read right after initialisation.
    pub fn init_status(&self) -> &DeviceStatus {
        &self.init_status
    }

    /// The sampler bound to this drive.
    pub fn sampler(&mut self) -> &mut JitterSampler<T> {
        &mut self.sampler
    }

    fn restore(&mut self) -> CbmResult<()> {
        let device = self.sampler.device();
        restore_drive(self.sampler.transport_mut(), device)
    }

    /// Restore the DOS configuration and give back the transport.
    ///
    /// # Errors
    ///
    /// Fails on the first transport call that does not succeed.
    pub fn close(mut self) -> CbmResult<T> {
        self.restore()?;
        info!("drive configuration restored");
        Ok(self.sampler.into_inner())
    }

    /// Best-effort restore after a failed run; errors are only logged.
    pub fn abort(mut self) -> T {
        if let Err(e) = self.restore() {
            warn!(error = %e, "could not restore drive configuration");
        }
        self.sampler.into_inner()
    }
}
