//! Drive transport abstractions for talking to a CBM 1541.
//!
//! This crate provides:
//! - [`DriveTransport`] trait for abstracting the link to the drive
//! - [`cbmctrl`] module driving the opencbm `cbmctrl` utility
//! - [`simulated`] module with an in-process 1541 model running the
//!   measurement job code (feature `simulated`)

pub mod cbmctrl;
#[cfg(feature = "simulated")]
pub mod simulated;

pub use cbmctrl::CbmctrlTransport;
#[cfg(feature = "simulated")]
pub use simulated::SimulatedDrive;

use cbm_common::{CbmResult, DeviceStatus};

/// Link to one or more drives on the IEC bus.
///
/// Every call blocks until the drive answered. Implementations report
/// any failure of the link itself as an error; DOS level errors are
/// reported through [`DriveTransport::device_status`].
pub trait DriveTransport {
    /// Send a command string on the command channel of `device`.
    fn exec_command(&mut self, device: u8, command: &[u8]) -> CbmResult<()>;

    /// Read the status channel of `device`.
    ///
    /// Blocks until the previously issued command has completed.
    fn device_status(&mut self, device: u8) -> CbmResult<DeviceStatus>;

    /// Write `data` into drive memory at `address`.
    ///
    /// Returns the number of bytes written.
    fn upload(&mut self, device: u8, address: u16, data: &[u8]) -> CbmResult<usize>;

    /// Read `buf.len()` bytes of drive memory starting at `address`.
    ///
    /// Returns the number of bytes read.
    fn download(&mut self, device: u8, address: u16, buf: &mut [u8]) -> CbmResult<usize>;

    /// Reset the IEC bus and with it all attached drives.
    fn reset(&mut self) -> CbmResult<()>;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str {
        "unknown"
    }
}

impl<T: DriveTransport + ?Sized> DriveTransport for Box<T> {
    fn exec_command(&mut self, device: u8, command: &[u8]) -> CbmResult<()> {
        (**self).exec_command(device, command)
    }

    fn device_status(&mut self, device: u8) -> CbmResult<DeviceStatus> {
        (**self).device_status(device)
    }

    fn upload(&mut self, device: u8, address: u16, data: &[u8]) -> CbmResult<usize> {
        (**self).upload(device, address, data)
    }

    fn download(&mut self, device: u8, address: u16, buf: &mut [u8]) -> CbmResult<usize> {
        (**self).download(device, address, buf)
    }

    fn reset(&mut self) -> CbmResult<()> {
        (**self).reset()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: DriveTransport + ?Sized> DriveTransport for &mut T {
    fn exec_command(&mut self, device: u8, command: &[u8]) -> CbmResult<()> {
        (**self).exec_command(device, command)
    }

    fn device_status(&mut self, device: u8) -> CbmResult<DeviceStatus> {
        (**self).device_status(device)
    }

    fn upload(&mut self, device: u8, address: u16, data: &[u8]) -> CbmResult<usize> {
        (**self).upload(device, address, data)
    }

    fn download(&mut self, device: u8, address: u16, buf: &mut [u8]) -> CbmResult<usize> {
        (**self).download(device, address, buf)
    }

    fn reset(&mut self) -> CbmResult<()> {
        (**self).reset()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
