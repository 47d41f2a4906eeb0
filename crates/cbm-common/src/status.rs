//! CBM DOS status channel messages.

use std::fmt;
use std::str::FromStr;

/// A parsed drive status line such as `00, OK,00,00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Numeric DOS status code.
    pub code: u8,
    /// Status text.
    pub message: String,
    /// Track reported with the status.
    pub track: u8,
    /// Sector reported with the status.
    pub sector: u8,
}

impl DeviceStatus {
    /// The `00, OK,00,00` status.
    pub fn ok() -> Self {
        Self::new(0, "OK", 0, 0)
    }

    /// Build a status line.
    pub fn new(code: u8, message: impl Into<String>, track: u8, sector: u8) -> Self {
        Self {
            code,
            message: message.into(),
            track,
            sector,
        }
    }

    /// Whether the drive reported `00`.
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}, {},{:02},{:02}",
            self.code, self.message, self.track, self.sector
        )
    }
}

/// Status line parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed drive status: {0:?}")]
pub struct StatusParseError(pub String);

impl FromStr for DeviceStatus {
    type Err = StatusParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n', '\0']);
        let err = || StatusParseError(line.to_string());

        // The message itself never contains a comma, the numbers never
        // contain spaces apart from the one after the code.
        let mut fields = line.splitn(2, ',');
        let code = fields.next().ok_or_else(err)?.trim();
        let rest = fields.next().ok_or_else(err)?;
        let mut tail = rest.rsplitn(3, ',');
        let sector = tail.next().ok_or_else(err)?.trim();
        let track = tail.next().ok_or_else(err)?.trim();
        let message = tail.next().ok_or_else(err)?.trim();

        Ok(Self {
            code: code.parse().map_err(|_| err())?,
            message: message.to_string(),
            track: track.parse().map_err(|_| err())?,
            sector: sector.parse().map_err(|_| err())?,
        })
    }
}
