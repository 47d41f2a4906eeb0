//! Memory layout and command set of the drive-side measurement job code.
//!
//! The job code is uploaded into drive RAM, hooks itself into the DOS `U`
//! command vector table and, when asked to run a job, waits for the
//! reference point of the requested track before it latches both VIA
//! timers into a three byte snapshot. The host reads that snapshot back
//! with a memory download.

use std::fmt;

/// Drive RAM address the job code is uploaded to.
pub const JOB_CODE_START: u16 = 0x0500;

/// Zero page pointer to the `U` command vector table (`USRJMP`).
pub const UX_VECTOR_POINTER: u16 = 0x006b;

/// DOS default value of [`UX_VECTOR_POINTER`].
pub const UX_VECTOR_DEFAULT: u16 = 0xfff6;

/// Offset of the replacement command vector table inside the job code.
pub const COMMAND_VECTOR_TABLE_OFFSET: u16 = 0x0003;

/// Offset of the timer snapshot group inside the job code.
pub const TIMER_SNAPSHOT_OFFSET: u16 = 0x0011;

/// Absolute address of the replacement command vector table.
pub const COMMAND_VECTOR_TABLE: u16 = JOB_CODE_START + COMMAND_VECTOR_TABLE_OFFSET;

/// Absolute address of the timer snapshot group.
pub const TIMER_SNAPSHOT: u16 = JOB_CODE_START + TIMER_SNAPSHOT_OFFSET;

/// VIA1 timer 2 runs as a free 16 bit counter.
pub const VIA1_TIMER2_MODULUS: u32 = 256 * 256;

/// Latch value the job code programs into VIA2 timer 2.
pub const VIA2_TIMER2_LATCH: u32 = 185;

/// VIA2 timer 2 counts `latch + 2` states per period.
pub const VIA2_TIMER2_MODULUS: u32 = VIA2_TIMER2_LATCH + 2;

/// Period of the virtual 23.589 bit timer built from both VIA timers.
pub const VIRTUAL_TIMER_MODULUS: u32 = VIA1_TIMER2_MODULUS * VIA2_TIMER2_MODULUS;

/// `U` commands dispatched through the replacement vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UxCommand {
    /// Run the timing job on the track given as ASCII arguments.
    ExecuteJobInBuffer = b'3',
    /// Start both VIA timers in their free running 23 bit configuration.
    Init23BitTimers = b'4',
    /// Restore the VIA2 shift register configuration that DOS expects.
    ResetVia2ShiftRegConfig = b'5',
    /// Point the `U` command vector back to the DOS table.
    ResetUxVectorTable = b'6',
}

impl UxCommand {
    /// The command letter following `U`.
    pub fn letter(self) -> u8 {
        self as u8
    }

    /// Parse a command letter.
    pub fn from_letter(letter: u8) -> Option<Self> {
        match letter {
            b'3' => Some(Self::ExecuteJobInBuffer),
            b'4' => Some(Self::Init23BitTimers),
            b'5' => Some(Self::ResetVia2ShiftRegConfig),
            b'6' => Some(Self::ResetUxVectorTable),
            _ => None,
        }
    }

    /// The bare two byte command string, e.g. `U4`.
    pub fn command(self) -> [u8; 2] {
        [b'U', self.letter()]
    }
}

impl fmt::Display for UxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U{}", char::from(self.letter()))
    }
}

/// Format the job command for one measurement on `track`.
///
/// The job code expects `U<c> <track> <sector>` with ASCII decimal
/// arguments; the sector is always 0.
pub fn job_command(track: u8) -> String {
    format!("{} {} 0", UxCommand::ExecuteJobInBuffer, track)
}

/// One snapshot of both VIA timers as stored by the job code.
///
/// Both timers decrement, so a larger value means an earlier point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawTimerSample {
    /// VIA2 timer 2 low byte (modulus 187).
    pub via2_timer2_low: u8,
    /// VIA1 timer 2 low byte.
    pub via1_timer2_low: u8,
    /// VIA1 timer 2 high byte.
    pub via1_timer2_high: u8,
}

impl RawTimerSample {
    /// Size of the snapshot in drive memory.
    pub const SIZE: usize = 3;

    /// Decode a snapshot in drive memory order.
    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            via2_timer2_low: bytes[0],
            via1_timer2_low: bytes[1],
            via1_timer2_high: bytes[2],
        }
    }

    /// Encode the snapshot in drive memory order.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        [self.via2_timer2_low, self.via1_timer2_low, self.via1_timer2_high]
    }

    /// The combined 16 bit VIA1 timer 2 value.
    pub fn via1_timer2(self) -> u16 {
        u16::from_be_bytes([self.via1_timer2_high, self.via1_timer2_low])
    }
}
