//! Virtual 23.589 bit timer reconstruction.
//!
//! The job code snapshots two free running VIA timers: VIA1 timer 2 as a
//! 16 bit counter and VIA2 timer 2 with a latch of 185, which counts 187
//! states per period. Both decrement once per 1 MHz clock cycle and their
//! moduli are coprime, so the pair of readings identifies a point in time
//! modulo `65536 * 187` by the Chinese Remainder Theorem.
//!
//! [`MonotonicCounter`] further extends that value to 32 bits in software,
//! which only works as long as two consecutive readings are less than one
//! full period (about 12.26 s) apart.

use cbm_common::jobcode::{RawTimerSample, VIRTUAL_TIMER_MODULUS};

/// Modulus of the virtual timer.
pub const MODULUS: u64 = VIRTUAL_TIMER_MODULUS as u64;

/// First factor of the CRT coefficient for the 16 bit timer.
pub const VIA1_COEFFICIENT_1: u64 = 27_081;

/// Second factor of the CRT coefficient for the 16 bit timer.
pub const VIA1_COEFFICIENT_2: u64 = 121;

/// CRT coefficient for the 7.89 bit timer.
pub const VIA2_COEFFICIENT: u64 = 8_978_432;

/// One reconstructed, decrementing virtual timer value in `[0, MODULUS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReconstructedTick(pub u32);

impl ReconstructedTick {
    /// The raw timer value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

/// Combine both VIA timer readings into the virtual timer value.
#[must_use]
pub fn reconstruct(sample: RawTimerSample) -> ReconstructedTick {
    let mut v_timer = u64::from(sample.via1_timer2());
    v_timer = v_timer * VIA1_COEFFICIENT_1 % MODULUS;
    v_timer = v_timer * VIA1_COEFFICIENT_2 % MODULUS;

    v_timer += VIA2_COEFFICIENT * u64::from(sample.via2_timer2_low);
    v_timer %= MODULUS;

    // v_timer < MODULUS < 2^24
    ReconstructedTick(v_timer as u32)
}

/// Wraparound state of the software extended timer.
///
/// One counter belongs to exactly one chronological sequence of
/// readings. Feeding readings out of order or from two sequences
/// corrupts wrap detection without any way to notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonotonicCounter {
    last_virtual_timer: u32,
    wrap_offset: i64,
}

impl MonotonicCounter {
    /// Counter state right after the drive timers were started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter that continues after an already observed reading.
    ///
    /// Equivalent to a fresh counter that has seen `last` as its first
    /// reading.
    #[must_use]
    pub fn resume_after(last: ReconstructedTick) -> Self {
        Self {
            last_virtual_timer: last.0,
            wrap_offset: -(MODULUS as i64),
        }
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The most recently folded virtual timer value.
    #[must_use]
    pub fn last_virtual_timer(&self) -> u32 {
        self.last_virtual_timer
    }

    /// Accumulated offset, decremented by [`MODULUS`] on every wrap.
    #[must_use]
    pub fn wrap_offset(&self) -> i64 {
        self.wrap_offset
    }

    /// Fold the next reading into the sequence and return the
    /// increasing 32 bit tick count.
    pub fn extend(&mut self, tick: ReconstructedTick) -> u32 {
        // The timer decrements, so an increase means it wrapped around.
        if tick.0 > self.last_virtual_timer {
            self.wrap_offset -= MODULUS as i64;
        }
        self.last_virtual_timer = tick.0;

        // Taking the ones' complement turns the decrementing count
        // into an increasing one.
        !((self.wrap_offset + i64::from(tick.0)) as u32)
    }
}

/// Free function form of [`MonotonicCounter::extend`].
pub fn extend(tick: ReconstructedTick, state: &mut MonotonicCounter) -> u32 {
    state.extend(tick)
}
