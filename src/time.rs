//! Time-related types based on the DW3xxx's system time
//!
//! Timestamps are 40 bits wide and count in units of 1/(128 * 499.2 MHz),
//! roughly 15.65 ps. The delayed-send register (`DX_TIME`) only holds the
//! upper 32 bits, so scheduled times have a resolution of 256 ticks.

use core::ops::Add;

use serde::{Deserialize, Serialize};

/// The maximum value of 40-bit system time stamps
pub const TIME_MAX: u64 = 0xff_ffff_ffff;

/// Ticks per microsecond, rounded down
pub const TICKS_PER_US: u64 = 63_898;

/// An instant in DW3xxx system time
///
/// Internally uses the same 40-bit timestamps that the chip uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant(u64);

impl Instant {
    /// Creates an `Instant` from a 40-bit timestamp
    ///
    /// Returns `None` if `value` doesn't fit in 40 bits.
    ///
    /// ``` rust
    /// use dw3xxx::time::{Instant, TIME_MAX};
    ///
    /// assert!(Instant::new(TIME_MAX).is_some());
    /// assert!(Instant::new(TIME_MAX + 1).is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Creates an `Instant` from a register value, dropping bits beyond 40
    pub(crate) fn from_register(value: u64) -> Self {
        Instant(value & TIME_MAX)
    }

    /// Creates an `Instant` from the upper 32 bits, as held by `DX_TIME` and
    /// `SYS_TIME`
    pub fn from_high_word(high: u32) -> Self {
        Instant((high as u64) << 8)
    }

    /// Returns the raw 40-bit timestamp
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The value for `DX_TIME`
    ///
    /// The low 8 bits are dropped, as the register can't hold them.
    pub fn high_word(&self) -> u32 {
        (self.0 >> 8) as u32
    }

    /// Returns the time passed since `earlier`, accounting for one wrap of
    /// the 40-bit counter
    ///
    /// ``` rust
    /// use dw3xxx::time::{Instant, TIME_MAX};
    ///
    /// let before_wrap = Instant::new(TIME_MAX).unwrap();
    /// let after_wrap = Instant::new(49).unwrap();
    /// assert_eq!(after_wrap.duration_since(before_wrap).value(), 50);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration(self.0.wrapping_sub(earlier.0) & TIME_MAX)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        Instant((self.0 + rhs.0) & TIME_MAX)
    }
}

/// A duration between two instants in DW3xxx system time
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Duration(u64);

impl Duration {
    /// Creates a `Duration` from a number of ticks
    ///
    /// Returns `None` if `value` doesn't fit in 40 bits.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates a `Duration` from a number of microseconds
    pub fn from_micros(micros: u32) -> Self {
        Duration((micros as u64 * TICKS_PER_US) & TIME_MAX)
    }

    /// Creates a `Duration` from a number of nanoseconds
    pub fn from_nanos(nanos: u32) -> Self {
        Duration(nanos as u64 * TICKS_PER_US / 1000)
    }

    /// Returns the raw tick count
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The value for `DX_TIME` when the duration is a relative delay
    pub fn high_word(&self) -> u32 {
        (self.0 >> 8) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_word_drops_low_byte() {
        let instant = Instant::new(0x12_3456_78AB).unwrap();
        assert_eq!(instant.high_word(), 0x1234_5678);
        assert_eq!(Instant::from_high_word(0x1234_5678).value(), 0x12_3456_7800);
    }

    #[test]
    fn addition_wraps_at_40_bits() {
        let instant = Instant::new(TIME_MAX - 9).unwrap();
        let later = instant + Duration::new(20).unwrap();
        assert_eq!(later.value(), 10);
        assert_eq!(later.duration_since(instant).value(), 20);
    }

    #[test]
    fn micros_to_ticks() {
        assert_eq!(Duration::from_micros(1).value(), TICKS_PER_US);
        assert_eq!(Duration::from_nanos(1000).value(), TICKS_PER_US);
    }
}
