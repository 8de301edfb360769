//! Hard per-channel travel bounds, independent of the calibration fit.
//!
//! A fit extrapolates happily past a servo's mechanical range; the limiter
//! is the last line of defense before a commanded pulse reaches the bus.

use crate::calibration::CalibrationTable;
use crate::channel::{CHANNEL_COUNT, Channel};

/// Per-channel pulse-width clamp bounds (µs).
///
/// `lower <= upper` is a caller contract; with inverted bounds
/// [`clamp`](Self::clamp) still returns a value rather than panicking.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelLimiter {
    bounds: [(f64, f64); CHANNEL_COUNT],
}

impl ChannelLimiter {
    /// Snapshot the travel bounds of every channel in the table.
    #[must_use]
    pub fn from_table(table: &CalibrationTable) -> Self {
        let bounds = core::array::from_fn(|index| {
            let calibration = &table.channels[index];
            (calibration.lower_limit_usec, calibration.upper_limit_usec)
        });
        Self { bounds }
    }

    /// Build a limiter with the same bounds on every channel.
    #[must_use]
    pub fn uniform(lower_usec: f64, upper_usec: f64) -> Self {
        Self {
            bounds: [(lower_usec, upper_usec); CHANNEL_COUNT],
        }
    }

    /// The `(lower, upper)` bounds for `channel`.
    #[must_use]
    pub fn bounds(&self, channel: Channel) -> (f64, f64) {
        self.bounds[channel.index()]
    }

    /// Clamp a commanded pulse width into the channel's travel bounds.
    /// Pure; always returns a value.
    #[must_use]
    pub fn clamp(&self, channel: Channel, pulse_usec: f64) -> f64 {
        let (lower, upper) = self.bounds[channel.index()];
        pulse_usec.max(lower).min(upper)
    }
}
