//! Angle-level motion control for a bank of calibrated servos.
//!
//! [`MotionController`] is the single entry point for motion: it converts
//! angles to pulse widths through each channel's calibration fit, clamps
//! through the [`ChannelLimiter`](crate::limiter::ChannelLimiter), and issues
//! minimal register writes through the [`PwmBus`](crate::bus::PwmBus).
//!
//! The calibration table is injected by reference and never mutated here.
//! The controller assumes exclusive ownership of the bus handle; this crate
//! provides no internal locking (wrap the controller in a mutex if an
//! integration needs cross-task access).
//!
//! # Example
//!
//! A 20 Hz control loop. `move_all_to_angles` is a bounded-latency blocking
//! call (worst case `O(active channels)` bus transactions), so the loop
//! must measure elapsed time and sleep only the remainder.
//!
//! ```rust,no_run
//! # fn example(
//! #     i2c: impl embedded_hal::i2c::I2c,
//! #     delay: impl embedded_hal::delay::DelayNs,
//! # ) -> servo_deck::Result<()> {
//! use servo_deck::bus::{PwmBus, PwmConfig};
//! use servo_deck::calibration::{CalibrationTable, ChannelCalibration};
//! use servo_deck::motion::MotionController;
//! use servo_deck::transport::I2cRegisterBus;
//!
//! let mut table = CalibrationTable::named_defaults();
//! table.channels[0] = ChannelCalibration::with_default_travel_180();
//!
//! let bus = PwmBus::new(I2cRegisterBus::new(i2c), delay, &PwmConfig::default())?;
//! let mut motion = MotionController::new(bus, &table);
//!
//! let mut angles = [0.0_f64; 16];
//! loop {
//!     // ... update `angles` from the application ...
//!     let report = motion.move_all_to_angles(&angles)?;
//!     if !report.all_ok() {
//!         // channels in report.failed missed this frame; next frame retries
//!     }
//!     // ... measure elapsed time, sleep the remainder of the period ...
//! }
//! # }
//! ```

use embedded_hal::delay::DelayNs;

use crate::bus::{BatchReport, PwmBus};
use crate::calibration::CalibrationTable;
use crate::channel::{CHANNEL_COUNT, Channel};
use crate::limiter::ChannelLimiter;
use crate::transport::RegisterBus;
use crate::{Error, Result};

/// Angle-in, register-writes-out servo motion for up to 16 channels.
///
/// See the [module documentation](self) for a usage example.
pub struct MotionController<'a, B, D> {
    bus: PwmBus<B, D>,
    calibrations: &'a CalibrationTable,
    limiter: ChannelLimiter,
}

impl<'a, B: RegisterBus, D: DelayNs> MotionController<'a, B, D> {
    /// Compose a controller from a configured bus and a calibration table.
    /// The limiter is snapshotted from the table's travel bounds.
    #[must_use]
    pub fn new(bus: PwmBus<B, D>, calibrations: &'a CalibrationTable) -> Self {
        let limiter = ChannelLimiter::from_table(calibrations);
        Self {
            bus,
            calibrations,
            limiter,
        }
    }

    /// Move one channel to an angle (radians), clamped to its travel bounds.
    pub fn move_to_angle(&mut self, channel: Channel, angle_rad: f64) -> Result<()> {
        let pulse = self.angle_to_pulse(channel, angle_rad)?;
        let clamped = self.limiter.clamp(channel, pulse);
        let ticks = self.bus.ticks_for_pulse(clamped)?;
        self.bus.write_channel_ticks(channel, ticks)
    }

    /// Move one channel to an angle (radians) with no travel clamping.
    ///
    /// Diagnostic use only; the caller takes responsibility for keeping the
    /// command inside the servo's mechanical range.
    pub fn move_to_angle_unclamped(&mut self, channel: Channel, angle_rad: f64) -> Result<()> {
        let pulse = self.angle_to_pulse(channel, angle_rad)?;
        let ticks = self.bus.ticks_for_pulse(pulse)?;
        self.bus.write_channel_ticks(channel, ticks)
    }

    /// Move one channel to a raw pulse width (µs), clamped to its travel
    /// bounds. Needs no calibration fit; this is the jog-control path.
    pub fn move_to_pulse(&mut self, channel: Channel, pulse_usec: f64) -> Result<()> {
        let clamped = self.limiter.clamp(channel, pulse_usec);
        let ticks = self.bus.ticks_for_pulse(clamped)?;
        self.bus.write_channel_ticks(channel, ticks)
    }

    /// Move every active channel to its angle (radians) in one batched,
    /// deduplicated bus call. Inactive channels are skipped entirely.
    ///
    /// This is the high-rate path: two consecutive calls with identical
    /// angles cost zero bus transactions on the second call.
    pub fn move_all_to_angles(&mut self, angles: &[f64; CHANNEL_COUNT]) -> Result<BatchReport> {
        self.move_all(angles, true)
    }

    /// [`move_all_to_angles`](Self::move_all_to_angles) without travel
    /// clamping. Diagnostic use only.
    pub fn move_all_to_angles_unclamped(
        &mut self,
        angles: &[f64; CHANNEL_COUNT],
    ) -> Result<BatchReport> {
        self.move_all(angles, false)
    }

    /// Convert an angle (radians) to a pulse width (µs) through the
    /// channel's fit. Pure; no clamping.
    pub fn angle_to_pulse(&self, channel: Channel, angle_rad: f64) -> Result<f64> {
        let calibration = self.calibrations.get(channel);
        if !calibration.valid_fit {
            return Err(Error::InvalidCalibration);
        }
        Ok(calibration.slope * angle_rad + calibration.intercept)
    }

    /// Convert a pulse width (µs) back to an angle (radians) through the
    /// channel's fit. Pure.
    pub fn pulse_to_angle(&self, channel: Channel, pulse_usec: f64) -> Result<f64> {
        let calibration = self.calibrations.get(channel);
        if !calibration.valid_fit {
            return Err(Error::InvalidCalibration);
        }
        if calibration.slope == 0.0 {
            return Err(Error::DivisionByZero);
        }
        Ok((pulse_usec - calibration.intercept) / calibration.slope)
    }

    /// The travel limiter snapshotted at construction.
    #[must_use]
    pub fn limiter(&self) -> &ChannelLimiter {
        &self.limiter
    }

    /// Release the bus driver.
    pub fn release(self) -> PwmBus<B, D> {
        self.bus
    }

    fn move_all(&mut self, angles: &[f64; CHANNEL_COUNT], clamp: bool) -> Result<BatchReport> {
        let active = self.calibrations.active_mask();
        let mut off_ticks = [0u16; CHANNEL_COUNT];

        // Compute and validate every channel before any bus traffic so a
        // calibration error cannot leave the bank half-moved.
        for channel in active.channels() {
            let mut pulse = self.angle_to_pulse(channel, angles[channel.index()])?;
            if clamp {
                pulse = self.limiter.clamp(channel, pulse);
            }
            off_ticks[channel.index()] = self.bus.ticks_for_pulse(pulse)?;
        }

        self.bus.write_channels_batched(&off_ticks, active)
    }
}
