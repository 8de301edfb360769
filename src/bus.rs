//! Register-level driver for the 16-channel, 12-bit PWM controller.
//!
//! [`PwmBus`] owns the bus transport and translates timing-domain requests
//! (microsecond pulse widths) into the controller's fixed-point tick domain,
//! issuing the minimum number of ordered register writes. Per-channel state
//! tracks the last OFF tick successfully written so that batched moves skip
//! channels whose command has not changed.
//!
//! See [`MotionController`](crate::motion::MotionController) for the
//! angle-level interface.

use embedded_hal::delay::DelayNs;

use crate::channel::{CHANNEL_COUNT, Channel, ChannelMask};
use crate::transport::RegisterBus;
use crate::{Error, Result};

/// Controller register map (fixed by the hardware).
mod reg {
    pub const MODE1: u8 = 0x00;
    pub const PRESCALE: u8 = 0xFE;
    /// Per-channel registers: `ON_L = 0x06 + 4n`, then ON_H, OFF_L, OFF_H.
    pub const LED0_ON_L: u8 = 0x06;
}

/// MODE1 sleep bit. The oscillator must be stopped before PRESCALE changes.
const MODE1_SLEEP: u8 = 0x10;
/// MODE1 restart bit. Must not be written back as-is when read high.
const MODE1_RESTART: u8 = 0x80;

/// Internal oscillator frequency (Hz).
const OSC_CLOCK_HZ: f64 = 25_000_000.0;
/// Ticks per PWM period (12-bit counter).
const TICKS_PER_PERIOD: f64 = 4096.0;
/// Highest legal OFF tick value.
pub const TICKS_MAX: u16 = 4095;
/// Legal range of the 8-bit prescale register.
const PRESCALE_MIN: u8 = 0x03;
const PRESCALE_MAX: u8 = 0xFF;
/// Settling delay between the steps of a frequency change.
const SETTLE_DELAY_MS: u32 = 5;

/// PWM bring-up configuration.
///
/// `clock_correction` compensates the controller's imprecise internal
/// oscillator: configure with 1.0, measure a commanded 1000 µs pulse, and set
/// the correction to `measured / 1000`. Tick granularity limits the residual
/// error to about 1% because the prescale divider is an integer.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmConfig {
    /// PWM frame rate in Hz. Hobby servos expect 50 Hz.
    pub bus_frequency_hz: f64,
    /// Oscillator correction factor, 1.0 for a nominal clock.
    pub clock_correction: f64,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            bus_frequency_hz: 50.0,
            clock_correction: 1.0,
        }
    }
}

/// Runtime write-deduplication state for one channel. Never persisted;
/// reset on [`PwmBus::configure`].
#[derive(Clone, Copy, Debug, Default)]
struct ChannelState {
    /// Last OFF tick value successfully written, `None` until the first
    /// successful write and after any failed one.
    last_off_ticks: Option<u16>,
    /// Whether the ON tick pair has been written as zero for this channel.
    on_pair_zeroed: bool,
}

/// Outcome of a batched write: which channels were written, skipped as
/// unchanged, or failed after their single retry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatchReport {
    /// Channels whose OFF ticks were written this call.
    pub written: ChannelMask,
    /// Channels skipped because their command matched the last written value.
    pub skipped: ChannelMask,
    /// Channels whose write and retry both failed. Their dedup state is
    /// cleared, so the next batch will attempt the full sequence again.
    pub failed: ChannelMask,
}

impl BatchReport {
    /// True when no channel failed.
    #[must_use]
    pub const fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Driver for the PWM controller's register-level timing interface.
///
/// Generic over the [`RegisterBus`] transport and an
/// [`embedded_hal::delay::DelayNs`] provider for the settling delays a
/// frequency change requires.
///
/// # Example
///
/// ```rust,no_run
/// # fn example(i2c: impl embedded_hal::i2c::I2c, delay: impl embedded_hal::delay::DelayNs)
/// #     -> servo_deck::Result<()> {
/// use servo_deck::bus::{PwmBus, PwmConfig};
/// use servo_deck::transport::I2cRegisterBus;
/// use servo_deck::Channel;
///
/// let mut bus = PwmBus::new(I2cRegisterBus::new(i2c), delay, &PwmConfig::default())?;
/// let channel = Channel::new(0).unwrap();
/// let ticks = bus.ticks_for_pulse(1500.0)?; // 307 at 50 Hz
/// bus.write_channel_ticks(channel, ticks)?;
/// # Ok(())
/// # }
/// ```
pub struct PwmBus<B, D> {
    bus: B,
    delay: D,
    bus_period_usec: f64,
    channels: [ChannelState; CHANNEL_COUNT],
}

impl<B: RegisterBus, D: DelayNs> PwmBus<B, D> {
    /// Create the driver and bring the controller up at the configured
    /// frequency.
    pub fn new(bus: B, delay: D, config: &PwmConfig) -> Result<Self> {
        let mut pwm = Self {
            bus,
            delay,
            bus_period_usec: 1_000_000.0 / config.bus_frequency_hz,
            channels: [ChannelState::default(); CHANNEL_COUNT],
        };
        pwm.configure(config.bus_frequency_hz, config.clock_correction)?;
        Ok(pwm)
    }

    /// Set the PWM frame frequency.
    ///
    /// The divider can only change while the oscillator is stopped, so the
    /// sequence is: set the sleep bit, write the prescale register, clear the
    /// sleep bit, with a settling delay after each step. The restart bit is
    /// masked out of the MODE1 value that gets written back.
    ///
    /// All write-deduplication state is reset; the next batched write
    /// replays the full register sequence for every channel.
    pub fn configure(&mut self, bus_frequency_hz: f64, clock_correction: f64) -> Result<()> {
        let exact =
            libm::round(OSC_CLOCK_HZ / clock_correction / TICKS_PER_PERIOD / bus_frequency_hz)
                - 1.0;
        let prescale = if exact < f64::from(PRESCALE_MIN) {
            PRESCALE_MIN
        } else if exact > f64::from(PRESCALE_MAX) {
            PRESCALE_MAX
        } else {
            exact as u8
        };

        #[cfg(feature = "defmt")]
        defmt::info!(
            "pwm configure: freq={} correction={} prescale={}",
            bus_frequency_hz,
            clock_correction,
            prescale
        );

        let mode1 = self.bus.read_byte(reg::MODE1)? & !MODE1_RESTART;
        self.bus.write_byte(reg::MODE1, mode1 | MODE1_SLEEP)?;
        self.delay.delay_ms(SETTLE_DELAY_MS);
        self.bus.write_byte(reg::PRESCALE, prescale)?;
        self.delay.delay_ms(SETTLE_DELAY_MS);
        self.bus.write_byte(reg::MODE1, mode1 & !MODE1_SLEEP)?;
        self.delay.delay_ms(SETTLE_DELAY_MS);

        self.bus_period_usec = 1_000_000.0 / bus_frequency_hz;
        self.channels = [ChannelState::default(); CHANNEL_COUNT];
        Ok(())
    }

    /// Convert a pulse width in microseconds to OFF ticks at the configured
    /// frame rate: `round(pulse * 4096 / period)`.
    ///
    /// Returns [`Error::OutOfRange`] when the result falls outside
    /// `0..=4095`; clamp through the limiter before calling to avoid it.
    pub fn ticks_for_pulse(&self, pulse_usec: f64) -> Result<u16> {
        let ticks = libm::round(pulse_usec * TICKS_PER_PERIOD / self.bus_period_usec);
        if ticks.is_nan() || ticks < 0.0 || ticks > f64::from(TICKS_MAX) {
            return Err(Error::OutOfRange);
        }
        Ok(ticks as u16)
    }

    /// Write one channel's full ON/OFF register set.
    ///
    /// ON is fixed at 0 (the pulse starts at the beginning of each period);
    /// the two pairs are written as little-endian low/high bytes. No retry
    /// is performed here; a failure clears the channel's dedup state and is
    /// surfaced to the caller.
    pub fn write_channel_ticks(&mut self, channel: Channel, off_ticks: u16) -> Result<()> {
        if off_ticks > TICKS_MAX {
            return Err(Error::OutOfRange);
        }
        let index = channel.index();
        // Invalidate first: a partial write must not look deduplicable.
        self.channels[index] = ChannelState::default();

        let base = channel_base(channel);
        self.bus.write_byte(base, 0)?;
        self.bus.write_byte(base + 1, 0)?;
        self.bus.write_byte(base + 2, (off_ticks & 0xFF) as u8)?;
        self.bus.write_byte(base + 3, (off_ticks >> 8) as u8)?;

        self.channels[index] = ChannelState {
            last_off_ticks: Some(off_ticks),
            on_pair_zeroed: true,
        };
        Ok(())
    }

    /// Write OFF ticks for every channel in `active`, skipping channels
    /// whose command equals the last value successfully written.
    ///
    /// Channels are written in ascending order. The ON pair is written once
    /// per channel lifetime (it is always zero); later writes touch only the
    /// OFF pair, so an unchanged channel costs zero transactions and a
    /// changed one costs two. A failing channel is retried exactly once via
    /// the non-batched path; if the retry also fails the channel is recorded
    /// in [`BatchReport::failed`] and the batch continues, so a stuck device
    /// on one channel cannot stall motion on the others.
    ///
    /// Any active tick value above 4095 is a caller bug and fails the whole
    /// call with [`Error::OutOfRange`] before any bus traffic.
    pub fn write_channels_batched(
        &mut self,
        off_ticks: &[u16; CHANNEL_COUNT],
        active: ChannelMask,
    ) -> Result<BatchReport> {
        for channel in active.channels() {
            if off_ticks[channel.index()] > TICKS_MAX {
                return Err(Error::OutOfRange);
            }
        }

        let mut report = BatchReport::default();
        for channel in active.channels() {
            let ticks = off_ticks[channel.index()];
            if self.channels[channel.index()].last_off_ticks == Some(ticks) {
                report.skipped.insert(channel);
                continue;
            }
            if self.write_off_deduped(channel, ticks).is_ok() {
                report.written.insert(channel);
                continue;
            }

            #[cfg(feature = "defmt")]
            defmt::warn!("batched write failed on channel {}, retrying", channel);

            match self.write_channel_ticks(channel, ticks) {
                Ok(()) => report.written.insert(channel),
                Err(_) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("retry failed on channel {}", channel);
                    self.channels[channel.index()] = ChannelState::default();
                    report.failed.insert(channel);
                }
            }
        }
        Ok(report)
    }

    /// Release the underlying transport.
    pub fn release(self) -> B {
        self.bus
    }

    /// Minimal OFF-pair write used inside a batch. Writes the ON pair first
    /// if this channel has never had it zeroed.
    fn write_off_deduped(&mut self, channel: Channel, off_ticks: u16) -> Result<()> {
        let index = channel.index();
        let base = channel_base(channel);
        if !self.channels[index].on_pair_zeroed {
            self.bus.write_byte(base, 0)?;
            self.bus.write_byte(base + 1, 0)?;
            self.channels[index].on_pair_zeroed = true;
        }
        self.bus.write_byte(base + 2, (off_ticks & 0xFF) as u8)?;
        self.bus.write_byte(base + 3, (off_ticks >> 8) as u8)?;
        self.channels[index].last_off_ticks = Some(off_ticks);
        Ok(())
    }
}

/// First register (ON_L) of a channel's four-register block.
const fn channel_base(channel: Channel) -> u8 {
    reg::LED0_ON_L + 4 * channel.raw()
}
