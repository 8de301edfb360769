//! Drive up to 16 hobby servos through a PCA9685-class I2C PWM controller.
//!
//! The crate converts application-level angle commands into register writes,
//! subject to per-channel calibration and travel limits:
//!
//! - [`transport`]: the [`RegisterBus`](transport::RegisterBus) capability
//!   the driver is polymorphic over, plus an adapter for any
//!   [`embedded_hal::i2c::I2c`] bus.
//! - [`bus`]: the register-level driver with prescale computation, tick
//!   conversion, and single/batched channel writes with deduplication.
//! - [`calibration`]: per-channel `(pulse width, angle)` samples and their
//!   least-squares linear fit.
//! - [`limiter`]: hard per-channel travel bounds.
//! - [`motion`]: the composed angle-level controller.
//!
//! The control model is single-threaded, synchronous, and open-loop: every
//! bus write blocks until it completes or fails, and the bus handle is
//! exclusively owned by one motion-control task.
//!
//! # Glossary
//!
//! - **Tick:** one of 4096 discrete time slots per PWM period, the
//!   controller's native time unit.
//! - **Prescale:** the integer clock divider controlling the PWM frequency.
//! - **Pulse width:** how long (µs) a servo control signal stays high each
//!   period; the servo's native command unit.
//! - **Calibration fit:** the linear regression mapping angle (radians) to
//!   pulse width (µs) for one channel.
//! - **Batched move:** one logical command updating all active channels,
//!   optimized to skip channels whose command has not changed.

#![no_std]

pub mod bus;
pub mod calibration;
mod channel;
mod error;
pub mod limiter;
pub mod motion;
pub mod transport;

pub use crate::channel::{CHANNEL_COUNT, Channel, ChannelMask};
pub use crate::error::{Error, Result};
