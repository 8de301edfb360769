//! Crate-wide error type and result alias.

/// All the ways a servo-deck operation can fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The underlying bus transaction failed. Batched writes retry a failing
    /// channel once; everywhere else this is surfaced to the caller.
    #[display("bus transaction failed")]
    Bus,

    /// Motion was requested on a channel without a valid calibration fit.
    /// Retrying cannot help; the calibration needs operator attention.
    #[display("channel has no valid calibration fit")]
    InvalidCalibration,

    /// A computed tick count fell outside the controller's 0..=4095 range,
    /// or a numeric input was not finite. Clamp through the limiter first.
    #[display("value out of range")]
    OutOfRange,

    /// Inverse conversion attempted on a zero-slope calibration.
    #[display("calibration slope is zero")]
    DivisionByZero,

    /// Channel index outside 0..=15.
    #[display("channel index out of range")]
    InvalidChannel,

    /// The calibration point store is full.
    #[display("calibration point capacity exceeded")]
    CalibrationFull,
}

/// Result alias using the crate [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
