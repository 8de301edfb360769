//! Per-channel calibration: sample points, linear fit, and travel metadata.
//!
//! Each channel carries a set of measured `(pulse width, angle)` samples and
//! a least-squares linear fit mapping angle to pulse width
//! (`pulse = slope * angle + intercept`). The calibration table is built once
//! at startup, typically deserialized from a persisted snapshot by an
//! external loader, and is read-only from the motion path; only a
//! calibration editor mutates it.
//!
//! All stored angles are radians, full stop. Degree display conversion is a
//! presentation concern that must happen outside this crate; a unit mix-up
//! here would silently skew every subsequent calibration.

use core::fmt::Write as _;
use core::ops::Index;

use serde::{Deserialize, Serialize};

use crate::channel::{CHANNEL_COUNT, Channel, ChannelMask};
use crate::{Error, Result};

/// Maximum calibration samples per channel.
pub const MAX_POINTS: usize = 16;

/// Absolute tolerance used to treat two samples as the same point,
/// applied independently to each axis.
pub const POINT_TOLERANCE: f64 = 0.001;

/// Default travel limits (µs) for an uncalibrated channel.
const DEFAULT_LOWER_LIMIT_USEC: f64 = 1000.0;
const DEFAULT_UPPER_LIMIT_USEC: f64 = 2000.0;

/// One measured calibration sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalPoint {
    /// Commanded pulse width in microseconds.
    pub pulse_usec: f64,
    /// Measured shaft angle in radians.
    pub angle_rad: f64,
}

impl CalPoint {
    /// Create a sample.
    #[must_use]
    pub const fn new(pulse_usec: f64, angle_rad: f64) -> Self {
        Self {
            pulse_usec,
            angle_rad,
        }
    }

    /// Whether both coordinates match `other` within [`POINT_TOLERANCE`].
    #[must_use]
    pub fn is_close_to(&self, other: &Self) -> bool {
        libm::fabs(self.pulse_usec - other.pulse_usec) < POINT_TOLERANCE
            && libm::fabs(self.angle_rad - other.angle_rad) < POINT_TOLERANCE
    }
}

/// Calibration record for one channel.
///
/// Invariants maintained by the mutating methods:
/// - `points` holds no two samples within tolerance of each other;
/// - `points` is sorted ascending by pulse width;
/// - `valid_fit` is recomputed on every change to `points` and is false
///   with fewer than two samples, in which case the channel is also
///   deactivated (an uncalibratable channel must not join batched motion).
///
/// `lower_limit_usec <= upper_limit_usec` is a caller contract, not
/// enforced here; the limiter clamps safely either way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelCalibration {
    /// Whether this channel participates in batched moves.
    pub active: bool,
    /// Free-form label; never used in computation.
    pub name: heapless::String<32>,
    /// Measured samples, sorted ascending by pulse width.
    pub points: heapless::Vec<CalPoint, MAX_POINTS>,
    /// Fitted µs-per-radian slope.
    pub slope: f64,
    /// Fitted pulse width (µs) at angle zero.
    pub intercept: f64,
    /// Pearson correlation coefficient of the fit.
    pub correlation: f64,
    /// True only if the last fit saw at least two samples.
    pub valid_fit: bool,
    /// Hard lower travel bound (µs), independent of the fit.
    pub lower_limit_usec: f64,
    /// Hard upper travel bound (µs), independent of the fit.
    pub upper_limit_usec: f64,
}

impl Default for ChannelCalibration {
    fn default() -> Self {
        Self {
            active: false,
            name: heapless::String::new(),
            points: heapless::Vec::new(),
            slope: 0.0,
            intercept: 0.0,
            correlation: 0.0,
            valid_fit: false,
            lower_limit_usec: DEFAULT_LOWER_LIMIT_USEC,
            upper_limit_usec: DEFAULT_UPPER_LIMIT_USEC,
        }
    }
}

impl ChannelCalibration {
    /// A fitted, active calibration for a standard 180° servo:
    /// 1000 µs at −π/2, 1500 µs at 0, 2000 µs at +π/2.
    #[must_use]
    pub fn with_default_travel_180() -> Self {
        Self::from_three_points(
            CalPoint::new(1000.0, -core::f64::consts::FRAC_PI_2),
            CalPoint::new(1500.0, 0.0),
            CalPoint::new(2000.0, core::f64::consts::FRAC_PI_2),
        )
    }

    /// A fitted, active calibration for a 270° servo:
    /// 500 µs at −135°, 1500 µs at 0, 2500 µs at +135° (in radians).
    #[must_use]
    pub fn with_default_travel_270() -> Self {
        let half_travel = 270.0_f64.to_radians() / 2.0;
        Self::from_three_points(
            CalPoint::new(500.0, -half_travel),
            CalPoint::new(1500.0, 0.0),
            CalPoint::new(2500.0, half_travel),
        )
    }

    fn from_three_points(a: CalPoint, b: CalPoint, c: CalPoint) -> Self {
        let mut calibration = Self::default();
        for point in [a, b, c] {
            // Capacity is 16 and the set starts empty; cannot fail.
            let _ = calibration.add_point(point.pulse_usec, point.angle_rad);
        }
        calibration.active = true;
        calibration
    }

    /// Add a sample, keeping the set deduplicated and sorted, then refit.
    ///
    /// Adding a point within tolerance of an existing one is a no-op, so
    /// the operation is idempotent.
    pub fn add_point(&mut self, pulse_usec: f64, angle_rad: f64) -> Result<()> {
        let point = CalPoint::new(pulse_usec, angle_rad);
        if self.points.iter().any(|existing| existing.is_close_to(&point)) {
            return Ok(());
        }
        let position = self
            .points
            .iter()
            .position(|existing| existing.pulse_usec > point.pulse_usec)
            .unwrap_or(self.points.len());
        self.points
            .insert(position, point)
            .map_err(|_| Error::CalibrationFull)?;
        self.fit();
        Ok(())
    }

    /// Remove the first sample matching both coordinates within tolerance,
    /// then refit. Returns false (leaving the set untouched) if nothing
    /// matched.
    pub fn remove_point(&mut self, pulse_usec: f64, angle_rad: f64) -> bool {
        let point = CalPoint::new(pulse_usec, angle_rad);
        let Some(position) = self
            .points
            .iter()
            .position(|existing| existing.is_close_to(&point))
        else {
            return false;
        };
        self.points.remove(position);
        self.fit();
        true
    }

    /// Recompute the linear fit from the current samples.
    ///
    /// With fewer than two samples the fit is invalidated and the channel
    /// deactivated. A sample set whose angles all coincide is degenerate
    /// (no pulse-per-radian slope exists) and is likewise invalidated.
    /// Fitting never re-activates a channel; activation is an editor
    /// decision.
    pub fn fit(&mut self) {
        if self.points.len() < 2 {
            self.valid_fit = false;
            self.active = false;
            return;
        }

        let n = self.points.len() as f64;
        let mean_angle = self.points.iter().map(|p| p.angle_rad).sum::<f64>() / n;
        let mean_pulse = self.points.iter().map(|p| p.pulse_usec).sum::<f64>() / n;

        let mut ss_aa = 0.0; // angle variance sum
        let mut ss_pp = 0.0; // pulse variance sum
        let mut ss_ap = 0.0; // covariance sum
        for point in &self.points {
            let da = point.angle_rad - mean_angle;
            let dp = point.pulse_usec - mean_pulse;
            ss_aa += da * da;
            ss_pp += dp * dp;
            ss_ap += da * dp;
        }

        if ss_aa == 0.0 {
            self.valid_fit = false;
            self.active = false;
            return;
        }

        self.slope = ss_ap / ss_aa;
        self.intercept = mean_pulse - self.slope * mean_angle;
        self.correlation = if ss_pp == 0.0 {
            0.0
        } else {
            ss_ap / libm::sqrt(ss_aa * ss_pp)
        };
        self.valid_fit = true;
    }

    /// Shift the whole calibration so its intercept lands on
    /// `new_intercept_usec`, then refit.
    ///
    /// Every sample's pulse coordinate moves by the same delta, so the slope
    /// and correlation are preserved; only the zero point changes. Used to
    /// re-center a channel without re-measuring every point. The shifted
    /// pulses are not clamped to the travel limits.
    pub fn rebase_zero(&mut self, new_intercept_usec: f64) -> Result<()> {
        if !new_intercept_usec.is_finite() {
            return Err(Error::OutOfRange);
        }
        self.fit();
        if !self.valid_fit {
            return Err(Error::InvalidCalibration);
        }
        let delta = new_intercept_usec - self.intercept;
        for point in &mut self.points {
            point.pulse_usec += delta;
        }
        self.fit();
        Ok(())
    }
}

/// The per-channel calibration table for one controller.
///
/// Owned by the process, injected by reference into
/// [`MotionController`](crate::motion::MotionController); no global state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    /// One record per channel, indexed by channel number.
    pub channels: [ChannelCalibration; CHANNEL_COUNT],
}

impl CalibrationTable {
    /// A table of default (inactive, unfit) records named
    /// `servo0`..`servo15`.
    #[must_use]
    pub fn named_defaults() -> Self {
        let mut table = Self::default();
        for (index, calibration) in table.channels.iter_mut().enumerate() {
            let _ = write!(calibration.name, "servo{index}");
        }
        table
    }

    /// The set of channels currently marked active.
    #[must_use]
    pub fn active_mask(&self) -> ChannelMask {
        Channel::all()
            .filter(|channel| self.channels[channel.index()].active)
            .collect()
    }

    /// The record for `channel`.
    #[must_use]
    pub fn get(&self, channel: Channel) -> &ChannelCalibration {
        &self.channels[channel.index()]
    }

    /// Mutable access for calibration editors. The motion path never calls
    /// this.
    pub fn get_mut(&mut self, channel: Channel) -> &mut ChannelCalibration {
        &mut self.channels[channel.index()]
    }
}

impl Index<Channel> for CalibrationTable {
    type Output = ChannelCalibration;

    fn index(&self, channel: Channel) -> &Self::Output {
        self.get(channel)
    }
}
