//! Channel indexing for the 16-channel controller.
//!
//! [`Channel`] is a validated index into the controller's channel bank;
//! [`ChannelMask`] is a set of channels packed into one `u16`, used to select
//! which channels participate in a batched write and to report per-channel
//! outcomes.

use crate::{Error, Result};

/// Number of PWM channels on the controller.
pub const CHANNEL_COUNT: usize = 16;

/// A validated channel index, 0..=15.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, derive_more::Display)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[display("{_0}")]
pub struct Channel(u8);

impl Channel {
    /// Create a channel from a raw index, or `None` if out of range.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < CHANNEL_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// The raw index as a `usize`, suitable for table lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The raw index as a `u8`.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Iterate all channels in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..CHANNEL_COUNT as u8).map(Self)
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self> {
        Self::new(index).ok_or(Error::InvalidChannel)
    }
}

/// A set of channels packed into a `u16` (bit n = channel n).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMask(u16);

impl ChannelMask {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// All 16 channels.
    pub const ALL: Self = Self(u16::MAX);

    /// Create a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// The raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Add a channel to the set.
    pub fn insert(&mut self, channel: Channel) {
        self.0 |= 1 << channel.raw();
    }

    /// Remove a channel from the set.
    pub fn remove(&mut self, channel: Channel) {
        self.0 &= !(1 << channel.raw());
    }

    /// Whether the set contains `channel`.
    #[must_use]
    pub const fn contains(self, channel: Channel) -> bool {
        self.0 & (1 << channel.raw()) != 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate the channels in the set in ascending order.
    pub fn channels(self) -> impl Iterator<Item = Channel> {
        Channel::all().filter(move |channel| self.contains(*channel))
    }
}

impl FromIterator<Channel> for ChannelMask {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for channel in iter {
            mask.insert(channel);
        }
        mask
    }
}
