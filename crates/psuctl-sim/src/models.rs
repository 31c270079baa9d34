//! Power supply model definitions.
//!
//! A [`SupplyModel`] fixes the limit pair of every channel at construction.
//! The limits never change afterwards.
//!
//! | Model    | CH1          | CH2          | CH3        | CH4         |
//! |----------|--------------|--------------|------------|-------------|
//! | GPP-4323 | 32 V / 3 A   | 32 V / 3 A   | 5 V / 1 A  | 15 V / 1 A  |

use psuctl_core::types::{CHANNEL_COUNT, ChannelId, ChannelLimits};

/// Static definition of a four-channel supply.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyModel {
    /// Human-readable model name.
    pub name: &'static str,
    /// Limits for channels 1-4, in channel order.
    pub limits: [ChannelLimits; CHANNEL_COUNT as usize],
}

impl SupplyModel {
    /// Limits of `channel`.
    pub fn limits_for(&self, channel: ChannelId) -> ChannelLimits {
        self.limits[channel.index()]
    }
}

impl Default for SupplyModel {
    fn default() -> Self {
        gpp_4323()
    }
}

/// GPP-4323 model definition.
///
/// Two 32 V / 3 A tracking channels, a 5 V / 1 A logic channel, and a
/// 15 V / 1 A auxiliary channel.
pub fn gpp_4323() -> SupplyModel {
    SupplyModel {
        name: "GPP-4323",
        limits: [
            ChannelLimits::new(32.0, 3.0),
            ChannelLimits::new(32.0, 3.0),
            ChannelLimits::new(5.0, 1.0),
            ChannelLimits::new(15.0, 1.0),
        ],
    }
}
