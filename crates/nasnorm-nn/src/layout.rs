use nasnorm::{shape, Shape, Tensor};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, IntoStaticStr};

use crate::NormError;

/// Memory layout of a rank 4 activation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    EnumString,
    IntoStaticStr,
    strum_macros::Display,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "&'static str")]
pub enum DataLayout {
    /// `[batch, height, width, channel]`
    #[default]
    #[strum(serialize = "NHWC")]
    ChannelsLast,
    /// `[batch, channel, height, width]`
    #[strum(serialize = "NCHW")]
    ChannelsFirst,
}

impl DataLayout {
    pub fn parse(token: &str) -> Result<Self, NormError> {
        token
            .parse()
            .map_err(|_| NormError::UnknownLayout(token.to_string()))
    }

    pub fn channel_axis(self) -> usize {
        match self {
            DataLayout::ChannelsLast => 3,
            DataLayout::ChannelsFirst => 1,
        }
    }

    pub fn spatial_axes(self) -> [usize; 2] {
        match self {
            DataLayout::ChannelsLast => [1, 2],
            DataLayout::ChannelsFirst => [2, 3],
        }
    }

    /// Every axis but the channel axis.
    pub fn reduction_axes(self) -> [usize; 3] {
        match self {
            DataLayout::ChannelsLast => [0, 1, 2],
            DataLayout::ChannelsFirst => [0, 2, 3],
        }
    }

    /// Permutation into `NCHW`, `None` when already there.
    pub fn to_channels_first(self) -> Option<[usize; 4]> {
        match self {
            DataLayout::ChannelsLast => Some([0, 3, 1, 2]),
            DataLayout::ChannelsFirst => None,
        }
    }

    /// Permutation out of `NCHW`, `None` when already there.
    pub fn from_channels_first(self) -> Option<[usize; 4]> {
        match self {
            DataLayout::ChannelsLast => Some([0, 2, 3, 1]),
            DataLayout::ChannelsFirst => None,
        }
    }

    /// Shape a per-channel vector takes to broadcast against an activation.
    pub fn channel_shape(self, channels: usize) -> Shape {
        match self {
            DataLayout::ChannelsLast => shape![1, 1, 1, channels],
            DataLayout::ChannelsFirst => shape![1, channels, 1, 1],
        }
    }

    /// Channel count of a rank 4 activation in this layout.
    pub fn channels(self, x: &Tensor) -> Result<usize, NormError> {
        if x.rank() != 4 {
            return Err(NormError::Rank {
                expected: 4,
                actual: x.shape().clone(),
            });
        }
        Ok(x.shape()[self.channel_axis()])
    }
}

impl TryFrom<String> for DataLayout {
    type Error = NormError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        DataLayout::parse(&token)
    }
}
