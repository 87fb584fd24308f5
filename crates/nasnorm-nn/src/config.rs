use serde::{Deserialize, Serialize};

use crate::{DataLayout, NormError, NormStrategy};

fn check_decay(decay: f32) -> Result<(), NormError> {
    if (0.0..=1.0).contains(&decay) {
        Ok(())
    } else {
        Err(NormError::InvalidDecay(decay))
    }
}

/// Configuration for [`crate::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormConfig {
    pub decay: f32,
    pub epsilon: f32,
    pub layout: DataLayout,
    pub strategy: NormStrategy,
    pub num_groups: usize,
}

impl Default for NormConfig {
    fn default() -> Self {
        Self {
            decay: 0.9,
            epsilon: 1e-5,
            layout: DataLayout::ChannelsLast,
            strategy: NormStrategy::Group,
            num_groups: 32,
        }
    }
}

impl NormConfig {
    pub fn validate(&self) -> Result<(), NormError> {
        check_decay(self.decay)?;
        if self.strategy == NormStrategy::Group && self.num_groups == 0 {
            return Err(NormError::InvalidGroupCount(0));
        }
        Ok(())
    }

    pub fn batch(&self) -> BatchNormConfig {
        BatchNormConfig {
            decay: self.decay,
            epsilon: self.epsilon,
            layout: self.layout,
        }
    }

    pub fn group(&self) -> GroupNormConfig {
        GroupNormConfig {
            epsilon: self.epsilon,
            num_groups: self.num_groups,
            layout: self.layout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchNormConfig {
    pub decay: f32,
    pub epsilon: f32,
    pub layout: DataLayout,
}

impl Default for BatchNormConfig {
    fn default() -> Self {
        Self {
            decay: 0.9,
            epsilon: 1e-5,
            layout: DataLayout::ChannelsLast,
        }
    }
}

impl BatchNormConfig {
    pub fn validate(&self) -> Result<(), NormError> {
        check_decay(self.decay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupNormConfig {
    pub epsilon: f32,
    pub num_groups: usize,
    pub layout: DataLayout,
}

impl Default for GroupNormConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-5,
            num_groups: 32,
            layout: DataLayout::ChannelsLast,
        }
    }
}

/// Masked batch norm runs with a looser epsilon than the unmasked one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskedNormConfig {
    pub decay: f32,
    pub epsilon: f32,
    pub layout: DataLayout,
}

impl Default for MaskedNormConfig {
    fn default() -> Self {
        Self {
            decay: 0.9,
            epsilon: 1e-3,
            layout: DataLayout::ChannelsLast,
        }
    }
}

impl MaskedNormConfig {
    pub fn validate(&self) -> Result<(), NormError> {
        check_decay(self.decay)
    }
}
