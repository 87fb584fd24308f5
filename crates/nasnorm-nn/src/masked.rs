use derive_new::new;
use nasnorm::{mask_indices, Tensor};

use crate::batchnorm::fused_batch_norm;
use crate::{MaskedNormConfig, NormError, NormRegistry, ScopeHandle};

#[derive(Debug, Clone, new)]
pub struct MaskedInput {
    pub x: Tensor,
    pub mask: Vec<bool>,
    pub is_training: bool,
}

/// Batch normalization over a per-call subset of a scope's channels.
///
/// The scope is sized to the full channel count. Each call selects the
/// channels whose mask entry is set, in ascending order, and `x` must carry
/// exactly that many channels. Only the selected entries of the moving
/// statistics are ever written.
#[derive(Debug, Clone, new)]
pub struct MaskedBatchNorm {
    scope: ScopeHandle,
    config: MaskedNormConfig,
}

impl MaskedBatchNorm {
    pub fn scope(&self) -> &ScopeHandle {
        &self.scope
    }

    pub fn apply(&self, x: &Tensor, mask: &[bool], is_training: bool) -> Result<Tensor, NormError> {
        let MaskedNormConfig {
            decay,
            epsilon,
            layout,
        } = self.config;
        self.scope.check_mask(mask)?;
        let indices = mask_indices(mask);
        let channels = layout.channels(x)?;
        if indices.len() != channels {
            return Err(NormError::MaskedChannelMismatch {
                selected: indices.len(),
                actual: channels,
            });
        }

        let (scale, offset) = self.scope.masked_params(mask);
        if is_training {
            let fused = fused_batch_norm(x, &scale, &offset, None, epsilon, layout)?;
            self.scope
                .scatter_moving_average(&indices, &fused.mean, &fused.variance, decay);
            Ok(fused.y)
        } else {
            let (mean, variance) = self.scope.masked_stats(mask);
            let fused =
                fused_batch_norm(x, &scale, &offset, Some((&mean, &variance)), epsilon, layout)?;
            Ok(fused.y)
        }
    }
}

impl crate::Module for MaskedBatchNorm {
    type Input = MaskedInput;

    fn schedule(&self, input: Self::Input) -> anyhow::Result<Tensor> {
        Ok(self.apply(&input.x, &input.mask, input.is_training)?)
    }
}

/// Masked batch normalization through a named scope, `"bn"` by default.
pub fn normalize_masked(
    registry: &NormRegistry,
    x: &Tensor,
    is_training: bool,
    mask: &[bool],
    channel_count: usize,
    name: Option<&str>,
    config: &MaskedNormConfig,
) -> Result<Tensor, NormError> {
    config.validate()?;
    if mask.len() != channel_count {
        return Err(NormError::MaskLength {
            expected: channel_count,
            actual: mask.len(),
        });
    }
    let name = name.unwrap_or("bn");
    log::trace!(
        "normalize_masked {} (training={}) input {:?}, {} of {} channels",
        name,
        is_training,
        x.shape(),
        mask.iter().filter(|&&m| m).count(),
        channel_count
    );
    let scope = registry.resolve(name, channel_count, is_training)?;
    MaskedBatchNorm::new(scope, *config).apply(x, mask, is_training)
}
