use derive_new::new;
use nasnorm::Tensor;

use crate::{BatchNormConfig, DataLayout, NormError, NormRegistry, ScopeHandle};

/// Activation plus the mode flag, the input of every normalization [`crate::Module`].
#[derive(Debug, Clone, new)]
pub struct NormInput {
    pub x: Tensor,
    pub is_training: bool,
}

/// Result of a fused batch normalization.
///
/// `mean` and `variance` are the per channel statistics destined for the
/// moving average. The variance is Bessel corrected, the normalization itself
/// used the biased one.
#[derive(Debug, Clone)]
pub(crate) struct Fused {
    pub y: Tensor,
    pub mean: Vec<f32>,
    pub variance: Vec<f32>,
}

/// `(x - mean) / sqrt(var + eps) * scale + offset` per channel.
///
/// With `stats == None` the statistics come from `x` itself.
pub(crate) fn fused_batch_norm(
    x: &Tensor,
    scale: &Tensor,
    offset: &Tensor,
    stats: Option<(&Tensor, &Tensor)>,
    epsilon: f32,
    layout: DataLayout,
) -> Result<Fused, NormError> {
    let channels = layout.channels(x)?;
    let channel_shape = layout.channel_shape(channels);
    let n = x.numel().checked_div(channels).unwrap_or(0);

    let (mean, var) = match stats {
        Some((mean, var)) => (
            mean.view(channel_shape.clone())?,
            var.view(channel_shape.clone())?,
        ),
        None if channels > 0 && n == 0 => {
            return Err(NormError::EmptyReduction(x.shape().clone()));
        }
        None => x.moments(&layout.reduction_axes())?,
    };

    let y = x
        .sub(&mean)?
        .div(&var.affine(1.0, epsilon)?.sqrt()?)?
        .mul(&scale.view(channel_shape.clone())?)?
        .add(&offset.view(channel_shape)?)?;

    let correction = if n > 1 { n as f32 / (n - 1) as f32 } else { 1.0 };
    let variance = var
        .to_vec::<f32>()?
        .into_iter()
        .map(|v| v * correction)
        .collect();

    Ok(Fused {
        y,
        mean: mean.to_vec::<f32>()?,
        variance,
    })
}

/// Batch normalization bound to one statistics scope.
#[derive(Debug, Clone, new)]
pub struct BatchNorm {
    scope: ScopeHandle,
    config: BatchNormConfig,
}

impl BatchNorm {
    pub fn scope(&self) -> &ScopeHandle {
        &self.scope
    }

    pub fn config(&self) -> &BatchNormConfig {
        &self.config
    }

    /// Training normalizes with batch statistics and folds them into the
    /// moving averages before returning. Inference uses the moving averages
    /// and leaves the scope untouched.
    pub fn apply(&self, x: &Tensor, is_training: bool) -> Result<Tensor, NormError> {
        let BatchNormConfig {
            decay,
            epsilon,
            layout,
        } = self.config;
        self.scope.check_channels(layout.channels(x)?)?;
        let (scale, offset) = (self.scope.scale(), self.scope.offset());

        if is_training {
            let fused = fused_batch_norm(x, &scale, &offset, None, epsilon, layout)?;
            self.scope
                .update_moving_average(&fused.mean, &fused.variance, decay);
            Ok(fused.y)
        } else {
            let (mean, variance) = (self.scope.moving_mean(), self.scope.moving_variance());
            let fused =
                fused_batch_norm(x, &scale, &offset, Some((&mean, &variance)), epsilon, layout)?;
            Ok(fused.y)
        }
    }
}

impl crate::Module for BatchNorm {
    type Input = NormInput;

    fn schedule(&self, input: Self::Input) -> anyhow::Result<Tensor> {
        Ok(self.apply(&input.x, input.is_training)?)
    }
}

/// Batch normalization through a named scope, `"bn"` by default.
pub fn batch_norm(
    registry: &NormRegistry,
    x: &Tensor,
    is_training: bool,
    name: Option<&str>,
    config: &BatchNormConfig,
) -> Result<Tensor, NormError> {
    config.validate()?;
    let name = name.unwrap_or("bn");
    let channels = config.layout.channels(x)?;
    let scope = registry.resolve(name, channels, is_training)?;
    BatchNorm::new(scope, *config).apply(x, is_training)
}
