use derive_new::new;
use nasnorm::{shape, OperationError, Tensor};

use crate::{GroupNormConfig, NormError, NormRegistry, ScopeHandle};

/// Number of groups actually used for `channels` channels.
///
/// Requests above the channel count are clamped down to it.
pub fn effective_groups(requested: usize, channels: usize) -> Result<usize, NormError> {
    if requested == 0 {
        return Err(NormError::InvalidGroupCount(requested));
    }
    let groups = requested.min(channels);
    if groups < requested {
        log::warn!(
            "Clamping group count {} to channel count {}",
            requested,
            channels
        );
    }
    if groups == 0 || channels % groups != 0 {
        return Err(NormError::GroupMismatch { channels, groups });
    }
    Ok(groups)
}

/// Group normalization. `scale` and `offset` of the scope act as gamma and beta.
#[derive(Debug, Clone, new)]
pub struct GroupNorm {
    scope: ScopeHandle,
    config: GroupNormConfig,
}

impl GroupNorm {
    pub fn scope(&self) -> &ScopeHandle {
        &self.scope
    }

    pub fn apply(&self, x: &Tensor) -> Result<Tensor, NormError> {
        let GroupNormConfig {
            epsilon,
            num_groups,
            layout,
        } = self.config;
        let channels = layout.channels(x)?;
        self.scope.check_channels(channels)?;
        let groups = effective_groups(num_groups, channels)?;

        let nchw = match layout.to_channels_first() {
            Some(dims) => x.permute(&dims)?,
            None => x.clone(),
        };
        let [n, c, h, w]: [usize; 4] = nchw.shape().try_into().map_err(OperationError::from)?;

        let grouped = nchw.view(shape![n, groups, c / groups, h, w])?;
        let (mean, var) = grouped.moments(&[2, 3, 4])?;
        let normed = grouped
            .sub(&mean)?
            .div(&var.affine(1.0, epsilon)?.sqrt()?)?
            .view(shape![n, c, h, w])?;

        let y = normed
            .mul(&self.scope.scale().view(shape![1, c, 1, 1])?)?
            .add(&self.scope.offset().view(shape![1, c, 1, 1])?)?;

        let y = match layout.from_channels_first() {
            Some(dims) => y.permute(&dims)?,
            None => y,
        };
        Ok(y.view(x.shape().clone())?)
    }
}

impl crate::Module for GroupNorm {
    type Input = Tensor;

    fn schedule(&self, input: Self::Input) -> anyhow::Result<Tensor> {
        Ok(self.apply(&input)?)
    }
}

/// Group normalization through a named scope, `"group_norm"` by default.
///
/// The mode flag only decides whether the scope may be created.
pub fn group_norm(
    registry: &NormRegistry,
    x: &Tensor,
    is_training: bool,
    name: Option<&str>,
    config: &GroupNormConfig,
) -> Result<Tensor, NormError> {
    let name = name.unwrap_or("group_norm");
    let channels = config.layout.channels(x)?;
    let scope = registry.resolve(name, channels, is_training)?;
    GroupNorm::new(scope, *config).apply(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataLayout, ErrorKind, Module};
    use nasnorm::NDArrayExt;

    #[test]
    fn test_effective_groups() {
        assert_eq!(effective_groups(32, 64).unwrap(), 32);
        assert_eq!(effective_groups(32, 16).unwrap(), 16);
        assert!(matches!(
            effective_groups(4, 6),
            Err(NormError::GroupMismatch { channels: 6, groups: 4 })
        ));
        let err = effective_groups(0, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_groups_are_standardized() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = NormRegistry::new();
        let config = GroupNormConfig {
            num_groups: 2,
            layout: DataLayout::ChannelsFirst,
            ..Default::default()
        };
        let x = Tensor::randn::<f32>(shape![3, 4, 5, 5]).affine(3.0, 7.0)?;
        let y = group_norm(&registry, &x, true, None, &config)?;

        let grouped = y.to_ndarray::<f32>()?.into_shape(vec![3, 2, 2, 5, 5])?;
        let (mean, var) = grouped
            .moments(&[2, 3, 4])
            .ok_or_else(|| anyhow::anyhow!("empty reduction"))?;
        assert!(mean.iter().all(|m| m.abs() < 1e-4));
        assert!(var.iter().all(|v| (v - 1.0).abs() < 1e-3));
        Ok(())
    }

    #[test]
    fn test_layouts_agree() -> anyhow::Result<()> {
        let registry = NormRegistry::new();
        let nchw = Tensor::randn::<f32>(shape![2, 8, 3, 4]);
        let nhwc = nchw.permute(&[0, 2, 3, 1])?;
        let first = GroupNormConfig {
            num_groups: 4,
            layout: DataLayout::ChannelsFirst,
            ..Default::default()
        };
        let last = GroupNormConfig {
            layout: DataLayout::ChannelsLast,
            ..first
        };
        let scope = registry.create_scope("gn", 8)?;
        scope.assign("scale", &[1.0, 2.0, 3.0, 4.0, 0.5, 0.5, 1.0, 1.0])?;
        scope.assign("offset", &[0.0, 0.0, 1.0, 1.0, -1.0, -1.0, 0.0, 0.0])?;

        let a = GroupNorm::new(scope.clone(), first).schedule(nchw)?;
        let b = GroupNorm::new(scope, last).schedule(nhwc)?;
        a.permute(&[0, 2, 3, 1])?.all_close(&b, 1e-5, 1e-5)?;
        Ok(())
    }

    #[test]
    fn test_clamped_groups_normalize_each_channel() -> anyhow::Result<()> {
        let registry = NormRegistry::new();
        let config = GroupNormConfig::default();
        let x = Tensor::randn::<f32>(shape![2, 4, 4, 3]);
        let y = group_norm(&registry, &x, true, Some("gn_small"), &config)?;
        assert_eq!(y.shape(), x.shape());

        let (mean, _) = y
            .to_ndarray::<f32>()?
            .moments(&[1, 2])
            .ok_or_else(|| anyhow::anyhow!("empty reduction"))?;
        assert!(mean.iter().all(|m| m.abs() < 1e-4));
        Ok(())
    }

    #[test]
    fn test_inference_requires_scope() {
        let registry = NormRegistry::new();
        let x = Tensor::randn::<f32>(shape![1, 2, 2, 4]);
        let err = group_norm(&registry, &x, false, None, &GroupNormConfig::default()).unwrap_err();
        assert!(matches!(err, NormError::UninitializedScope(_)));
    }
}
