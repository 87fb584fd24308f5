use nasnorm::Tensor;

use crate::{DataLayout, NormError};

/// Mean over the spatial axes, `[N, C]` out.
pub fn global_avg_pool(x: &Tensor, layout: DataLayout) -> Result<Tensor, NormError> {
    layout.channels(x)?;
    Ok(x.mean_axes(&layout.spatial_axes())?)
}

/// Maximum over the spatial axes, `[N, C]` out.
pub fn global_max_pool(x: &Tensor, layout: DataLayout) -> Result<Tensor, NormError> {
    layout.channels(x)?;
    Ok(x.max_axes(&layout.spatial_axes())?)
}
