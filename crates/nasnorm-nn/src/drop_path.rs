use nasnorm::{shape, Shape, Tensor};
use rand::Rng;

use crate::NormError;

fn check_keep_prob(keep_prob: f32) -> Result<(), NormError> {
    if keep_prob > 0.0 && keep_prob <= 1.0 {
        Ok(())
    } else {
        Err(NormError::InvalidKeepProbability(keep_prob))
    }
}

/// Zeroes whole samples with probability `1 - keep_prob` and scales the
/// survivors by `1 / keep_prob`.
pub fn drop_path(x: &Tensor, keep_prob: f32) -> Result<Tensor, NormError> {
    drop_path_with_rng(x, keep_prob, &mut rand::thread_rng())
}

pub fn drop_path_with_rng<R: Rng + ?Sized>(
    x: &Tensor,
    keep_prob: f32,
    rng: &mut R,
) -> Result<Tensor, NormError> {
    check_keep_prob(keep_prob)?;
    if x.rank() != 4 {
        return Err(NormError::Rank {
            expected: 4,
            actual: x.shape().clone(),
        });
    }

    // one draw per sample, broadcast over everything else. In f32 `keep_prob + u`
    // can round up to 2.0, so the floored indicator is clamped to {0, 1}.
    let keep = Tensor::rand_with_rng::<f32, _>(shape![x.shape()[0], 1, 1, 1], rng)
        .affine(1.0, keep_prob)?
        .floor()?
        .clamp(0.0, 1.0)?;

    let scale = Tensor::full(keep_prob, &Shape::from(vec![1]));
    Ok(x.div(&scale)?.mul(&keep)?)
}

/// Path drop as a [`crate::Module`], re-randomized on every call.
#[derive(Debug, Clone, Copy)]
pub struct DropPath {
    keep_prob: f32,
}

impl DropPath {
    pub fn new(keep_prob: f32) -> Result<Self, NormError> {
        check_keep_prob(keep_prob)?;
        Ok(Self { keep_prob })
    }

    pub fn keep_prob(&self) -> f32 {
        self.keep_prob
    }
}

impl crate::Module for DropPath {
    type Input = Tensor;

    fn schedule(&self, input: Self::Input) -> anyhow::Result<Tensor> {
        Ok(drop_path(&input, self.keep_prob)?)
    }
}
