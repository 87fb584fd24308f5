use num_traits::Float;

use super::increment_index;
use crate::{Shape, Strides, TensorDType};

/// Maps every source element to its slot in the reduced (keep-dims) output.
fn reduced_offsets(shape: &Shape, axes: &[usize]) -> (Shape, Vec<usize>) {
    let reduced = shape.reduced(axes);
    let strides = Strides::from(&reduced);
    let out_strides = (0..shape.rank())
        .map(|d| if axes.contains(&d) { 0 } else { strides[d] as usize })
        .collect::<Vec<_>>();

    let mut offsets = Vec::with_capacity(shape.numel());
    let mut index = vec![0usize; shape.rank()];
    for _ in 0..shape.numel() {
        offsets.push(
            index
                .iter()
                .zip(out_strides.iter())
                .map(|(i, s)| i * s)
                .sum(),
        );
        increment_index(&mut index, shape);
    }
    (reduced, offsets)
}

/// Mean and biased variance over `axes`.
///
/// Returns the keep-dims shape together with the flattened statistics.
/// Two passes over the data: the variance is accumulated around the mean.
pub(crate) fn moments<T>(src: &[T], shape: &Shape, axes: &[usize]) -> (Shape, Vec<T>, Vec<T>)
where
    T: TensorDType + Float,
{
    assert_eq!(src.len(), shape.numel());
    let (reduced, offsets) = reduced_offsets(shape, axes);
    let out_numel = reduced.numel();
    let count = T::from(shape.numel() / out_numel.max(1)).unwrap_or_else(<T as num_traits::One>::one);

    let mut mean = vec![T::zero(); out_numel];
    for (x, &o) in src.iter().zip(offsets.iter()) {
        mean[o] = mean[o] + *x;
    }
    mean.iter_mut().for_each(|m| *m = *m / count);

    let mut var = vec![T::zero(); out_numel];
    for (x, &o) in src.iter().zip(offsets.iter()) {
        let d = *x - mean[o];
        var[o] = var[o] + d * d;
    }
    var.iter_mut().for_each(|v| *v = *v / count);

    (reduced, mean, var)
}

pub(crate) fn reduce_max<T>(src: &[T], shape: &Shape, axes: &[usize]) -> (Shape, Vec<T>)
where
    T: TensorDType + Float,
{
    assert_eq!(src.len(), shape.numel());
    let (reduced, offsets) = reduced_offsets(shape, axes);
    let mut max = vec![T::neg_infinity(); reduced.numel()];
    for (x, &o) in src.iter().zip(offsets.iter()) {
        max[o] = max[o].max(*x);
    }
    (reduced, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape;

    #[test]
    fn test_moments_per_channel_nhwc() {
        // N=2, H=1, W=1, C=2
        let src = vec![1.0f32, 10.0, 3.0, 30.0];
        let (reduced, mean, var) = moments(&src, &shape![2, 1, 1, 2], &[0, 1, 2]);
        assert_eq!(reduced, shape![1, 1, 1, 2]);
        assert_eq!(mean, vec![2.0, 20.0]);
        assert_eq!(var, vec![1.0, 100.0]);
    }

    #[test]
    fn test_moments_inner_axes() {
        let src = vec![0.0f32, 2.0, 4.0, 6.0, 1.0, 1.0];
        let (reduced, mean, var) = moments(&src, &shape![3, 2], &[1]);
        assert_eq!(reduced, shape![3, 1]);
        assert_eq!(mean, vec![1.0, 5.0, 1.0]);
        assert_eq!(var, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_reduce_max() {
        let src = vec![-1.0f32, 5.0, 2.0, -7.0];
        let (reduced, max) = reduce_max(&src, &shape![2, 2], &[0]);
        assert_eq!(reduced, shape![1, 2]);
        assert_eq!(max, vec![2.0, 5.0]);
    }
}
