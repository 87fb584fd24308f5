use super::increment_index;
use crate::{Shape, Strides, TensorDType};

/// Walks `dst_shape` in row-major order, reading `src` through `src_strides`.
fn gather_strided<T: TensorDType>(src: &[T], dst_shape: &Shape, src_strides: &[usize]) -> Vec<T> {
    assert_eq!(dst_shape.rank(), src_strides.len());
    let dst_numel = dst_shape.numel();
    let mut dst = Vec::with_capacity(dst_numel);
    let mut index = vec![0usize; dst_shape.rank()];
    for _ in 0..dst_numel {
        let src_index: usize = index
            .iter()
            .zip(src_strides.iter())
            .map(|(i, s)| i * s)
            .sum();
        dst.push(src[src_index]);
        increment_index(&mut index, dst_shape);
    }
    dst
}

pub(crate) fn permute<T: TensorDType>(src: &[T], src_shape: &Shape, dims: &[usize]) -> Vec<T> {
    assert_eq!(src.len(), src_shape.numel());
    let dst_shape = src_shape.permuted(dims);
    let strides = Strides::from(src_shape);
    let permuted_strides = dims
        .iter()
        .map(|&d| strides[d] as usize)
        .collect::<Vec<_>>();
    gather_strided(src, &dst_shape, &permuted_strides)
}

/// Numpy-style broadcast of `src` to `dst_shape`.
/// Caller guarantees the shapes are broadcast compatible.
pub(crate) fn broadcast<T: TensorDType>(src: &[T], src_shape: &Shape, dst_shape: &Shape) -> Vec<T> {
    assert_eq!(src.len(), src_shape.numel());
    if src_shape == dst_shape {
        return src.to_vec();
    }
    let rank = dst_shape.rank();
    let mut padded = vec![1usize; rank - src_shape.rank()];
    padded.extend(src_shape.iter());
    let padded = Shape::from(padded);
    let strides = Strides::from(&padded);
    let broadcast_strides = (0..rank)
        .map(|d| if padded[d] == 1 { 0 } else { strides[d] as usize })
        .collect::<Vec<_>>();
    gather_strided(src, dst_shape, &broadcast_strides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape;

    #[test]
    fn test_permute_nhwc_to_nchw() {
        // [1, 2, 2, 3] NHWC, value = h*6 + w*3 + c
        let src = (0..12).map(|x| x as f32).collect::<Vec<_>>();
        let dst = permute(&src, &shape![1, 2, 2, 3], &[0, 3, 1, 2]);
        assert_eq!(
            dst,
            vec![0., 3., 6., 9., 1., 4., 7., 10., 2., 5., 8., 11.]
        );
    }

    #[test]
    fn test_permute_inverse() {
        let src = (0..120).map(|x| x as f32).collect::<Vec<_>>();
        let shape = shape![2, 3, 4, 5];
        let there = permute(&src, &shape, &[0, 2, 3, 1]);
        let back = permute(&there, &shape![2, 4, 5, 3], &[0, 3, 1, 2]);
        assert_eq!(src, back);
    }

    #[test]
    fn test_broadcast_channel_vector() {
        let src = vec![1.0f32, 2.0];
        let dst = broadcast(&src, &shape![1, 2, 1, 1], &shape![2, 2, 1, 2]);
        assert_eq!(dst, vec![1., 1., 2., 2., 1., 1., 2., 2.]);
    }
}
