use num_traits::NumOps;

use super::reindex::broadcast;
use crate::{Shape, TensorDType};

#[inline]
pub(crate) fn binary_map<T: TensorDType, U: TensorDType>(
    lhs: &[T],
    rhs: &[T],
    dst: &mut [U],
    f: fn(T, T) -> U,
) {
    assert_eq!(lhs.len(), dst.len());
    assert_eq!(rhs.len(), dst.len());
    for ((l, r), d) in lhs
        .iter()
        .copied()
        .zip(rhs.iter().copied())
        .zip(dst.iter_mut())
    {
        *d = f(l, r);
    }
}

/// Broadcasts both operands to `dst_shape` and applies `f` elementwise.
pub(crate) fn binary_apply<T: TensorDType>(
    lhs: &[T],
    lhs_shape: &Shape,
    rhs: &[T],
    rhs_shape: &Shape,
    dst_shape: &Shape,
    f: fn(T, T) -> T,
) -> Vec<T> {
    let lhs = broadcast(lhs, lhs_shape, dst_shape);
    let rhs = broadcast(rhs, rhs_shape, dst_shape);
    let mut dst = vec![T::zero(); dst_shape.numel()];
    binary_map(&lhs, &rhs, &mut dst, f);
    dst
}

macro_rules! cpu_binary_op_fn {
    ($method_name:ident, $op:tt) => {
        #[inline]
        pub(crate) fn $method_name<T: TensorDType + NumOps>(lhs: T, rhs: T) -> T {
            lhs $op rhs
        }
    };
}

cpu_binary_op_fn!(add, +);
cpu_binary_op_fn!(sub, -);
cpu_binary_op_fn!(mul, *);
cpu_binary_op_fn!(div, /);
