use crate::{DType, Shape, Tensor};

#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    #[error("Cannot broadcast {0:?} with {1:?}.")]
    BroadcastMismatch(Shape, Shape),
    #[error("Cannot view {from:?} as {to:?}, element counts differ.")]
    NumelMismatch { from: Shape, to: Shape },
    #[error("DType mismatch, expected {expected:?}, got {actual:?}.")]
    DTypeMismatch { expected: DType, actual: DType },
    #[error("Invalid permutation {0:?}.")]
    InvalidPermutation(Vec<usize>),
    #[error("Axis {axis} out of range for rank {rank}.")]
    AxisOutOfRange { axis: usize, rank: usize },
}

/// # Enforcer
///
/// Enforcer enforces common invariants on tensors.
pub struct Enforcer;

impl Enforcer {
    pub fn assert_dtype(tensor: &Tensor, expected: DType) -> Result<(), InvariantError> {
        let actual = tensor.dt();
        if actual != expected {
            return Err(InvariantError::DTypeMismatch { expected, actual });
        }
        Ok(())
    }

    pub fn check_dtype_match(tensors: &[&Tensor]) -> Result<DType, InvariantError> {
        let dtype = tensors[0].dt();
        for tensor in tensors.iter().skip(1) {
            if dtype != tensor.dt() {
                return Err(InvariantError::DTypeMismatch {
                    expected: dtype,
                    actual: tensor.dt(),
                });
            }
        }
        Ok(dtype)
    }

    pub fn check_axes(axes: &[usize], rank: usize) -> Result<(), InvariantError> {
        match axes.iter().find(|&&a| a >= rank) {
            Some(&axis) => Err(InvariantError::AxisOutOfRange { axis, rank }),
            None => Ok(()),
        }
    }

    pub fn check_permutation(dims: &[usize], rank: usize) -> Result<(), InvariantError> {
        let mut seen = vec![false; rank];
        if dims.len() != rank {
            return Err(InvariantError::InvalidPermutation(dims.to_vec()));
        }
        for &d in dims {
            if d >= rank || seen[d] {
                return Err(InvariantError::InvalidPermutation(dims.to_vec()));
            }
            seen[d] = true;
        }
        Ok(())
    }
}
