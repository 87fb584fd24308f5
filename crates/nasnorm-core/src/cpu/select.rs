use num_traits::NumOps;

use crate::TensorDType;

/// Positions of the `true` entries, ascending.
pub fn mask_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

/// Order preserving gather of the entries selected by `mask`.
pub fn boolean_mask<T: TensorDType>(src: &[T], mask: &[bool]) -> Vec<T> {
    assert_eq!(src.len(), mask.len());
    src.iter()
        .zip(mask.iter())
        .filter_map(|(&x, &m)| m.then_some(x))
        .collect()
}

/// `dst[indices[i]] -= updates[i]`
pub fn scatter_sub<T: TensorDType + NumOps>(dst: &mut [T], indices: &[usize], updates: &[T]) {
    assert_eq!(indices.len(), updates.len());
    for (&i, &u) in indices.iter().zip(updates.iter()) {
        dst[i] = dst[i] - u;
    }
}
