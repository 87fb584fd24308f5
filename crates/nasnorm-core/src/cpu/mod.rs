pub(crate) mod binary;
pub(crate) mod reduce;
pub(crate) mod reindex;
pub(crate) mod select;
pub(crate) mod unary;

use crate::Shape;

/// Advances a row-major multi-index by one position.
#[inline]
pub(crate) fn increment_index(index: &mut [usize], shape: &Shape) {
    for d in (0..index.len()).rev() {
        index[d] += 1;
        if index[d] < shape[d] {
            return;
        }
        index[d] = 0;
    }
}
