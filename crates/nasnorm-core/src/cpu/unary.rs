use crate::TensorDType;

#[inline]
pub(crate) fn unary_map_inplace<T: TensorDType>(src: &mut [T], f: impl Fn(T) -> T) {
    for x in src.iter_mut() {
        *x = f(*x);
    }
}
