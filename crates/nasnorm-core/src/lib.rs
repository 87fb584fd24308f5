#![allow(non_snake_case)]
mod cpu;
mod dtype;
mod enforcer;
#[cfg(feature = "testing")]
mod ndarray_ext;
mod op;
mod shape;
mod storage;
mod strides;
mod tensor;
mod tensor_id;

pub use dtype::*;
pub use enforcer::*;
#[cfg(feature = "testing")]
pub use ndarray_ext::*;
pub use op::*;
pub use cpu::select::{boolean_mask, mask_indices, scatter_sub};
pub use shape::*;
pub use storage::*;
pub use strides::*;
pub use tensor::*;
pub use tensor_id::*;

use smallvec::SmallVec;
pub type RVec<T> = SmallVec<[T; 4]>;

//https://github.com/sonos/tract/blob/main/data/src/macros.rs#L2
#[macro_export]
macro_rules! rvec {
    (@one $x:expr) => (1usize);
    ($elem:expr; $n:expr) => ({
        $crate::RVec::from_elem($elem, $n)
    });
    ($($x:expr),*$(,)*) => ({
        let count = 0usize $(+ rvec![@one $x])*;
        #[allow(unused_mut)]
        let mut vec = $crate::RVec::new();
        if count <= vec.inline_size() {
            $(vec.push($x);)*
            vec
        } else {
            $crate::RVec::from_vec(vec![$($x,)*])
        }
    });
}

#[macro_export]
macro_rules! shape {
    ($($x:expr),*$(,)*) => ({
        use $crate::rvec;
        $crate::Shape::new(rvec![$($x,)*])
    });
}
