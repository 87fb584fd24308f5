use bytemuck::NoUninit;

use crate::{DType, Shape, TensorDType};

/// Managed CPU buffer.
///
/// Holds the raw bytes of a tensor in row-major order. Reads go through
/// `bytemuck::pod_collect_to_vec`, which copies into a correctly aligned
/// allocation for the requested element type.
#[derive(Clone, PartialEq, Eq)]
pub struct CPUBuffer {
    bytes: Vec<u8>,
}

impl CPUBuffer {
    pub fn from_slice<T: NoUninit>(data: &[T], shape: &Shape) -> Self {
        assert_eq!(data.len(), shape.numel());
        let bytes: &[u8] = bytemuck::cast_slice(data);
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn zeros<T: TensorDType>(shape: &Shape) -> Self {
        Self {
            bytes: vec![0u8; shape.numel() * T::dt().size_of()],
        }
    }

    pub fn n_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec<T: TensorDType>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec::<u8, T>(&self.bytes)
    }

    pub fn dump(&self, dtype: DType, full: bool) -> String {
        fn dump_inner<T: TensorDType>(data: &[T], full: bool) -> String {
            let length = if data.len() < 64 { data.len() } else { 64 };
            if full {
                format!("{:?}", data)
            } else {
                format!("{:?}...{:?}", &data[..length], &data[data.len() - length..])
            }
        }
        match dtype {
            DType::F32 => dump_inner(&self.to_vec::<f32>(), full),
            DType::I32 => dump_inner(&self.to_vec::<i32>(), full),
            DType::U32 => dump_inner(&self.to_vec::<u32>(), full),
        }
    }
}

impl std::fmt::Debug for CPUBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CPUBuffer")
            .field("n_bytes", &self.n_bytes())
            .finish()
    }
}
