use crate::cpu::{binary, reduce, reindex, unary};
use crate::{
    CPUBuffer, DType, Enforcer, InvariantError, OperationError, Shape, Strides, TensorDType,
    TensorId,
};

use derive_new::new;
use num_traits::Float;

use std::sync::Arc;

#[cfg(feature = "rand")]
use {rand::prelude::*, rand_distr::StandardNormal};

#[cfg(feature = "testing")]
use ndarray::{ArrayD, ArrayViewD};

/// A multi-dimensional array of data.
///
/// Tensors are eager and immutable: every operation resolves immediately on
/// the CPU and returns a new tensor. Cloning a tensor is cheap, the underlying
/// buffer is shared.
#[derive(Clone)]
pub struct Tensor {
    inner: Arc<Inner>,
}

/// Tensors are just an view into their underlying byte storage.
#[derive(new, Debug, Clone, PartialEq)]
struct StorageView {
    shape: Shape,
    dt: DType,
    strides: Strides,
}

#[derive(Debug)]
struct Inner {
    id: TensorId,
    view: StorageView,
    storage: Arc<CPUBuffer>,
}

impl Tensor {
    fn new(view: StorageView, storage: Arc<CPUBuffer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: TensorId::new(),
                view,
                storage,
            }),
        }
    }

    fn from_vec<T: TensorDType>(data: Vec<T>, shape: Shape) -> Self {
        Self::from_data(data, shape)
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.id())
            .field("shape", self.shape())
            .field("dt", &self.dt())
            .field("storage", &self.inner.storage.dump(self.dt(), false))
            .finish()
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Tensor {
    pub fn id(&self) -> TensorId {
        self.inner.id
    }

    pub fn rank(&self) -> usize {
        self.inner.view.shape.len()
    }

    pub fn dt(&self) -> DType {
        self.inner.view.dt
    }

    pub fn shape(&self) -> &Shape {
        &self.inner.view.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.inner.view.strides
    }

    pub fn numel(&self) -> usize {
        self.shape().numel()
    }

    pub fn storage(&self) -> &CPUBuffer {
        &self.inner.storage
    }
}

impl Tensor {
    /// Creates a new tensor from a chunk of data.
    ///
    /// Panics if the data length does not match the shape.
    pub fn from_data<T: TensorDType, U: AsRef<[T]>>(data: U, shape: Shape) -> Tensor {
        let storage = CPUBuffer::from_slice(data.as_ref(), &shape);
        let strides = Strides::from(&shape);
        let meta = StorageView::new(shape, T::dt(), strides);
        Tensor::new(meta, Arc::new(storage))
    }

    pub fn zeros<T: TensorDType>(shape: &Shape) -> Tensor {
        let storage = CPUBuffer::zeros::<T>(shape);
        let meta = StorageView::new(shape.clone(), T::dt(), Strides::from(shape));
        Tensor::new(meta, Arc::new(storage))
    }

    pub fn ones<T: TensorDType>(shape: &Shape) -> Tensor {
        Self::from_vec(vec![T::one(); shape.numel()], shape.clone())
    }

    pub fn full<T: TensorDType>(value: T, shape: &Shape) -> Tensor {
        Self::from_vec(vec![value; shape.numel()], shape.clone())
    }

    #[cfg(feature = "rand")]
    pub fn randn<T: TensorDType + Float>(shape: Shape) -> Self {
        Self::randn_with_rng::<T, _>(shape, &mut rand::thread_rng())
    }

    #[cfg(feature = "rand")]
    pub fn randn_with_rng<T: TensorDType + Float, R: Rng + ?Sized>(shape: Shape, rng: &mut R) -> Self {
        let data = (0..shape.numel())
            .map(|_| {
                let sample: f32 = StandardNormal.sample(rng);
                T::from(sample).unwrap_or_else(T::zero)
            })
            .collect::<Vec<_>>();
        Self::from_vec(data, shape)
    }

    /// Uniform samples in `[0, 1)`.
    #[cfg(feature = "rand")]
    pub fn rand_with_rng<T: TensorDType + Float, R: Rng + ?Sized>(shape: Shape, rng: &mut R) -> Self {
        let data = (0..shape.numel())
            .map(|_| {
                let sample: f32 = rng.gen();
                T::from(sample).unwrap_or_else(T::zero)
            })
            .collect::<Vec<_>>();
        Self::from_vec(data, shape)
    }

    /// Converts the tensor into a 1D vector.
    ///
    /// The 1D vector contains the data from the tensor, as it was laid out in memory.
    pub fn to_vec<T: TensorDType>(&self) -> Result<Vec<T>, InvariantError> {
        Enforcer::assert_dtype(self, T::dt())?;
        Ok(self.inner.storage.to_vec::<T>())
    }

    fn float_data(&self) -> Result<Vec<f32>, OperationError> {
        Ok(self.to_vec::<f32>()?)
    }
}

impl Tensor {
    /// Reinterprets the tensor with a new shape, sharing the underlying buffer.
    pub fn view(&self, shape: Shape) -> Result<Tensor, OperationError> {
        if shape.numel() != self.numel() {
            return Err(InvariantError::NumelMismatch {
                from: self.shape().clone(),
                to: shape,
            })?;
        }
        let strides = Strides::from(&shape);
        let meta = StorageView::new(shape, self.dt(), strides);
        Ok(Tensor::new(meta, self.inner.storage.clone()))
    }

    /// Physically reorders the data, `dims[i]` is the source axis of output axis `i`.
    pub fn permute(&self, dims: &[usize]) -> Result<Tensor, OperationError> {
        Enforcer::check_permutation(dims, self.rank())?;
        let shape = self.shape().permuted(dims);
        let out = match self.dt() {
            DType::F32 => Self::from_vec(reindex::permute(&self.to_vec::<f32>()?, self.shape(), dims), shape),
            DType::I32 => Self::from_vec(reindex::permute(&self.to_vec::<i32>()?, self.shape(), dims), shape),
            DType::U32 => Self::from_vec(reindex::permute(&self.to_vec::<u32>()?, self.shape(), dims), shape),
        };
        Ok(out)
    }

    fn binary_op(&self, other: &Tensor, f: fn(f32, f32) -> f32) -> Result<Tensor, OperationError> {
        Enforcer::check_dtype_match(&[self, other])?;
        Enforcer::assert_dtype(self, DType::F32)?;
        let dst_shape = Shape::multi_broadcast(&[self.shape(), other.shape()]).ok_or_else(|| {
            InvariantError::BroadcastMismatch(self.shape().clone(), other.shape().clone())
        })?;
        let result = binary::binary_apply(
            &self.float_data()?,
            self.shape(),
            &other.float_data()?,
            other.shape(),
            &dst_shape,
            f,
        );
        Ok(Self::from_vec(result, dst_shape))
    }

    pub fn add(&self, other: &Tensor) -> Result<Tensor, OperationError> {
        self.binary_op(other, binary::add::<f32>)
    }

    pub fn sub(&self, other: &Tensor) -> Result<Tensor, OperationError> {
        self.binary_op(other, binary::sub::<f32>)
    }

    pub fn mul(&self, other: &Tensor) -> Result<Tensor, OperationError> {
        self.binary_op(other, binary::mul::<f32>)
    }

    pub fn div(&self, other: &Tensor) -> Result<Tensor, OperationError> {
        self.binary_op(other, binary::div::<f32>)
    }

    fn unary_op(&self, f: impl Fn(f32) -> f32) -> Result<Tensor, OperationError> {
        let mut data = self.float_data()?;
        unary::unary_map_inplace(&mut data, f);
        Ok(Self::from_vec(data, self.shape().clone()))
    }

    /// `x * mul + add`
    pub fn affine(&self, mul: f32, add: f32) -> Result<Tensor, OperationError> {
        self.unary_op(|x| x * mul + add)
    }

    pub fn floor(&self) -> Result<Tensor, OperationError> {
        self.unary_op(f32::floor)
    }

    pub fn sqrt(&self) -> Result<Tensor, OperationError> {
        self.unary_op(f32::sqrt)
    }

    pub fn relu(&self) -> Result<Tensor, OperationError> {
        self.leaky_relu(0.0)
    }

    /// `x` where `x > 0`, `x * leak` elsewhere.
    pub fn leaky_relu(&self, leak: f32) -> Result<Tensor, OperationError> {
        self.unary_op(move |x| if x > 0.0 { x } else { x * leak })
    }

    /// Limits every element to `[min, max]`.
    pub fn clamp(&self, min: f32, max: f32) -> Result<Tensor, OperationError> {
        self.unary_op(move |x| x.clamp(min, max))
    }

    /// Mean and biased variance over `axes`, both in keep-dims shape.
    pub fn moments(&self, axes: &[usize]) -> Result<(Tensor, Tensor), OperationError> {
        Enforcer::check_axes(axes, self.rank())?;
        let (reduced, mean, var) = reduce::moments(&self.float_data()?, self.shape(), axes);
        Ok((
            Self::from_vec(mean, reduced.clone()),
            Self::from_vec(var, reduced),
        ))
    }

    /// Mean over `axes`, reduced axes are removed.
    pub fn mean_axes(&self, axes: &[usize]) -> Result<Tensor, OperationError> {
        let (mean, _) = self.moments(axes)?;
        mean.view(squeeze(self.shape(), axes))
    }

    /// Maximum over `axes`, reduced axes are removed.
    pub fn max_axes(&self, axes: &[usize]) -> Result<Tensor, OperationError> {
        Enforcer::check_axes(axes, self.rank())?;
        let (_, max) = reduce::reduce_max(&self.float_data()?, self.shape(), axes);
        Ok(Self::from_vec(max, squeeze(self.shape(), axes)))
    }
}

fn squeeze(shape: &Shape, axes: &[usize]) -> Shape {
    shape
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| (!axes.contains(&i)).then_some(d))
        .collect::<Vec<_>>()
        .into()
}

#[cfg(feature = "testing")]
impl Tensor {
    pub fn all_close(&self, other: &Self, atol: f32, rtol: f32) -> anyhow::Result<()> {
        if self.shape() != other.shape() {
            anyhow::bail!("Shape mismatch {:?} != {:?}", self.shape(), other.shape())
        }

        let self_nd = self.to_ndarray::<f32>()?;
        let other_nd = other.to_ndarray::<f32>()?;
        let mut stats = CloseStats::new(atol, rtol);

        ndarray::indices_of(&self_nd).into_iter().for_each(|idx| {
            let (a, b) = (self_nd[&idx], other_nd[&idx]);
            stats.update(&a, &b, idx);
        });

        if stats.fail_count > 0 {
            anyhow::bail!(
                "{} samples not close - AVGE={} MAE={} at {:?}",
                stats.fail_count,
                stats.avg_error(),
                stats.max_abs_error,
                stats.max_abs_error_idxs,
            );
        } else {
            log::debug!(
                "All close - AVGE={} MAE={} at {:?}",
                stats.avg_error(),
                stats.max_abs_error,
                stats.max_abs_error_idxs
            );
            Ok(())
        }
    }

    pub fn to_ndarray<T: TensorDType>(&self) -> anyhow::Result<ArrayD<T>> {
        let shape = self.shape().to_vec();
        Ok(ArrayD::from_shape_vec(ndarray::IxDyn(&shape), self.to_vec::<T>()?)?)
    }
}

#[cfg(feature = "testing")]
impl<T: TensorDType> From<ArrayViewD<'_, T>> for Tensor {
    fn from(view: ArrayViewD<'_, T>) -> Self {
        let shape = Shape::from(view.shape());
        let data = view.iter().copied().collect::<Vec<_>>();
        Tensor::from_vec(data, shape)
    }
}

#[cfg(feature = "testing")]
impl<T: TensorDType> From<ArrayD<T>> for Tensor {
    fn from(array: ArrayD<T>) -> Self {
        Self::from(array.view())
    }
}

#[cfg(feature = "testing")]
struct CloseStats {
    total_error: f32,
    max_abs_error: f32,
    max_abs_error_idxs: Option<ndarray::IxDyn>,
    element_count: usize,
    fail_count: usize,
    atol: f32,
    rtol: f32,
}

#[cfg(feature = "testing")]
impl CloseStats {
    fn new(atol: f32, rtol: f32) -> Self {
        Self {
            total_error: 0.0,
            max_abs_error: 0.0,
            max_abs_error_idxs: None,
            element_count: 0,
            fail_count: 0,
            atol,
            rtol,
        }
    }

    fn update(&mut self, a: &f32, b: &f32, index: ndarray::IxDyn) {
        let abs_diff = (a - b).abs();
        self.total_error += abs_diff;
        self.element_count += 1;

        if abs_diff > self.max_abs_error {
            self.max_abs_error = abs_diff;
            self.max_abs_error_idxs = Some(index);
        }

        if !self.is_close(a, b, abs_diff) {
            self.fail_count += 1;
        }
    }

    fn avg_error(&self) -> f32 {
        self.total_error / self.element_count.max(1) as f32
    }

    fn is_close(&self, a: &f32, b: &f32, abs_diff: f32) -> bool {
        (a.is_nan() && b.is_nan())
            || (a.is_infinite() && b.is_infinite() && a.signum() == b.signum())
            || abs_diff <= self.atol + self.rtol * b.abs()
    }
}
