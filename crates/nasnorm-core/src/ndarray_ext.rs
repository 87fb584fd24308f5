use ndarray::{ArrayBase, ArrayD, Axis, Data, Dimension};
use num_traits::{Float, FromPrimitive};

pub trait NDArrayExt<A, S, D>
where
    S: Data<Elem = A>,
    D: Dimension,
{
    /// Mean and biased variance over `axes`, keeping the reduced axes as size 1.
    /// Empty axes produce `None`.
    fn moments(&self, axes: &[usize]) -> Option<(ArrayD<A>, ArrayD<A>)>
    where
        A: Float + FromPrimitive;
}

fn mean_keep_dims<A: Float + FromPrimitive>(x: ArrayD<A>, axes: &[usize]) -> Option<ArrayD<A>> {
    axes.iter().try_fold(x, |acc, &axis| {
        acc.mean_axis(Axis(axis))
            .map(|reduced| reduced.insert_axis(Axis(axis)))
    })
}

impl<A, S, D> NDArrayExt<A, S, D> for ArrayBase<S, D>
where
    S: Data<Elem = A>,
    D: Dimension,
{
    fn moments(&self, axes: &[usize]) -> Option<(ArrayD<A>, ArrayD<A>)>
    where
        A: Float + FromPrimitive,
    {
        let x = self.to_owned().into_dyn();
        let mean = mean_keep_dims(x.clone(), axes)?;
        let mut squared = x;
        squared.zip_mut_with(&mean, |v, &m| *v = (*v - m) * (*v - m));
        let var = mean_keep_dims(squared, axes)?;
        Some((mean, var))
    }
}
