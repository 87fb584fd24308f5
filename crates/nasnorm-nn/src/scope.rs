use std::sync::Arc;

use nasnorm::{boolean_mask, scatter_sub, Shape, Tensor};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::NormError;

/// `running -= (running - value) * (1 - decay)`
///
/// Same fixed point as `decay * running + (1 - decay) * value`.
pub(crate) fn assign_moving_average(running: &mut [f32], value: &[f32], decay: f32) {
    debug_assert_eq!(running.len(), value.len());
    running
        .iter_mut()
        .zip(value.iter())
        .for_each(|(r, v)| *r -= (*r - v) * (1.0 - decay));
}

/// Moving mean and variance of a scope, always sized to the full channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    pub mean: Vec<f32>,
    pub variance: Vec<f32>,
}

impl RunningStats {
    fn new(channels: usize) -> Self {
        Self {
            mean: vec![0.0; channels],
            variance: vec![1.0; channels],
        }
    }
}

/// A named checkpointable value.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub trainable: bool,
    pub value: Tensor,
}

/// Parameters and running statistics of one normalization layer.
///
/// `scale` doubles as `gamma` and `offset` as `beta` for group norm.
/// Mean and variance sit behind a single lock so a statistics update is
/// observed all-or-nothing.
#[derive(Debug)]
pub struct NormScope {
    name: String,
    channels: usize,
    scale: RwLock<Vec<f32>>,
    offset: RwLock<Vec<f32>>,
    stats: RwLock<RunningStats>,
}

pub type ScopeHandle = Arc<NormScope>;

const SCALE: &str = "scale";
const OFFSET: &str = "offset";
const MOVING_MEAN: &str = "moving_mean";
const MOVING_VARIANCE: &str = "moving_variance";

impl NormScope {
    fn new(name: &str, channels: usize) -> Self {
        Self {
            name: name.to_string(),
            channels,
            scale: RwLock::new(vec![1.0; channels]),
            offset: RwLock::new(vec![0.0; channels]),
            stats: RwLock::new(RunningStats::new(channels)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn vector(&self, data: &[f32]) -> Tensor {
        Tensor::from_data(data, Shape::from(vec![data.len()]))
    }

    pub fn scale(&self) -> Tensor {
        self.vector(&self.scale.read())
    }

    pub fn offset(&self) -> Tensor {
        self.vector(&self.offset.read())
    }

    pub fn moving_mean(&self) -> Tensor {
        self.vector(&self.stats.read().mean)
    }

    pub fn moving_variance(&self) -> Tensor {
        self.vector(&self.stats.read().variance)
    }

    pub fn running_stats(&self) -> RunningStats {
        self.stats.read().clone()
    }

    pub(crate) fn check_channels(&self, actual: usize) -> Result<(), NormError> {
        if actual != self.channels {
            return Err(NormError::ChannelMismatch {
                scope: self.name.clone(),
                expected: self.channels,
                actual,
            });
        }
        Ok(())
    }

    pub(crate) fn check_mask(&self, mask: &[bool]) -> Result<(), NormError> {
        if mask.len() != self.channels {
            return Err(NormError::MaskLength {
                expected: self.channels,
                actual: mask.len(),
            });
        }
        Ok(())
    }

    /// `(scale, offset)` restricted to the masked channels.
    pub(crate) fn masked_params(&self, mask: &[bool]) -> (Tensor, Tensor) {
        let scale = boolean_mask(&self.scale.read(), mask);
        let offset = boolean_mask(&self.offset.read(), mask);
        (self.vector(&scale), self.vector(&offset))
    }

    /// `(moving_mean, moving_variance)` restricted to the masked channels.
    pub(crate) fn masked_stats(&self, mask: &[bool]) -> (Tensor, Tensor) {
        let stats = self.stats.read();
        let mean = boolean_mask(&stats.mean, mask);
        let variance = boolean_mask(&stats.variance, mask);
        (self.vector(&mean), self.vector(&variance))
    }

    pub(crate) fn update_moving_average(&self, mean: &[f32], variance: &[f32], decay: f32) {
        let mut stats = self.stats.write();
        assign_moving_average(&mut stats.mean, mean, decay);
        assign_moving_average(&mut stats.variance, variance, decay);
    }

    /// Moving average update over the channels at `indices` only.
    ///
    /// Computes `(1 - decay) * (running[indices] - batch)` and scatter-subtracts it
    /// while holding the write lock, so concurrent updates over disjoint indices
    /// never lose each other's writes.
    pub(crate) fn scatter_moving_average(
        &self,
        indices: &[usize],
        mean: &[f32],
        variance: &[f32],
        decay: f32,
    ) {
        let mut stats = self.stats.write();
        let delta = |running: &[f32], batch: &[f32]| {
            indices
                .iter()
                .zip(batch.iter())
                .map(|(&i, b)| (1.0 - decay) * (running[i] - b))
                .collect::<Vec<_>>()
        };
        let mean_delta = delta(&stats.mean, mean);
        let variance_delta = delta(&stats.variance, variance);
        scatter_sub(&mut stats.mean, indices, &mean_delta);
        scatter_sub(&mut stats.variance, indices, &variance_delta);
    }

    fn qualified(&self, variable: &str) -> String {
        format!("{}/{}", self.name, variable)
    }

    pub fn variables(&self) -> Vec<Variable> {
        let stats = self.stats.read();
        vec![
            Variable {
                name: self.qualified(OFFSET),
                trainable: true,
                value: self.offset(),
            },
            Variable {
                name: self.qualified(SCALE),
                trainable: true,
                value: self.scale(),
            },
            Variable {
                name: self.qualified(MOVING_MEAN),
                trainable: false,
                value: self.vector(&stats.mean),
            },
            Variable {
                name: self.qualified(MOVING_VARIANCE),
                trainable: false,
                value: self.vector(&stats.variance),
            },
        ]
    }

    /// Overwrites a variable by its short name, e.g. `"moving_mean"`.
    pub fn assign(&self, variable: &str, values: &[f32]) -> Result<(), NormError> {
        self.check_channels(values.len())?;
        match variable {
            SCALE => self.scale.write().copy_from_slice(values),
            OFFSET => self.offset.write().copy_from_slice(values),
            MOVING_MEAN => self.stats.write().mean.copy_from_slice(values),
            MOVING_VARIANCE => self.stats.write().variance.copy_from_slice(values),
            _ => return Err(NormError::UnknownVariable(self.qualified(variable))),
        }
        Ok(())
    }
}

/// Owner of every named [`NormScope`].
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct NormRegistry {
    scopes: Arc<RwLock<FxHashMap<String, ScopeHandle>>>,
}

impl NormRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scope called `name`, creating it on first use.
    ///
    /// A second registration with a different channel count is rejected.
    pub fn create_scope(&self, name: &str, channels: usize) -> Result<ScopeHandle, NormError> {
        if let Some(scope) = self.scopes.read().get(name) {
            scope.check_channels(channels)?;
            log::debug!("Reusing norm scope {}", name);
            return Ok(scope.clone());
        }

        let mut scopes = self.scopes.write();
        let scope = scopes
            .entry(name.to_string())
            .or_insert_with(|| {
                log::debug!("Creating norm scope {} with {} channels", name, channels);
                Arc::new(NormScope::new(name, channels))
            })
            .clone();
        scope.check_channels(channels)?;
        Ok(scope)
    }

    pub fn scope(&self, name: &str) -> Result<ScopeHandle, NormError> {
        self.scopes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| NormError::UninitializedScope(name.to_string()))
    }

    /// Training creates or reuses, inference only reuses.
    pub fn resolve(
        &self,
        name: &str,
        channels: usize,
        is_training: bool,
    ) -> Result<ScopeHandle, NormError> {
        if is_training {
            return self.create_scope(name, channels);
        }
        let scope = self.scope(name)?;
        scope.check_channels(channels)?;
        Ok(scope)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.scopes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scopes(&self) -> Vec<String> {
        let mut names = self.scopes.read().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn variables(&self) -> Vec<Variable> {
        self.scopes()
            .iter()
            .filter_map(|name| self.scope(name).ok())
            .flat_map(|scope| scope.variables())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_ema_forms_agree() {
        let decay = 0.9f32;
        let mut running = vec![0.0f32, 1.0, -3.0];
        let value = [2.0f32, 1.0, 5.0];
        let expected = running
            .iter()
            .zip(value.iter())
            .map(|(r, v)| decay * r + (1.0 - decay) * v)
            .collect::<Vec<_>>();
        assign_moving_average(&mut running, &value, decay);
        for (a, b) in running.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_create_scope_is_idempotent() {
        let registry = NormRegistry::new();
        let a = registry.create_scope("bn", 4).unwrap();
        a.update_moving_average(&[1.0; 4], &[2.0; 4], 0.5);
        let b = registry.create_scope("bn", 4).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.running_stats().mean, vec![0.5; 4]);
        assert_eq!(registry.len(), 1);

        let err = registry.create_scope("bn", 8).unwrap_err();
        assert!(matches!(err, NormError::ChannelMismatch { expected: 4, actual: 8, .. }));
    }

    #[test]
    fn test_inference_requires_existing_scope() {
        let registry = NormRegistry::new();
        let err = registry.resolve("missing", 3, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        registry.resolve("missing", 3, true).unwrap();
        registry.resolve("missing", 3, false).unwrap();
    }

    #[test]
    fn test_scatter_touches_only_indices() {
        let registry = NormRegistry::new();
        let scope = registry.create_scope("masked", 5).unwrap();
        scope.scatter_moving_average(&[1, 3], &[10.0, 20.0], &[3.0, 5.0], 0.9);
        let stats = scope.running_stats();
        assert_eq!(stats.mean[0], 0.0);
        assert_eq!(stats.mean[2], 0.0);
        assert_eq!(stats.mean[4], 0.0);
        assert!((stats.mean[1] - 1.0).abs() < 1e-6);
        assert!((stats.mean[3] - 2.0).abs() < 1e-6);
        assert!((stats.variance[1] - 1.2).abs() < 1e-6);
        assert!((stats.variance[3] - 1.4).abs() < 1e-6);
        assert_eq!(stats.variance[0], 1.0);
    }

    #[test]
    fn test_variables_and_assign() {
        let registry = NormRegistry::new();
        let scope = registry.create_scope("gn", 2).unwrap();
        scope.assign("scale", &[2.0, 3.0]).unwrap();
        scope.assign("moving_variance", &[4.0, 5.0]).unwrap();
        assert!(scope.assign("moving_mean", &[1.0]).is_err());
        assert!(matches!(
            scope.assign("gamma", &[1.0, 1.0]),
            Err(NormError::UnknownVariable(_))
        ));

        let vars = registry.variables();
        let names = vars.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["gn/offset", "gn/scale", "gn/moving_mean", "gn/moving_variance"]
        );
        assert!(vars[1].trainable);
        assert!(!vars[3].trainable);
        assert_eq!(vars[1].value.to_vec::<f32>().unwrap(), vec![2.0, 3.0]);
        assert_eq!(vars[3].value.to_vec::<f32>().unwrap(), vec![4.0, 5.0]);
    }
}
