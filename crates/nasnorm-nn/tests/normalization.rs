#![allow(non_snake_case)]
use nasnorm::{shape, NDArrayExt, Tensor};
use nasnorm_nn::{
    normalize, DataLayout, ErrorKind, NormConfig, NormError, NormRegistry, NormStrategy,
};
use rand::{rngs::StdRng, SeedableRng};
use test_strategy::{proptest, Arbitrary};

#[derive(Arbitrary, Debug, Copy, Clone)]
enum Layout {
    Last,
    First,
}

impl From<Layout> for DataLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Last => DataLayout::ChannelsLast,
            Layout::First => DataLayout::ChannelsFirst,
        }
    }
}

#[derive(Arbitrary, Debug)]
struct GroupProblem {
    layout: Layout,
    #[strategy(1..=3usize)]
    N: usize,
    #[strategy(1..=4usize)]
    G: usize,
    #[strategy(1..=4usize)]
    per_group: usize,
    #[strategy(2..=5usize)]
    H: usize,
    #[strategy(2..=5usize)]
    W: usize,
}

fn run_group_trial(prob: GroupProblem) -> anyhow::Result<()> {
    let GroupProblem {
        layout,
        N,
        G,
        per_group,
        H,
        W,
    } = prob;
    let C = G * per_group;
    let layout = DataLayout::from(layout);
    let nchw = Tensor::randn::<f32>(shape![N, C, H, W]).affine(4.0, -2.0)?;
    let x = match layout.from_channels_first() {
        Some(dims) => nchw.permute(&dims)?,
        None => nchw.clone(),
    };

    let registry = NormRegistry::new();
    let config = NormConfig {
        layout,
        num_groups: G,
        ..Default::default()
    };
    let y = normalize(&registry, &x, true, None, &config)?;
    let y = match layout.to_channels_first() {
        Some(dims) => y.permute(&dims)?,
        None => y,
    };

    let grouped = y.to_ndarray::<f32>()?.into_shape(vec![N, G, per_group, H, W])?;
    let (mean, var) = grouped
        .moments(&[2, 3, 4])
        .ok_or_else(|| anyhow::anyhow!("empty reduction"))?;
    anyhow::ensure!(mean.iter().all(|m| m.abs() < 1e-3), "group mean {:?}", mean);
    anyhow::ensure!(
        var.iter().all(|v| (v - 1.0).abs() < 1e-2),
        "group variance {:?}",
        var
    );
    Ok(())
}

#[proptest(cases = 32)]
fn test_group_norm_standardizes_groups(prob: GroupProblem) {
    let _ = env_logger::builder().is_test(true).try_init();
    run_group_trial(prob).unwrap();
}

#[derive(Arbitrary, Debug)]
struct IdentityProblem {
    layout: Layout,
    is_training: bool,
    #[strategy(1..=4usize)]
    N: usize,
    #[strategy(1..=8usize)]
    C: usize,
}

#[proptest(cases = 16)]
fn test_none_strategy_is_identity(prob: IdentityProblem) {
    let registry = NormRegistry::new();
    let x = Tensor::randn::<f32>(shape![prob.N, 3, 3, prob.C]);
    let config = NormConfig {
        strategy: NormStrategy::None,
        layout: prob.layout.into(),
        ..Default::default()
    };
    let y = normalize(&registry, &x, prob.is_training, None, &config).unwrap();
    assert_eq!(y.to_vec::<f32>().unwrap(), x.to_vec::<f32>().unwrap());
}

#[test]
fn batch_statistics_converge_to_distribution() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(42);
    let registry = NormRegistry::new();
    let config = NormConfig {
        strategy: NormStrategy::Batch,
        ..Default::default()
    };
    // channel c ~ N(c, (c + 1)^2)
    let scale = Tensor::from_data(vec![1.0f32, 2.0, 3.0], shape![1, 1, 1, 3]);
    let shift = Tensor::from_data(vec![0.0f32, 1.0, 2.0], shape![1, 1, 1, 3]);
    for _ in 0..100 {
        let x = Tensor::randn_with_rng::<f32, _>(shape![32, 4, 4, 3], &mut rng)
            .mul(&scale)?
            .add(&shift)?;
        normalize(&registry, &x, true, Some("bn"), &config)?;
    }

    let stats = registry.scope("bn")?.running_stats();
    for c in 0..3 {
        let expected_var = ((c + 1) * (c + 1)) as f32;
        assert!((stats.mean[c] - c as f32).abs() < 0.15, "{:?}", stats);
        assert!(
            (stats.variance[c] - expected_var).abs() < 0.1 * expected_var,
            "{:?}",
            stats
        );
    }

    // inference now standardizes with the running estimates
    let x = Tensor::randn_with_rng::<f32, _>(shape![64, 4, 4, 3], &mut rng)
        .mul(&scale)?
        .add(&shift)?;
    let y = normalize(&registry, &x, false, Some("bn"), &config)?;
    let (mean, _) = y
        .to_ndarray::<f32>()?
        .moments(&[0, 1, 2])
        .ok_or_else(|| anyhow::anyhow!("empty reduction"))?;
    assert!(mean.iter().all(|m| m.abs() < 0.15), "{:?}", mean);
    Ok(())
}

#[test]
fn inference_before_training_is_a_state_error() {
    let registry = NormRegistry::new();
    let x = Tensor::randn::<f32>(shape![2, 4, 4, 8]);
    for strategy in [NormStrategy::Batch, NormStrategy::Group] {
        let config = NormConfig {
            strategy,
            num_groups: 4,
            ..Default::default()
        };
        let err = normalize(&registry, &x, false, None, &config).unwrap_err();
        assert!(matches!(err, NormError::UninitializedScope(_)));
        assert_eq!(err.kind(), ErrorKind::State);
    }
    assert!(registry.is_empty());
}

#[test]
fn unknown_tokens_are_configuration_errors() {
    let err = DataLayout::parse("XYZW").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.to_string(), "Unknown data_format XYZW");

    let err = serde_json::from_str::<NormConfig>(r#"{"layout": "XYZW"}"#).unwrap_err();
    assert!(err.to_string().contains("XYZW"));
    let err = serde_json::from_str::<NormConfig>(r#"{"strategy": "instance"}"#).unwrap_err();
    assert!(err.to_string().contains("instance"));
}

#[test]
fn config_loads_from_json() -> anyhow::Result<()> {
    let config: NormConfig =
        serde_json::from_str(r#"{"layout": "NCHW", "strategy": "batch", "decay": 0.99}"#)?;
    assert_eq!(config.layout, DataLayout::ChannelsFirst);
    assert_eq!(config.strategy, NormStrategy::Batch);
    assert_eq!(config.decay, 0.99);
    assert_eq!(config.epsilon, 1e-5);
    assert_eq!(config.num_groups, 32);

    let json = serde_json::to_string(&NormConfig::default())?;
    assert!(json.contains(r#""layout":"NHWC""#));
    assert!(json.contains(r#""strategy":"group""#));
    Ok(())
}

#[test]
fn scopes_expose_checkpoint_variables() -> anyhow::Result<()> {
    let registry = NormRegistry::new();
    let config = NormConfig {
        strategy: NormStrategy::Batch,
        ..Default::default()
    };
    let x = Tensor::randn::<f32>(shape![4, 2, 2, 3]);
    normalize(&registry, &x, true, Some("cell/bn"), &config)?;

    let restored = NormRegistry::new();
    let scope = restored.create_scope("cell/bn", 3)?;
    for variable in registry.variables() {
        let short = variable
            .name
            .rsplit('/')
            .next()
            .ok_or_else(|| anyhow::anyhow!("unnamed variable"))?;
        scope.assign(short, &variable.value.to_vec::<f32>()?)?;
    }
    assert_eq!(
        registry.scope("cell/bn")?.running_stats(),
        scope.running_stats()
    );

    let a = normalize(&registry, &x, false, Some("cell/bn"), &config)?;
    let b = normalize(&restored, &x, false, Some("cell/bn"), &config)?;
    a.all_close(&b, 0.0, 0.0)?;
    Ok(())
}
