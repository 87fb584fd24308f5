use nasnorm::Tensor;
use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, IntoStaticStr};

use crate::{batch_norm, group_norm, NormConfig, NormError, NormRegistry};

/// Which normalization [`normalize`] performs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    EnumString,
    IntoStaticStr,
    strum_macros::Display,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "&'static str")]
#[strum(serialize_all = "lowercase")]
pub enum NormStrategy {
    None,
    Batch,
    #[default]
    Group,
}

impl NormStrategy {
    pub fn parse(token: &str) -> Result<Self, NormError> {
        token
            .parse()
            .map_err(|_| NormError::UnknownStrategy(token.to_string()))
    }
}

impl TryFrom<String> for NormStrategy {
    type Error = NormError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        NormStrategy::parse(&token)
    }
}

/// Normalizes `x` with the strategy named in `config`.
///
/// Scopes default to `"<strategy>_norm"`. `none` returns `x` untouched and
/// never touches the registry.
pub fn normalize(
    registry: &NormRegistry,
    x: &Tensor,
    is_training: bool,
    name: Option<&str>,
    config: &NormConfig,
) -> Result<Tensor, NormError> {
    config.validate()?;
    let default_name = format!("{}_norm", config.strategy);
    let name = name.unwrap_or(&default_name);
    log::trace!(
        "normalize {} ({}, training={}) input {:?}",
        name,
        config.strategy,
        is_training,
        x.shape()
    );

    match config.strategy {
        NormStrategy::None => Ok(x.clone()),
        NormStrategy::Batch => batch_norm(registry, x, is_training, Some(name), &config.batch()),
        NormStrategy::Group => group_norm(registry, x, is_training, Some(name), &config.group()),
    }
}
