mod batchnorm;
mod config;
mod drop_path;
mod error;
mod groupnorm;
mod layout;
mod masked;
mod norm;
mod pool;
mod scope;

pub use batchnorm::*;
pub use config::*;
pub use drop_path::*;
pub use error::*;
pub use groupnorm::*;
pub use layout::*;
pub use masked::*;
pub use norm::*;
pub use pool::*;
pub use scope::*;

use nasnorm::Tensor;

pub trait Module {
    type Input;
    fn schedule(&self, input: Self::Input) -> anyhow::Result<Tensor>;
}
