use crate::InvariantError;

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    InvariantError(#[from] InvariantError),
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}
