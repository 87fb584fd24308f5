use nasnorm::{InvariantError, OperationError, Shape};

/// Broad families of [`NormError`]. None of them are retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed a configuration that can never work.
    Configuration,
    /// Tensor shapes or masks disagree with each other at call time.
    Shape,
    /// Persistent state was requested before it existed.
    State,
    /// Failure inside a tensor operation.
    Operation,
}

#[derive(Debug, thiserror::Error)]
pub enum NormError {
    #[error("Unknown data_format {0}")]
    UnknownLayout(String),
    #[error("Unknown norm_type {0}")]
    UnknownStrategy(String),
    #[error("Group count must be positive, got {0}")]
    InvalidGroupCount(usize),
    #[error("keep_prob must be in (0, 1], got {0}")]
    InvalidKeepProbability(f32),
    #[error("decay must be in [0, 1], got {0}")]
    InvalidDecay(f32),
    #[error("{channels} channels cannot be split into {groups} groups")]
    GroupMismatch { channels: usize, groups: usize },
    #[error("Mask has {actual} entries, expected {expected}")]
    MaskLength { expected: usize, actual: usize },
    #[error("Mask selects {selected} channels but the input has {actual}")]
    MaskedChannelMismatch { selected: usize, actual: usize },
    #[error("Scope {scope} holds {expected} channels, got {actual}")]
    ChannelMismatch {
        scope: String,
        expected: usize,
        actual: usize,
    },
    #[error("Expected a rank {expected} activation, got {actual:?}")]
    Rank { expected: usize, actual: Shape },
    #[error("Batch statistics need at least one element per channel, got {0:?}")]
    EmptyReduction(Shape),
    #[error("Variable {0} does not exist")]
    UnknownVariable(String),
    #[error("Scope {0} was never initialized in training mode")]
    UninitializedScope(String),
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl From<InvariantError> for NormError {
    fn from(e: InvariantError) -> Self {
        NormError::Operation(e.into())
    }
}

impl NormError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NormError::UnknownLayout(_)
            | NormError::UnknownStrategy(_)
            | NormError::InvalidGroupCount(_)
            | NormError::InvalidKeepProbability(_)
            | NormError::InvalidDecay(_) => ErrorKind::Configuration,
            NormError::GroupMismatch { .. }
            | NormError::MaskLength { .. }
            | NormError::MaskedChannelMismatch { .. }
            | NormError::ChannelMismatch { .. }
            | NormError::Rank { .. }
            | NormError::EmptyReduction(_)
            | NormError::UnknownVariable(_) => ErrorKind::Shape,
            NormError::UninitializedScope(_) => ErrorKind::State,
            NormError::Operation(_) => ErrorKind::Operation,
        }
    }
}
