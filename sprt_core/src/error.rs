use thiserror::Error;

pub type SprtResult<T> = Result<T, SprtError>;

/// Failure classes of the core: bad inputs are rejected at the call
/// boundary, numerical failures come out of the root finders.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SprtError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("numerical failure: {0}")]
    Numerical(String),
}
