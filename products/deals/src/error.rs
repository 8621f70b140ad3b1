use thiserror::Error;

pub type DealResult<T> = Result<T, DealError>;

/// Every way a deal operation can fail. Callers are expected to match exhaustively.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DealError {
    #[error("deal not found")]
    NotFound,
    #[error("request_id already exists")]
    DuplicateRequest,
    #[error("executor_id does not exist")]
    InvalidReference,
    #[error("{field} must be {expected}")]
    InvalidFieldType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("{0} cannot be set manually")]
    ImmutableField(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(String),
}
