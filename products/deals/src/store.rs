use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Deal, DealId, DealUpdate, ListLimit, NewDeal};

pub type StoreResult<T> = Result<T, StoreError>;

/// Which integrity rule of the `deals` table rejected a write.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    DuplicateRequestId,
    MissingExecutor,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no deal row for the given id")]
    NotFound,
    #[error("constraint violated: {0:?}")]
    Constraint(ConstraintKind),
    #[error("{0}")]
    Backend(String),
}

/// Storage gateway for deals. Each call is one auto-committed statement; no
/// business rules live behind this trait.
#[async_trait]
pub trait DealStore: Send + Sync {
    async fn fetch_by_id(&self, id: DealId) -> StoreResult<Deal>;

    /// Newest first, by descending `deal_id`.
    async fn fetch_recent(&self, limit: ListLimit) -> StoreResult<Vec<Deal>>;

    async fn insert(&self, deal: NewDeal) -> StoreResult<Deal>;

    async fn replace(&self, id: DealId, update: DealUpdate) -> StoreResult<Deal>;

    async fn remove(&self, id: DealId) -> StoreResult<()>;
}
