//! Deal lifecycle.
//!
//! A deal binds a request to an executor. [`DealService`] owns the only real
//! rule in here: `closed_at` is derived from `status` and is stamped the first
//! time a deal reaches [`STATUS_DONE`]. Persistence goes through the
//! [`DealStore`] gateway, which is injected so tests can swap the database out.

mod error;
mod model;
mod patch;
mod sea_orm_store;
mod service;
mod store;

pub use error::{DealError, DealResult};
pub use model::{
    Deal, DealId, DealInput, DealUpdate, ListLimit, NewDeal, STATUS_ACTIVE, STATUS_DONE,
};
pub use patch::DealPatch;
pub use sea_orm_store::SeaOrmDealStore;
pub use service::{DealService, resolve_closed_at};
pub use store::{ConstraintKind, DealStore, StoreError, StoreResult};
