use async_trait::async_trait;
use chrono::Utc;
use entity::deals;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set, Unchanged},
    DatabaseConnection, DbErr, EntityTrait, QueryOrder, QuerySelect, SqlErr,
};
use tracing::debug;

use crate::model::{Deal, DealId, DealUpdate, ListLimit, NewDeal};
use crate::store::{ConstraintKind, DealStore, StoreError, StoreResult};

/// [`DealStore`] backed by the `deals` table through SeaORM.
#[derive(Clone)]
pub struct SeaOrmDealStore {
    db: DatabaseConnection,
}

impl SeaOrmDealStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl From<deals::Model> for Deal {
    fn from(model: deals::Model) -> Self {
        Self {
            deal_id: model.deal_id,
            request_id: model.request_id,
            executor_id: model.executor_id,
            agreed_price: model.agreed_price,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
            closed_at: model.closed_at.map(|at| at.with_timezone(&Utc)),
        }
    }
}

/// Map driver errors onto the gateway taxonomy. The only unique index besides
/// the primary key is `request_id`, and the only foreign key is `executor_id`.
fn classify(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            debug!(%detail, "unique constraint rejected deal write");
            StoreError::Constraint(ConstraintKind::DuplicateRequestId)
        }
        Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
            debug!(%detail, "foreign key rejected deal write");
            StoreError::Constraint(ConstraintKind::MissingExecutor)
        }
        _ => match err {
            DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        },
    }
}

#[async_trait]
impl DealStore for SeaOrmDealStore {
    async fn fetch_by_id(&self, id: DealId) -> StoreResult<Deal> {
        deals::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(classify)?
            .map(Deal::from)
            .ok_or(StoreError::NotFound)
    }

    async fn fetch_recent(&self, limit: ListLimit) -> StoreResult<Vec<Deal>> {
        let rows = deals::Entity::find()
            .order_by_desc(deals::Column::DealId)
            .limit(limit.get())
            .all(&self.db)
            .await
            .map_err(classify)?;
        Ok(rows.into_iter().map(Deal::from).collect())
    }

    async fn insert(&self, deal: NewDeal) -> StoreResult<Deal> {
        let model = deals::ActiveModel {
            deal_id: NotSet,
            request_id: Set(deal.request_id),
            executor_id: Set(deal.executor_id),
            agreed_price: Set(deal.agreed_price),
            status: Set(deal.status),
            created_at: Set(Utc::now().into()),
            closed_at: Set(None),
        };
        model.insert(&self.db).await.map(Deal::from).map_err(classify)
    }

    async fn replace(&self, id: DealId, update: DealUpdate) -> StoreResult<Deal> {
        let model = deals::ActiveModel {
            deal_id: Unchanged(id),
            request_id: Set(update.request_id),
            executor_id: Set(update.executor_id),
            agreed_price: Set(update.agreed_price),
            status: Set(update.status),
            created_at: NotSet,
            closed_at: Set(update.closed_at.map(Into::into)),
        };
        model.update(&self.db).await.map(Deal::from).map_err(classify)
    }

    async fn remove(&self, id: DealId) -> StoreResult<()> {
        let result = deals::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(classify)?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
