use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::error::{DealError, DealResult};
use crate::model::{
    Deal, DealId, DealInput, DealUpdate, ListLimit, NewDeal, STATUS_ACTIVE, STATUS_DONE,
};
use crate::patch::DealPatch;
use crate::store::{ConstraintKind, DealStore, StoreError};

/// Derive `closed_at` for a deal moving to `new_status`.
///
/// | current    | new status | result    |
/// |------------|------------|-----------|
/// | `None`     | `done`     | `now`     |
/// | `Some(t)`  | `done`     | `Some(t)` |
/// | any        | other      | `None`    |
pub fn resolve_closed_at(
    current: Option<DateTime<Utc>>,
    new_status: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if new_status == STATUS_DONE {
        Some(current.unwrap_or(now))
    } else {
        None
    }
}

/// Deal lifecycle engine. Holds no state of its own besides the injected store.
#[derive(Clone)]
pub struct DealService {
    store: Arc<dyn DealStore>,
}

impl DealService {
    pub fn new(store: Arc<dyn DealStore>) -> Self {
        Self { store }
    }

    #[instrument(
        name = "deals.create",
        skip_all,
        fields(request_id = input.request_id, executor_id = input.executor_id)
    )]
    pub async fn create(&self, input: DealInput) -> DealResult<Deal> {
        if input.request_id <= 0 || input.executor_id <= 0 {
            return Err(DealError::Validation(
                "request_id and executor_id must be > 0".into(),
            ));
        }
        let status = if input.status.is_empty() {
            STATUS_ACTIVE.to_string()
        } else {
            input.status
        };
        let deal = self
            .store
            .insert(NewDeal {
                request_id: input.request_id,
                executor_id: input.executor_id,
                agreed_price: input.agreed_price,
                status,
            })
            .await
            .map_err(deal_error)?;
        info!(deal_id = deal.deal_id, status = %deal.status, "deal created");
        Ok(deal)
    }

    #[instrument(name = "deals.get", skip(self))]
    pub async fn get(&self, id: DealId) -> DealResult<Deal> {
        self.store.fetch_by_id(id).await.map_err(deal_error)
    }

    #[instrument(name = "deals.list", skip(self))]
    pub async fn list(&self, limit: ListLimit) -> DealResult<Vec<Deal>> {
        self.store.fetch_recent(limit).await.map_err(deal_error)
    }

    /// Replace every client-controlled field of a deal, deriving `closed_at`
    /// from the stored value and the candidate status.
    #[instrument(name = "deals.replace", skip(self, candidate), fields(status = %candidate.status))]
    pub async fn replace_full(&self, id: DealId, candidate: DealInput) -> DealResult<Deal> {
        let current = self.store.fetch_by_id(id).await.map_err(deal_error)?;
        self.persist(&current, candidate).await
    }

    #[instrument(name = "deals.patch", skip(self, patch))]
    pub async fn patch(&self, id: DealId, patch: DealPatch) -> DealResult<Deal> {
        let current = self.store.fetch_by_id(id).await.map_err(deal_error)?;
        self.overlay(&current, patch).await
    }

    /// Patch from an undecoded JSON object. The deal is loaded before any
    /// field is type-checked, so an absent id is `NotFound` whatever was sent.
    #[instrument(name = "deals.patch", skip(self, fields))]
    pub async fn patch_fields(&self, id: DealId, fields: &Map<String, Value>) -> DealResult<Deal> {
        let current = self.store.fetch_by_id(id).await.map_err(deal_error)?;
        let patch = DealPatch::from_json(fields)?;
        self.overlay(&current, patch).await
    }

    async fn overlay(&self, current: &Deal, patch: DealPatch) -> DealResult<Deal> {
        if patch.closed_at_present {
            return Err(DealError::ImmutableField("closed_at"));
        }
        let candidate = patch.apply(current.to_input());
        self.persist(current, candidate).await
    }

    #[instrument(name = "deals.delete", skip(self))]
    pub async fn delete(&self, id: DealId) -> DealResult<()> {
        self.store.remove(id).await.map_err(deal_error)?;
        info!(deal_id = id, "deal deleted");
        Ok(())
    }

    // Read and write are separate statements: an update landing between the
    // caller's fetch and this write is overwritten, and its closed_at with it.
    async fn persist(&self, current: &Deal, candidate: DealInput) -> DealResult<Deal> {
        let closed_at = resolve_closed_at(current.closed_at, &candidate.status, Utc::now());
        if current.closed_at.is_none() && closed_at.is_some() {
            info!(deal_id = current.deal_id, "deal closed");
        } else if current.closed_at.is_some() && closed_at.is_none() {
            info!(deal_id = current.deal_id, status = %candidate.status, "deal reopened");
        }
        let update = DealUpdate {
            request_id: candidate.request_id,
            executor_id: candidate.executor_id,
            agreed_price: candidate.agreed_price,
            status: candidate.status,
            closed_at,
        };
        self.store
            .replace(current.deal_id, update)
            .await
            .map_err(deal_error)
    }
}

fn deal_error(err: StoreError) -> DealError {
    match err {
        StoreError::NotFound => DealError::NotFound,
        StoreError::Constraint(ConstraintKind::DuplicateRequestId) => {
            warn!("request_id already has a deal");
            DealError::DuplicateRequest
        }
        StoreError::Constraint(ConstraintKind::MissingExecutor) => {
            warn!("executor_id does not reference an executor");
            DealError::InvalidReference
        }
        StoreError::Backend(detail) => {
            error!(%detail, "deal storage failed");
            DealError::Storage(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::store::StoreResult;

    #[derive(Default)]
    struct Tables {
        deals: BTreeMap<DealId, Deal>,
        next_id: DealId,
    }

    /// In-memory stand-in for the `deals` table with its unique and foreign key rules.
    struct MemoryStore {
        executors: BTreeSet<i32>,
        tables: Mutex<Tables>,
        broken: bool,
    }

    impl MemoryStore {
        fn with_executors(ids: &[i32]) -> Self {
            Self {
                executors: ids.iter().copied().collect(),
                tables: Mutex::new(Tables::default()),
                broken: false,
            }
        }

        fn broken() -> Self {
            Self {
                broken: true,
                ..Self::with_executors(&[])
            }
        }

        fn check(&self, id: Option<DealId>, request_id: i32, executor_id: i32) -> StoreResult<()> {
            if self.broken {
                return Err(StoreError::Backend("connection refused".into()));
            }
            let tables = self.tables.lock().unwrap();
            let taken = tables
                .deals
                .values()
                .any(|deal| deal.request_id == request_id && Some(deal.deal_id) != id);
            if taken {
                return Err(StoreError::Constraint(ConstraintKind::DuplicateRequestId));
            }
            if !self.executors.contains(&executor_id) {
                return Err(StoreError::Constraint(ConstraintKind::MissingExecutor));
            }
            Ok(())
        }

        fn stored(&self, id: DealId) -> Option<Deal> {
            self.tables.lock().unwrap().deals.get(&id).cloned()
        }
    }

    #[async_trait]
    impl DealStore for MemoryStore {
        async fn fetch_by_id(&self, id: DealId) -> StoreResult<Deal> {
            if self.broken {
                return Err(StoreError::Backend("connection refused".into()));
            }
            self.stored(id).ok_or(StoreError::NotFound)
        }

        async fn fetch_recent(&self, limit: ListLimit) -> StoreResult<Vec<Deal>> {
            let tables = self.tables.lock().unwrap();
            Ok(tables
                .deals
                .values()
                .rev()
                .take(limit.get() as usize)
                .cloned()
                .collect())
        }

        async fn insert(&self, deal: NewDeal) -> StoreResult<Deal> {
            self.check(None, deal.request_id, deal.executor_id)?;
            let mut tables = self.tables.lock().unwrap();
            tables.next_id += 1;
            let row = Deal {
                deal_id: tables.next_id,
                request_id: deal.request_id,
                executor_id: deal.executor_id,
                agreed_price: deal.agreed_price,
                status: deal.status,
                created_at: Utc::now(),
                closed_at: None,
            };
            tables.deals.insert(row.deal_id, row.clone());
            Ok(row)
        }

        async fn replace(&self, id: DealId, update: DealUpdate) -> StoreResult<Deal> {
            self.check(Some(id), update.request_id, update.executor_id)?;
            let mut tables = self.tables.lock().unwrap();
            let row = tables.deals.get_mut(&id).ok_or(StoreError::NotFound)?;
            row.request_id = update.request_id;
            row.executor_id = update.executor_id;
            row.agreed_price = update.agreed_price;
            row.status = update.status;
            row.closed_at = update.closed_at;
            Ok(row.clone())
        }

        async fn remove(&self, id: DealId) -> StoreResult<()> {
            let mut tables = self.tables.lock().unwrap();
            tables.deals.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
        }
    }

    fn setup() -> (Arc<MemoryStore>, DealService) {
        let store = Arc::new(MemoryStore::with_executors(&[9, 10]));
        let service = DealService::new(store.clone());
        (store, service)
    }

    fn input(request_id: i32, executor_id: i32, status: &str) -> DealInput {
        DealInput {
            request_id,
            executor_id,
            agreed_price: 100.0,
            status: status.into(),
        }
    }

    #[test]
    fn closed_at_rule_table() {
        let now = Utc::now();
        let earlier = now - Duration::days(2);
        assert_eq!(resolve_closed_at(None, "done", now), Some(now));
        assert_eq!(resolve_closed_at(Some(earlier), "done", now), Some(earlier));
        assert_eq!(resolve_closed_at(Some(earlier), "cancelled", now), None);
        assert_eq!(resolve_closed_at(None, "active", now), None);
        assert_eq!(resolve_closed_at(Some(earlier), "DONE", now), None);
    }

    #[tokio::test]
    async fn create_defaults_empty_status_to_active() {
        let (_, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();
        assert_eq!(deal.status, "active");
        assert_eq!(deal.closed_at, None);

        let deal = service.create(input(6, 9, "negotiating")).await.unwrap();
        assert_eq!(deal.status, "negotiating");
    }

    #[tokio::test]
    async fn create_rejects_non_positive_ids_before_storage() {
        let (store, service) = setup();
        for bad in [input(0, 9, ""), input(5, -1, "")] {
            let err = service.create(bad).await.unwrap_err();
            assert_eq!(
                err,
                DealError::Validation("request_id and executor_id must be > 0".into())
            );
        }
        assert!(store.tables.lock().unwrap().deals.is_empty());
    }

    #[tokio::test]
    async fn create_classifies_constraint_violations() {
        let (_, service) = setup();
        service.create(input(5, 9, "")).await.unwrap();
        let err = service.create(input(5, 10, "")).await.unwrap_err();
        assert_eq!(err, DealError::DuplicateRequest);

        let err = service.create(input(6, 404, "")).await.unwrap_err();
        assert_eq!(err, DealError::InvalidReference);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found_everywhere() {
        let (_, service) = setup();
        assert_eq!(service.get(77).await.unwrap_err(), DealError::NotFound);
        assert_eq!(
            service.replace_full(77, input(5, 9, "done")).await.unwrap_err(),
            DealError::NotFound
        );
        assert_eq!(
            service.patch(77, DealPatch::default()).await.unwrap_err(),
            DealError::NotFound
        );
        assert_eq!(service.delete(77).await.unwrap_err(), DealError::NotFound);
    }

    #[tokio::test]
    async fn replace_to_done_stamps_processing_time() {
        let (_, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();

        let before = Utc::now();
        let closed = service
            .replace_full(deal.deal_id, input(5, 9, "done"))
            .await
            .unwrap();
        let after = Utc::now();

        let closed_at = closed.closed_at.expect("closed_at stamped");
        assert!(closed_at >= before && closed_at <= after);
        assert_eq!(closed.created_at, deal.created_at);
    }

    #[tokio::test]
    async fn repeated_done_keeps_first_closed_at() {
        let (_, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();
        let first = service
            .replace_full(deal.deal_id, input(5, 9, "done"))
            .await
            .unwrap();
        let second = service
            .replace_full(deal.deal_id, input(5, 9, "done"))
            .await
            .unwrap();
        assert!(first.closed_at.is_some());
        assert_eq!(first.closed_at, second.closed_at);

        let status_only = DealPatch {
            status: Some("done".into()),
            ..DealPatch::default()
        };
        let third = service.patch(deal.deal_id, status_only).await.unwrap();
        assert_eq!(third.closed_at, first.closed_at);
    }

    #[tokio::test]
    async fn leaving_done_clears_closed_at() {
        let (_, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();
        service
            .replace_full(deal.deal_id, input(5, 9, "done"))
            .await
            .unwrap();
        let patch = DealPatch {
            status: Some("cancelled".into()),
            ..DealPatch::default()
        };
        let reopened = service.patch(deal.deal_id, patch).await.unwrap();
        assert_eq!(reopened.status, "cancelled");
        assert_eq!(reopened.closed_at, None);
        assert_eq!(reopened.agreed_price, 100.0);
    }

    #[tokio::test]
    async fn patch_flagging_closed_at_leaves_row_untouched() {
        let (store, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();
        let patch = DealPatch {
            status: Some("done".into()),
            closed_at_present: true,
            ..DealPatch::default()
        };
        let err = service.patch(deal.deal_id, patch).await.unwrap_err();
        assert_eq!(err, DealError::ImmutableField("closed_at"));
        assert_eq!(store.stored(deal.deal_id), Some(deal));
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn raw_patch_to_missing_deal_is_not_found_before_type_checks() {
        let (_, service) = setup();
        for payload in [
            json!({"status": 123}),
            json!({"closed_at": 1}),
            json!({"request_id": "x"}),
        ] {
            let err = service.patch_fields(77, &fields(payload)).await.unwrap_err();
            assert_eq!(err, DealError::NotFound);
        }
    }

    #[tokio::test]
    async fn raw_patch_rejections_leave_row_untouched() {
        let (store, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();

        let err = service
            .patch_fields(deal.deal_id, &fields(json!({"status": 123})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "status must be a string");

        let sneaky = fields(json!({"status": "done", "closed_at": "2020-01-01T00:00:00Z"}));
        let err = service.patch_fields(deal.deal_id, &sneaky).await.unwrap_err();
        assert_eq!(err, DealError::ImmutableField("closed_at"));

        assert_eq!(store.stored(deal.deal_id), Some(deal));
    }

    #[tokio::test]
    async fn raw_patch_truncates_fractional_ids() {
        let (_, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();
        let patched = service
            .patch_fields(deal.deal_id, &fields(json!({"executor_id": 10.7})))
            .await
            .unwrap();
        assert_eq!(patched.executor_id, 10);
    }

    #[tokio::test]
    async fn patch_overlays_onto_stored_deal() {
        let (_, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();
        let patch = DealPatch {
            executor_id: Some(10),
            agreed_price: Some(42.5),
            ..DealPatch::default()
        };
        let patched = service.patch(deal.deal_id, patch).await.unwrap();
        assert_eq!(patched.request_id, 5);
        assert_eq!(patched.executor_id, 10);
        assert_eq!(patched.agreed_price, 42.5);
        assert_eq!(patched.status, "active");
    }

    #[tokio::test]
    async fn patch_into_foreign_request_id_is_duplicate() {
        let (_, service) = setup();
        service.create(input(5, 9, "")).await.unwrap();
        let other = service.create(input(6, 9, "")).await.unwrap();
        let patch = DealPatch {
            request_id: Some(5),
            ..DealPatch::default()
        };
        let err = service.patch(other.deal_id, patch).await.unwrap_err();
        assert_eq!(err, DealError::DuplicateRequest);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_bounded() {
        let (_, service) = setup();
        for request_id in 1..=3 {
            service.create(input(request_id, 9, "")).await.unwrap();
        }
        let two = service.list(ListLimit::from_requested(Some(2))).await.unwrap();
        let ids: Vec<_> = two.iter().map(|deal| deal.deal_id).collect();
        assert_eq!(ids, vec![3, 2]);

        assert_eq!(service.list(ListLimit::from_requested(Some(0))).await.unwrap().len(), 3);
        assert_eq!(service.list(ListLimit::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let (store, service) = setup();
        let deal = service.create(input(5, 9, "")).await.unwrap();
        service.delete(deal.deal_id).await.unwrap();
        assert!(store.stored(deal.deal_id).is_none());
        assert_eq!(
            service.delete(deal.deal_id).await.unwrap_err(),
            DealError::NotFound
        );
    }

    #[tokio::test]
    async fn backend_failures_surface_as_storage() {
        let service = DealService::new(Arc::new(MemoryStore::broken()));
        let err = service.get(1).await.unwrap_err();
        assert_eq!(err, DealError::Storage("connection refused".into()));
        let err = service.create(input(5, 9, "")).await.unwrap_err();
        assert!(matches!(err, DealError::Storage(_)));
    }
}
