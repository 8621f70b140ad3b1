//! `/deals` resource: decoding, engine calls, and error mapping.

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    routing::get,
};
use platform_api::{ApiError, ApiResult, Envelope};
use products_deals::{Deal, DealError, DealId, DealInput, ListLimit};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::http::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deals", get(list_deals).post(create_deal))
        .route(
            "/deals/{id}",
            get(get_deal)
                .put(replace_deal)
                .patch(patch_deal)
                .delete(delete_deal),
        )
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    limit: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeletedPayload {
    message: &'static str,
    id: DealId,
}

async fn list_deals(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Vec<Deal>> {
    let query = query.map(|Query(query)| query).unwrap_or_default();
    let limit = ListLimit::parse(query.limit.as_deref());
    let deals = state.deals.list(limit).await.map_err(deal_error)?;
    Ok(Envelope::ok(deals))
}

async fn get_deal(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult<Deal> {
    let id = parse_id(&raw_id)?;
    let deal = state.deals.get(id).await.map_err(deal_error)?;
    Ok(Envelope::ok(deal))
}

async fn create_deal(
    State(state): State<AppState>,
    payload: Result<Json<DealInput>, JsonRejection>,
) -> ApiResult<Deal> {
    let Json(input) = payload.map_err(invalid_json)?;
    let deal = state.deals.create(input).await.map_err(deal_error)?;
    Ok(Envelope::ok(deal))
}

async fn replace_deal(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<DealInput>, JsonRejection>,
) -> ApiResult<Deal> {
    let id = parse_id(&raw_id)?;
    let Json(candidate) = payload.map_err(invalid_json)?;
    let deal = state
        .deals
        .replace_full(id, candidate)
        .await
        .map_err(deal_error)?;
    Ok(Envelope::ok(deal))
}

async fn patch_deal(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<Deal> {
    let id = parse_id(&raw_id)?;
    let Json(fields) = payload.map_err(invalid_json)?;
    let deal = state
        .deals
        .patch_fields(id, &fields)
        .await
        .map_err(deal_error)?;
    Ok(Envelope::ok(deal))
}

async fn delete_deal(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<DeletedPayload> {
    let id = parse_id(&raw_id)?;
    state.deals.delete(id).await.map_err(deal_error)?;
    Ok(Envelope::ok(DeletedPayload {
        message: "deal deleted",
        id,
    }))
}

fn parse_id(raw: &str) -> Result<DealId, ApiError> {
    raw.parse::<DealId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("invalid id"))
}

fn invalid_json(rejection: JsonRejection) -> ApiError {
    debug!(%rejection, "rejected request body");
    ApiError::bad_request("invalid json")
}

fn deal_error(err: DealError) -> ApiError {
    let message = err.to_string();
    match err {
        DealError::NotFound => ApiError::NotFound(message),
        DealError::DuplicateRequest => ApiError::Conflict(message),
        DealError::InvalidReference
        | DealError::InvalidFieldType { .. }
        | DealError::ImmutableField(_)
        | DealError::Validation(_) => ApiError::BadRequest(message),
        DealError::Storage(detail) => ApiError::internal(anyhow!(detail)),
    }
}
