//! `/api/sync/*` routes: pull, push, and manual conflict resolution,
//! with bearer auth and per-user rate limiting in front of each handler.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::DateTime;
use serde::Deserialize;
use sync_core::{constants, DeviceId, EntityId};
use sync_server::dto::{PullResponse, PushRequest, PushResponse, ResolveConflictRequest};
use sync_server::{pull, push, RateLimitedOp, ServerError};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sync/pull/", get(pull_handler))
        .route("/api/sync/push/", post(push_handler))
        .route("/api/sync/conflicts/:id/resolve/", post(resolve_handler))
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError(ServerError::Unauthorized("missing bearer token".into())))
}

fn device_id(headers: &HeaderMap) -> ApiResult<DeviceId> {
    headers
        .get("x-device-id")
        .and_then(|v| v.to_str().ok())
        .map(DeviceId::new)
        .ok_or_else(|| ApiError(ServerError::InvalidRequest("missing x-device-id header".into())))
}

#[derive(Debug, Deserialize)]
pub struct PullQuery {
    since: i64,
    limit: Option<i64>,
}

async fn pull_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PullQuery>,
) -> ApiResult<Json<PullResponse>> {
    let token = bearer_token(&headers)?;
    let ctx = state.token_validator.validate(token).await?;
    let caller_device = device_id(&headers)?;

    state
        .rate_limiter
        .check(&ctx.user_id, RateLimitedOp::Pull)
        .map_err(|retry_after_secs| ApiError(ServerError::RateLimited { retry_after_secs }))?;

    let limit = query
        .limit
        .unwrap_or(constants::PULL_DEFAULT_LIMIT)
        .clamp(1, constants::PULL_MAX_LIMIT);
    let since = DateTime::from_timestamp_millis(query.since)
        .ok_or_else(|| ApiError(ServerError::InvalidRequest("since is not a valid millisecond timestamp".into())))?;

    let response = pull::pull_delta(
        &state.entity_store,
        &state.device_registry,
        &state.sync_log,
        &state.org_clock_cache,
        &ctx.org_id,
        &ctx.user_id,
        &caller_device,
        since,
        limit,
    )
    .await?;
    Ok(Json(response))
}

async fn push_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PushRequest>,
) -> ApiResult<Json<PushResponse>> {
    let token = bearer_token(&headers)?;
    let ctx = state.token_validator.validate(token).await?;
    let caller_device = device_id(&headers)?;

    state
        .rate_limiter
        .check(&ctx.user_id, RateLimitedOp::Push)
        .map_err(|retry_after_secs| ApiError(ServerError::RateLimited { retry_after_secs }))?;

    let response = push::push_batch(
        &state.entity_store,
        &state.conflict_store,
        &state.device_registry,
        &state.sync_log,
        &state.org_clock_cache,
        &ctx,
        &caller_device,
        request,
    )
    .await?;
    Ok(Json(response))
}

async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conflict_id): Path<EntityId>,
    Json(request): Json<ResolveConflictRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let token = bearer_token(&headers)?;
    let ctx = state.token_validator.validate(token).await?;

    state
        .rate_limiter
        .check(&ctx.user_id, RateLimitedOp::ConflictResolve)
        .map_err(|retry_after_secs| ApiError(ServerError::RateLimited { retry_after_secs }))?;

    sync_server::conflict_resolve::resolve_conflict(
        &state.entity_store,
        &state.conflict_store,
        conflict_id,
        &ctx.user_id,
        request,
    )
    .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
