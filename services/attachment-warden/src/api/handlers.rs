use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{error, info};

use crate::moderator::ModerationOutcome;
use crate::quota::store::{run_blocking, run_write};
use crate::quota::{
    ChannelId, ChannelRule, GlobalDefault, MessageEvent, PolicySource, QuotaError, RuleSpec,
    SweepReport, UsageKey, UsageRecord, UsageStore, UserId,
};
use crate::storage::{StorageError, WardenDatabase};

use super::types::{
    BlockedChannelsResponse, ChannelQuery, ErrorResponse, GlobalDefaultResponse, SuccessResponse,
    ToggleResponse,
};
use super::ApiState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn handle_event(
    State(state): State<Arc<ApiState>>,
    Json(event): Json<MessageEvent>,
) -> ApiResult<ModerationOutcome> {
    let outcome = state.moderator.handle(&event).await;
    Ok(Json(outcome))
}

pub async fn list_rules(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ChannelQuery>,
) -> ApiResult<Vec<ChannelRule>> {
    let rules = read(&state, "list_rules", move |db| db.list_rules(query.channel_id)).await?;
    Ok(Json(rules))
}

pub async fn create_rule(
    State(state): State<Arc<ApiState>>,
    Json(spec): Json<RuleSpec>,
) -> ApiResult<ChannelRule> {
    let spec = validate_rule(spec)?;
    let rule = write(&state, "create_rule", move |db| db.create_rule(&spec)).await?;

    info!(
        rule_id = rule.id,
        channel_id = rule.channel_id,
        role_name = %rule.role_name,
        max_uploads = rule.max_uploads,
        order_index = rule.order_index,
        reset_frequency = %rule.reset_frequency,
        "channel rule created"
    );
    Ok(Json(rule))
}

pub async fn update_rule(
    State(state): State<Arc<ApiState>>,
    Path(rule_id): Path<i64>,
    Json(spec): Json<RuleSpec>,
) -> ApiResult<ChannelRule> {
    let spec = validate_rule(spec)?;
    let rule = write(&state, "update_rule", move |db| db.update_rule(rule_id, &spec)).await?;

    info!(rule_id, channel_id = rule.channel_id, "channel rule updated");
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<Arc<ApiState>>,
    Path(rule_id): Path<i64>,
) -> ApiResult<SuccessResponse> {
    write(&state, "delete_rule", move |db| db.delete_rule(rule_id)).await?;
    info!(rule_id, "channel rule deleted");
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn get_global_default(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<GlobalDefaultResponse> {
    let global_default = read(&state, "global_default", |db| db.global_default()).await?;
    Ok(Json(GlobalDefaultResponse { global_default }))
}

pub async fn set_global_default(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<GlobalDefault>,
) -> ApiResult<GlobalDefaultResponse> {
    let max_uploads = request.max_uploads;
    let global_default = write(&state, "set_global_default", move |db| {
        db.set_global_default(max_uploads)
    })
    .await?;

    info!(max_uploads, "global default updated");
    Ok(Json(GlobalDefaultResponse {
        global_default: Some(global_default),
    }))
}

pub async fn clear_global_default(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<SuccessResponse> {
    let removed = write(&state, "clear_global_default", |db| db.clear_global_default()).await?;
    if removed {
        info!("global default cleared");
    }
    Ok(Json(SuccessResponse { success: removed }))
}

pub async fn list_blocked_channels(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<BlockedChannelsResponse> {
    let channel_ids = read(&state, "list_blocked_channels", |db| db.list_blocked_channels()).await?;
    Ok(Json(BlockedChannelsResponse { channel_ids }))
}

pub async fn block_channel(
    State(state): State<Arc<ApiState>>,
    Path(channel_id): Path<ChannelId>,
) -> ApiResult<ToggleResponse> {
    let changed = write(&state, "block_channel", move |db| db.block_channel(channel_id)).await?;
    info!(channel_id, changed, "channel blocked");
    Ok(Json(ToggleResponse {
        channel_id,
        blocked: true,
        changed,
    }))
}

pub async fn unblock_channel(
    State(state): State<Arc<ApiState>>,
    Path(channel_id): Path<ChannelId>,
) -> ApiResult<ToggleResponse> {
    let changed = write(&state, "unblock_channel", move |db| db.unblock_channel(channel_id)).await?;
    info!(channel_id, changed, "channel unblocked");
    Ok(Json(ToggleResponse {
        channel_id,
        blocked: false,
        changed,
    }))
}

pub async fn list_usage(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ChannelQuery>,
) -> ApiResult<Vec<UsageRecord>> {
    let usage = read(&state, "list_usage", move |db| match query.channel_id {
        Some(channel_id) => db.list_channel_usage(channel_id),
        None => db.list_usage(),
    })
    .await?;
    Ok(Json(usage))
}

pub async fn reset_usage(
    State(state): State<Arc<ApiState>>,
    Path((user_id, channel_id)): Path<(UserId, ChannelId)>,
) -> ApiResult<UsageRecord> {
    let _guard = state.locks.lock(UsageKey::new(user_id, channel_id)).await;

    let mut record = read(&state, "get_usage", move |db| db.get_usage(user_id, channel_id))
        .await?
        .ok_or_else(|| not_found("usage_not_found", "no usage recorded for this user and channel"))?;

    record.usage_count = 0;
    record.last_reset = Utc::now();
    let committed = record.clone();
    write(&state, "commit_usage", move |db| db.commit_usage(&committed)).await?;

    info!(user_id, channel_id, "usage reset by administrator");
    Ok(Json(record))
}

pub async fn forget_usage(
    State(state): State<Arc<ApiState>>,
    Path((user_id, channel_id)): Path<(UserId, ChannelId)>,
) -> ApiResult<SuccessResponse> {
    let _guard = state.locks.lock(UsageKey::new(user_id, channel_id)).await;
    let removed = write(&state, "delete_usage", move |db| {
        db.delete_usage(user_id, channel_id)
    })
    .await?;
    if !removed {
        return Err(not_found(
            "usage_not_found",
            "no usage recorded for this user and channel",
        ));
    }

    info!(user_id, channel_id, "usage record removed");
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn run_sweep(State(state): State<Arc<ApiState>>) -> ApiResult<SweepReport> {
    let report = state.scheduler.sweep().await.map_err(quota_error)?;
    info!(
        examined = report.examined,
        reset = report.reset,
        failed = report.failed,
        "manual reset sweep finished"
    );
    Ok(Json(report))
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "attachment-warden"
    })))
}

fn validate_rule(mut spec: RuleSpec) -> Result<RuleSpec, ApiError> {
    spec.role_name = spec.role_name.trim().to_string();
    if spec.role_name.is_empty() {
        return Err(bad_request("invalid_role_name", "role_name cannot be empty"));
    }
    if spec.order_index < 0 {
        return Err(bad_request(
            "invalid_order_index",
            "order_index must not be negative",
        ));
    }
    Ok(spec)
}

/// Runs a database read on the blocking pool under the store timeout.
async fn read<T, F>(state: &ApiState, operation: &'static str, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&WardenDatabase) -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let database = Arc::clone(&state.database);
    run_blocking(state.store_timeout, operation, move || call(&database))
        .await
        .map_err(quota_error)
}

/// Like [`read`], but a write that has started is awaited to completion.
async fn write<T, F>(state: &ApiState, operation: &'static str, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&WardenDatabase) -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let database = Arc::clone(&state.database);
    run_write(state.store_timeout, operation, move || call(&database))
        .await
        .map_err(quota_error)
}

fn quota_error(err: QuotaError) -> ApiError {
    match err {
        QuotaError::StoreUnavailable { source, .. } => storage_error(source),
        QuotaError::StoreTimeout { operation, timeout } => {
            error!(operation, ?timeout, "warden store timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: format!("store did not answer within {timeout:?}"),
                    code: "store_timeout".to_string(),
                    details: Some(serde_json::json!({ "operation": operation })),
                }),
            )
        }
        other => internal_error(other),
    }
}

fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::Conflict(message) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: message,
                code: "conflict".to_string(),
                details: None,
            }),
        ),
        StorageError::NotFound(what) => not_found("not_found", &format!("{what} not found")),
        other => internal_error(other),
    }
}

fn bad_request(code: &str, message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn not_found(code: &str, message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    error!(error = %err, "warden API internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
            code: "internal_error".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
}
