use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    Json,
};
use serde_json::Value;

use super::utils::{json_body, parse_resource, request_context, ListParams};
use crate::database::Record;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Pagination};
use crate::server::AppState;
use crate::types::Operation;

/// GET /api/data/:resource - list records visible to the requester
pub async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Extension(user): Extension<AuthUser>,
    Query(raw): Query<HashMap<String, String>>,
) -> ApiResult<Value> {
    let resource = parse_resource(&resource)?;
    let params = ListParams::parse(resource, raw)?;
    let ctx = request_context(&user, resource, Operation::List);

    let outcome = state.mediator.list(&ctx, params.to_filter_data()).await?;

    let count = outcome.data.len();
    let data = Record::to_api_output_array(outcome.data);
    Ok(ApiResponse::success(data)
        .with_rls(outcome.rls_applied)
        .with_pagination(count, Pagination::new(params.page, params.limit, outcome.total))
        .with_applied_filters(params.filters))
}

/// POST /api/data/:resource - create one record
pub async fn create(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let resource = parse_resource(&resource)?;
    let payload = Record::from_api_input(resource, json_body(body)?)?;
    let ctx = request_context(&user, resource, Operation::Create);

    let outcome = state.mediator.create(ctx, payload).await?;

    Ok(ApiResponse::created(outcome.data.into_value())
        .with_message(format!("{} created successfully", resource.singular())))
}
