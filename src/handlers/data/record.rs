use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};
use serde_json::Value;

use super::utils::{json_body, parse_resource, request_context};
use crate::database::Record;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::server::AppState;
use crate::types::Operation;

/// GET /api/data/:resource/:id
pub async fn get(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Value> {
    let resource = parse_resource(&resource)?;
    let ctx = request_context(&user, resource, Operation::Get);

    let outcome = state.mediator.get(ctx, &id).await?;

    Ok(ApiResponse::success(outcome.data.into_value()).with_rls(outcome.rls_applied))
}

/// PUT/PATCH /api/data/:resource/:id - both merge the supplied fields
pub async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let resource = parse_resource(&resource)?;
    let changes = Record::from_api_input(resource, json_body(body)?)?;
    if changes.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    let ctx = request_context(&user, resource, Operation::Update);

    let outcome = state.mediator.update(ctx, &id, changes).await?;

    Ok(ApiResponse::success(outcome.data.into_value())
        .with_message(format!("{} updated successfully", resource.singular())))
}

/// DELETE /api/data/:resource/:id
pub async fn delete(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Value> {
    let resource = parse_resource(&resource)?;
    let ctx = request_context(&user, resource, Operation::Delete);

    let outcome = state.mediator.delete(ctx, &id).await?;

    Ok(ApiResponse::success(outcome.data.into_value())
        .with_message(format!("{} deleted successfully", resource.singular())))
}
