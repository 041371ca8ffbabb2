use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::config::CONFIG;
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::AuthUser;
use crate::rls::{FieldKind, RequestContext, ResourceType};
use crate::types::Operation;

/// `:resource` path segment; unknown names are a 404, not a 400
pub fn parse_resource(name: &str) -> Result<ResourceType, ApiError> {
    Ok(name.parse::<ResourceType>()?)
}

pub fn request_context(user: &AuthUser, resource: ResourceType, operation: Operation) -> RequestContext {
    RequestContext::new(user.user_id.clone(), user.role.clone(), resource, operation)
}

/// Unwrap a JSON body, keeping our error envelope for malformed input
pub fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| ApiError::invalid_json(rejection.body_text()))
}

/// List query parameters: paging and sorting, everything else is an
/// equality filter on a field of the resource
#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    pub page: i64,
    pub limit: i64,
    pub sort_by: Option<String>,
    pub descending: bool,
    pub filters: Map<String, Value>,
}

impl ListParams {
    pub fn parse(resource: ResourceType, raw: HashMap<String, String>) -> Result<Self, ApiError> {
        let mut params = ListParams {
            page: 1,
            limit: CONFIG.api.default_page_size as i64,
            sort_by: None,
            descending: false,
            filters: Map::new(),
        };
        let max_limit = CONFIG.filter.max_limit.unwrap_or(i32::MAX) as i64;

        for (key, value) in raw {
            match key.as_str() {
                "page" => {
                    params.page = value
                        .parse()
                        .ok()
                        .filter(|p: &i64| *p >= 1)
                        .ok_or_else(|| ApiError::bad_request("page must be a positive integer"))?;
                }
                "limit" => {
                    let limit: i64 = value
                        .parse()
                        .ok()
                        .filter(|l: &i64| *l >= 1)
                        .ok_or_else(|| ApiError::bad_request("limit must be a positive integer"))?;
                    params.limit = limit.min(max_limit);
                }
                "sortBy" => {
                    if !resource.has_field(&value) {
                        return Err(ApiError::bad_request(format!("Cannot sort by unknown field '{}'", value)));
                    }
                    params.sort_by = Some(value);
                }
                "sortOrder" => {
                    params.descending = match value.to_ascii_lowercase().as_str() {
                        "asc" => false,
                        "desc" => true,
                        _ => return Err(ApiError::bad_request("sortOrder must be 'asc' or 'desc'")),
                    };
                }
                field => {
                    if !resource.has_field(field) {
                        let mut field_errors = HashMap::new();
                        field_errors.insert(field.to_string(), format!("Not a field of {}", resource));
                        return Err(ApiError::validation_error("Unknown filter field", Some(field_errors)));
                    }
                    let typed = coerce_query_value(resource, field, &value)?;
                    params.filters.insert(field.to_string(), typed);
                }
            }
        }

        Ok(params)
    }

    /// Saturates instead of overflowing for huge page numbers
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn to_filter_data(&self) -> FilterData {
        FilterData {
            where_clause: if self.filters.is_empty() {
                None
            } else {
                Some(Value::Object(self.filters.clone()))
            },
            order: self
                .sort_by
                .as_ref()
                .map(|field| json!(format!("{} {}", field, if self.descending { "desc" } else { "asc" }))),
            limit: Some(self.limit.min(i32::MAX as i64) as i32),
            offset: Some(self.offset().min(i32::MAX as i64) as i32),
            ..Default::default()
        }
    }
}

/// Query strings are untyped; read numbers and booleans for the fields
/// declared as such so comparisons against stored values line up
pub fn coerce_query_value(resource: ResourceType, field: &str, raw: &str) -> Result<Value, ApiError> {
    match resource.field_kind(field) {
        FieldKind::Text => Ok(Value::String(raw.to_string())),
        FieldKind::Number => {
            if let Ok(i) = raw.parse::<i64>() {
                return Ok(json!(i));
            }
            raw.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| ApiError::bad_request(format!("{} expects a number", field)))
        }
        FieldKind::Boolean => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ApiError::bad_request(format!("{} expects true or false", field))),
        },
    }
}
