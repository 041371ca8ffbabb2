use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::CONFIG;
use crate::database::DataStore;
use crate::handlers::data;
use crate::middleware::jwt_auth_middleware;
use crate::middleware::response::timestamp;
use crate::rls::{AuditSink, NoopAuditSink, RegistryHandle, RequestMediator, TracingAuditSink};

/// Shared per-process state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub mediator: RequestMediator,
}

impl AppState {
    /// Audit sink follows `security.enable_audit_logging`
    pub fn new(registry: Arc<RegistryHandle>, store: Arc<dyn DataStore>) -> Self {
        let audit: Arc<dyn AuditSink> = if CONFIG.security.enable_audit_logging {
            Arc::new(TracingAuditSink)
        } else {
            Arc::new(NoopAuditSink)
        };
        Self::with_audit(registry, store, audit)
    }

    pub fn with_audit(registry: Arc<RegistryHandle>, store: Arc<dyn DataStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            mediator: RequestMediator::new(registry, store, audit),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Protected API
        .merge(data_routes())
        // Global middleware
        .layer(cors_layer());

    with_request_logging(router, CONFIG.api.enable_request_logging).with_state(state)
}

/// Per-request spans follow `api.enable_request_logging`
fn with_request_logging(router: Router<AppState>, enabled: bool) -> Router<AppState> {
    if enabled {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn data_routes() -> Router<AppState> {
    Router::new()
        .route("/api/data/:resource", get(data::list).post(data::create))
        .route(
            "/api/data/:resource/:id",
            get(data::get).put(data::update).patch(data::update).delete(data::delete),
        )
        // route_layer: unmatched paths stay 404 instead of 401
        .route_layer(middleware::from_fn(jwt_auth_middleware))
}

fn cors_layer() -> CorsLayer {
    let security = &CONFIG.security;
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Field Ops API",
            "version": version,
            "description": "Field-service management API with row-level access policies",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "data": "/api/data/:resource[/:id] (protected)",
            },
            "resources": crate::rls::ResourceType::ALL.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.mediator.store();
    let registry = state.mediator.registry();
    let policies = registry.snapshot().len();
    let policy_source = registry.source().map(|p| p.display().to_string());

    match store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": timestamp(),
                    "store": store.backend(),
                    "policies": policies,
                    "policySource": policy_source,
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": true,
                    "message": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": timestamp(),
                        "store": store.backend(),
                    }
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::rls::PolicyRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let registry = Arc::new(RegistryHandle::new(PolicyRegistry::builtin().unwrap()));
        let store = Arc::new(MemoryStore::new());
        app(AppState::with_audit(registry, store, Arc::new(NoopAuditSink)))
    }

    async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_store_and_policies() {
        let (status, body) = call(test_app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["store"], "memory");
        assert!(body["data"]["policies"].as_u64().unwrap() > 0);
        assert_eq!(body["data"]["policySource"], Value::Null);
    }

    #[tokio::test]
    async fn request_logging_can_be_switched_off() {
        for enabled in [true, false] {
            let registry = Arc::new(RegistryHandle::new(PolicyRegistry::builtin().unwrap()));
            let state = AppState::with_audit(registry, Arc::new(MemoryStore::new()), Arc::new(NoopAuditSink));
            let router = Router::new().route("/health", get(health));
            let (status, _) = call(with_request_logging(router, enabled).with_state(state), "/health").await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn data_routes_require_a_token() {
        let (status, body) = call(test_app(), "/api/data/invoices").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn authenticated_list_against_empty_store() {
        let token = crate::auth::generate_token("1", "admin").unwrap();
        let res = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/data/contracts")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"], json!([]));
        assert_eq!(body["pagination"]["total"], 0);
    }
}
