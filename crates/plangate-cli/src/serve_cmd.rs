use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use plangate_core::gateway::{ErrorKind, GatewayError, Operation, PlanGateway};
use plangate_core::identity::verifier::{HmacVerifier, IdentityVerifier, identify};
use plangate_store::DocumentStore;
use plangate_store::memory::MemoryStore;
use plangate_store::models::StoreBackend;
use plangate_store::pool;
use plangate_store::postgres::PgStore;

use crate::config::PlangateConfig;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Callable error envelope: `{"error": {"status": KIND, "message": ...}}`.
pub struct AppError(GatewayError);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.kind {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": { "status": self.0.kind, "message": self.0.message }
        });
        (self.status(), Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// Callable request envelope: `{"data": <request body>}`.
#[derive(Debug, Deserialize)]
struct CallableRequest {
    #[serde(default)]
    data: Value,
}

/// Parse the envelope. An empty body carries no data.
fn parse_envelope(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let req: CallableRequest = serde_json::from_slice(body)?;
    Ok(req.data)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub gateway: PlanGateway,
    pub verifier: Arc<dyn IdentityVerifier>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/{operation}", post(invoke))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Open the configured store. The pool is returned so it can be closed on
/// shutdown.
async fn open_store(config: &PlangateConfig) -> Result<(Arc<dyn DocumentStore>, Option<PgPool>)> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let target = config.db_target()?;
            info!(db = %target, "connecting to document database");
            let db_pool = pool::connect(&target).await?;
            let store: Arc<dyn DocumentStore> = Arc::new(PgStore::new(db_pool.clone()));
            Ok((store, Some(db_pool)))
        }
        StoreBackend::Memory => {
            warn!("using the in-memory store; plans are lost when the server exits");
            Ok((Arc::new(MemoryStore::new()), None))
        }
    }
}

pub async fn run_serve(config: PlangateConfig, bind: &str, port: u16) -> Result<()> {
    let (store, db_pool) = open_store(&config).await?;
    info!(store = store.name(), "document store ready");

    let state = AppState {
        gateway: PlanGateway::new(store),
        verifier: Arc::new(HmacVerifier::new(config.token_config)),
    };
    let app = build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("plangate serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(p) = db_pool {
        p.close().await;
    }
    info!("plangate serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn healthz() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::response::Response, AppError> {
    let op: Operation = name
        .parse()
        .map_err(|e| AppError(GatewayError::new(ErrorKind::NotFound, format!("{e}"))))?;

    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let caller = identify(state.verifier.as_ref(), authorization);

    let data = match parse_envelope(&body) {
        Ok(data) => data,
        // Authentication is reported ahead of a malformed body.
        Err(_) if caller.is_none() => return Err(GatewayError::unauthenticated(op).into()),
        Err(e) => {
            debug!(operation = %op, "malformed callable body: {e}");
            return Err(GatewayError::invalid_argument().into());
        }
    };

    let result = state.gateway.call(op, caller.as_ref(), data).await?;
    Ok(Json(serde_json::json!({ "result": result })).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use plangate_core::gateway::PlanGateway;
    use plangate_core::identity::verifier::HmacVerifier;
    use plangate_core::identity::{TokenConfig, generate_token};
    use plangate_store::DocumentStore;
    use plangate_store::memory::MemoryStore;
    use plangate_test_utils::TestDb;

    use super::AppState;

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn token_config() -> TokenConfig {
        TokenConfig::new(b"serve-test-secret".to_vec())
    }

    fn app_with(store: Arc<dyn DocumentStore>) -> axum::Router {
        super::build_router(AppState {
            gateway: PlanGateway::new(store),
            verifier: Arc::new(HmacVerifier::new(token_config())),
        })
    }

    fn app() -> axum::Router {
        app_with(Arc::new(MemoryStore::new()))
    }

    fn bearer(uid: &str) -> String {
        let token = generate_token(&token_config(), uid, Utc::now() + Duration::hours(1)).unwrap();
        format!("Bearer {token}")
    }

    async fn call(
        app: axum::Router,
        op: &str,
        auth: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri(format!("/{op}"))
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            req = req.header("authorization", auth);
        }
        let resp = app
            .oneshot(req.body(Body::from(body.to_owned())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1_048_576)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn call_data(
        app: axum::Router,
        op: &str,
        auth: &str,
        data: Value,
    ) -> (StatusCode, Value) {
        call(app, op, Some(auth), &json!({ "data": data }).to_string()).await
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_healthz() {
        let resp = app()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_any_origin() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/create_plan")
                    .header("origin", "https://plans.example.com")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "authorization,content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .unwrap_or_else(|| panic!("missing {name}"))
                .to_str()
                .unwrap()
                .to_ascii_lowercase()
        };
        assert_eq!(header("access-control-allow-origin"), "*");

        let methods = header("access-control-allow-methods");
        let methods: Vec<&str> = methods.split(',').map(str::trim).collect();
        for method in ["get", "post", "put", "delete", "options"] {
            assert!(methods.contains(&method), "{method} not in {methods:?}");
        }

        let headers = header("access-control-allow-headers");
        assert!(headers.contains("authorization"), "got {headers}");
        assert!(headers.contains("content-type"), "got {headers}");
    }

    #[tokio::test]
    async fn test_cors_headers_on_simple_response() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("origin", "https://plans.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let (status, json) = call(app(), "list_plans", None, "{}").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["status"], "UNAUTHENTICATED");
        assert_eq!(
            json["error"]["message"],
            "User must be authenticated to list plans."
        );
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthenticated() {
        let forged = TokenConfig::new(b"someone-else".to_vec());
        let token = generate_token(&forged, "alice", Utc::now() + Duration::hours(1)).unwrap();
        let (status, json) = call(
            app(),
            "create_plan",
            Some(&format!("Bearer {token}")),
            r#"{"data": {"planType": "budget"}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["status"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_unauthenticated_wins_over_malformed_body() {
        let (status, json) = call(app(), "create_plan", None, "not json").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["status"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_argument() {
        let (status, json) = call(app(), "create_plan", Some(&bearer("alice")), "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["status"], "INVALID_ARGUMENT");
        assert_eq!(json["error"]["message"], "Invalid request data.");
    }

    #[tokio::test]
    async fn test_missing_plan_type_is_invalid_argument() {
        let (status, json) = call_data(app(), "create_plan", &bearer("alice"), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["status"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_unknown_operation_is_not_found() {
        let (status, json) = call(app(), "drop_everything", Some(&bearer("alice")), "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["status"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_read_list_delete_over_http() {
        let app = app();
        let auth = bearer("alice");

        let (status, json) = call_data(
            app.clone(),
            "create_plan",
            &auth,
            json!({"planName": "Move", "planType": "checklist"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["success"], true);
        assert_eq!(json["result"]["message"], "Plan created successfully.");
        let plan_id = json["result"]["planId"].as_str().unwrap().to_owned();

        let (status, json) = call_data(
            app.clone(),
            "update_plan",
            &auth,
            json!({"planId": plan_id, "planName": "Big move", "details": {"boxes": 30}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["message"], "Plan updated successfully.");

        let (status, json) =
            call_data(app.clone(), "read_plan", &auth, json!({"planId": plan_id})).await;
        assert_eq!(status, StatusCode::OK);
        let plan = &json["result"]["plan"];
        assert_eq!(plan["planName"], "Big move");
        assert_eq!(plan["planType"], "checklist");
        assert_eq!(plan["formData"], json!({}));
        assert_eq!(plan["details"], json!({"boxes": 30}));

        let (status, json) = call(app.clone(), "list_plans", Some(&auth), "").await;
        assert_eq!(status, StatusCode::OK);
        let plans = json["result"]["plans"].as_array().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0]["id"], plan_id.as_str());
        assert!(plans[0]["lastUpdated"].is_string());

        let (status, json) =
            call_data(app.clone(), "delete_plan", &auth, json!({"planId": plan_id})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["message"], "Plan deleted successfully.");

        let (status, json) = call_data(app, "read_plan", &auth, json!({"planId": plan_id})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["message"], "Plan not found.");
    }

    #[tokio::test]
    async fn test_callers_are_isolated() {
        let app = app();
        let (_, json) = call_data(
            app.clone(),
            "create_plan",
            &bearer("alice"),
            json!({"planType": "budget"}),
        )
        .await;
        let plan_id = json["result"]["planId"].as_str().unwrap().to_owned();

        let (status, _) =
            call_data(app.clone(), "read_plan", &bearer("bob"), json!({"planId": plan_id})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = call(app, "list_plans", Some(&bearer("bob")), "{}").await;
        assert_eq!(json["result"]["plans"], json!([]));
    }

    #[tokio::test]
    async fn test_update_missing_plan_is_internal_without_details() {
        let (status, json) = call_data(
            app(),
            "update_plan",
            &bearer("alice"),
            json!({"planId": "ghost", "planName": "X"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["status"], "INTERNAL");
        assert_eq!(json["error"]["message"], "Error updating plan.");
    }

    #[tokio::test]
    async fn test_postgres_backed_roundtrip() {
        let db = TestDb::migrated().await;
        let app = app_with(Arc::new(db.store()));
        let auth = bearer("alice");

        let (status, json) = call_data(
            app.clone(),
            "create_plan",
            &auth,
            json!({"planType": "budget", "formData": {"rent": 900}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let plan_id = json["result"]["planId"].as_str().unwrap().to_owned();

        let (status, json) = call_data(app, "read_plan", &auth, json!({"planId": plan_id})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["plan"]["planName"], "Untitled Plan");
        assert_eq!(json["result"]["plan"]["formData"], json!({"rent": 900}));

        db.cleanup().await;
    }
}
