//! REST API layer (Axum, port 11111 by default)
//!
//! Every `/api/*` route except login sits behind the bearer-token gate, which
//! resolves the caller and checks the route's capability before the handler
//! runs. Errors are always rendered as `{"error": "<message>"}`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::auth::{IdentityError, IdentityProvider, SignedIn};
use crate::policy::{authorize, Capability, GateError};
use crate::scanner::{ScannerError, ScannerSupervisor};
use crate::storage::{Storage, StorageError};

pub mod inventory;
pub mod products;
pub mod scanner;
pub mod users;

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
pub struct AppState {
    pub storage: Storage,
    pub identity: IdentityProvider,
    pub scanner: ScannerSupervisor,
}

impl AppState {
    pub fn new(storage: Storage, identity: IdentityProvider, scanner: ScannerSupervisor) -> Self {
        Self {
            storage,
            identity,
            scanner,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    /// A write the store or identity provider refused; the raw message is surfaced.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: &str) -> Self {
        ApiError::Validation(msg.to_string())
    }

    pub fn rejected(err: impl std::fmt::Display) -> Self {
        ApiError::Rejected(err.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(msg) => error!(%status, error = %msg, "request failed"),
            ApiError::Rejected(msg) => warn!(%status, error = %msg, "write rejected"),
            other => debug!(%status, error = %other, "request refused"),
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::MissingToken | GateError::InvalidToken => {
                ApiError::Unauthorized(err.to_string())
            }
            GateError::NotRegistered | GateError::Forbidden => ApiError::Forbidden(err.to_string()),
            GateError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ScannerError> for ApiError {
    fn from(err: ScannerError) -> Self {
        match err {
            ScannerError::AlreadyRunning | ScannerError::NotRunning => {
                ApiError::Validation(err.to_string())
            }
            ScannerError::EmptyCommand | ScannerError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// `Json<T>` whose rejection is rendered like every other API error (400).
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::Validation(rejection.body_text())),
        }
    }
}

/// Generic success body: `{success, id?, uid?}`
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct RestResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl RestResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_id(id: String) -> Self {
        Self {
            id: Some(id),
            ..Self::ok()
        }
    }

    pub fn with_uid(uid: String) -> Self {
        Self {
            uid: Some(uid),
            ..Self::ok()
        }
    }
}

#[derive(Clone)]
struct Gate {
    state: Arc<AppState>,
    capability: Capability,
}

fn gated(state: &Arc<AppState>, capability: Capability, routes: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    let gate = Gate {
        state: state.clone(),
        capability,
    };
    routes.route_layer(middleware::from_fn_with_state(gate, auth_middleware))
}

async fn auth_middleware(
    State(gate): State<Gate>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let caller = authorize(
        &gate.state.identity,
        &gate.state.storage,
        authorization,
        gate.capability,
    )?;
    debug!(uid = %caller.uid, role = %caller.role, "caller authorized");

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status >= 400 {
        warn!(%method, %path, status, duration_ms, "request completed with error");
    } else {
        info!(%method, %path, status, duration_ms, "request completed");
    }
    response
}

/// Create the Axum router with every endpoint wired to its gate.
pub fn create_router(state: Arc<AppState>) -> Router {
    let product_routes = gated(
        &state,
        Capability::ManageProducts,
        Router::new().route(
            "/api/handleProducts",
            get(products::list_products)
                .post(products::create_product)
                .put(products::update_product)
                .delete(products::delete_product),
        ),
    );

    let user_routes = gated(
        &state,
        Capability::ManageUsers,
        Router::new().route(
            "/api/handleUsers",
            get(users::list_users)
                .post(users::create_user)
                .put(users::update_user)
                .delete(users::delete_user),
        ),
    );

    let inventory_routes = gated(
        &state,
        Capability::ManageInventory,
        Router::new()
            .route(
                "/api/handleInventory",
                get(inventory::list_stock)
                    .post(inventory::create_stock)
                    .put(inventory::update_stock)
                    .delete(inventory::delete_stock)
                    .patch(inventory::increment_by_name),
            )
            .route("/api/lowStock", get(inventory::low_stock)),
    );

    let scanner_routes = gated(
        &state,
        Capability::RunScanner,
        Router::new().route("/api/runScanner", post(scanner::run_scanner)),
    );

    Router::new()
        .route("/api/login", post(login_handler))
        .route("/health", get(health_handler))
        .merge(product_routes)
        .merge(user_routes)
        .merge(inventory_routes)
        .merge(scanner_routes)
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<LoginBody>,
) -> Result<Json<SignedIn>, ApiError> {
    let (Some(email), Some(password)) = (body.email, body.password) else {
        return Err(ApiError::validation("Missing email or password"));
    };

    match state.identity.sign_in(&email, &password) {
        Ok(signed) => {
            info!(uid = %signed.uid, "signed in");
            Ok(Json(signed))
        }
        Err(IdentityError::InvalidCredentials) => Err(ApiError::Unauthorized(
            IdentityError::InvalidCredentials.to_string(),
        )),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "stockroom API healthy".to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::TestApp;
    use super::*;
    use crate::models::Role;
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_rest_health() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_every_handler_requires_bearer_token() {
        let app = TestApp::new();
        let routes = [
            (Method::GET, "/api/handleProducts"),
            (Method::POST, "/api/handleProducts"),
            (Method::PUT, "/api/handleProducts"),
            (Method::DELETE, "/api/handleProducts"),
            (Method::GET, "/api/handleUsers"),
            (Method::POST, "/api/handleUsers"),
            (Method::PUT, "/api/handleUsers"),
            (Method::DELETE, "/api/handleUsers"),
            (Method::GET, "/api/handleInventory"),
            (Method::POST, "/api/handleInventory"),
            (Method::PUT, "/api/handleInventory"),
            (Method::DELETE, "/api/handleInventory"),
            (Method::PATCH, "/api/handleInventory"),
            (Method::GET, "/api/lowStock"),
            (Method::POST, "/api/runScanner"),
        ];

        for (method, uri) in routes {
            let (status, body) = app
                .call(method.clone(), uri, None, Some(json!({"id": "x"})))
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
            assert_eq!(body["error"], "Missing Authorization header");

            let (status, body) = app
                .call(method.clone(), uri, Some("not-a-token"), Some(json!({"id": "x"})))
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
            assert_eq!(body["error"], "Invalid or expired token");
        }
    }

    #[tokio::test]
    async fn test_token_without_role_document_is_forbidden() {
        let app = TestApp::new();
        let account = app
            .state
            .identity
            .create_account("ghost@example.com", "pw", "Ghost")
            .unwrap();
        let token = app.state.identity.issue_token(&account).unwrap();

        let (status, body) = app
            .call(Method::GET, "/api/handleInventory", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "User not registered");
    }

    #[tokio::test]
    async fn test_login_issues_usable_token() {
        let app = TestApp::new();
        let admin = app.token_for(Role::Admin);
        let (status, _) = app
            .call(
                Method::POST,
                "/api/handleUsers",
                Some(&admin),
                Some(json!({
                    "name": "Luis",
                    "email": "luis@example.com",
                    "password": "clave",
                    "role": "user"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/login",
                None,
                Some(json!({"email": "luis@example.com", "password": "clave"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["expiresIn"], 3600);

        let (status, _) = app
            .call(Method::GET, "/api/handleInventory", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/login",
                None,
                Some(json!({"email": "luis@example.com", "password": "wrong"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid email or password");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = TestApp::new();
        let admin = app.token_for(Role::Admin);
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/handleProducts")
            .header("authorization", format!("Bearer {}", admin))
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();

        use tower::ServiceExt;
        let response = create_router(app.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
