//! HTTP API for the layout sync server.
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /v1/layouts`, `POST /v1/layouts`
//! - `GET /v1/layouts/{id}`, `PUT /v1/layouts/{id}`, `DELETE /v1/layouts/{id}`

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use layoutsync_core::remote::{CreateLayoutRequest, DeleteLayoutQuery, UpdateLayoutRequest};
use layoutsync_core::{LayoutId, RemoteLayout};

use super::config::{ApiKeyStore, AuthUser};
use super::storage::{LayoutContent, LayoutFileStore, LayoutStoreError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub layouts: Arc<LayoutFileStore>,
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

/// Handler error, mapped onto the status codes the sync client understands.
#[derive(Debug)]
pub struct ApiError(LayoutStoreError);

impl From<LayoutStoreError> for ApiError {
    fn from(e: LayoutStoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            LayoutStoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            LayoutStoreError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            LayoutStoreError::Modified(_) => (StatusCode::PRECONDITION_FAILED, "modified"),
            LayoutStoreError::InvalidUserId(_) => (StatusCode::BAD_REQUEST, "invalid_user"),
            LayoutStoreError::IoError(..) | LayoutStoreError::CorruptDocument(..) => {
                tracing::error!("Storage error: {}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
        };
        error_response(status, error, self.0.to_string())
    }
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "missing_auth",
                "Authorization header required",
            )
        }
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_layouts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<RemoteLayout>>, ApiError> {
    Ok(Json(state.layouts.list(&user.user_id)?))
}

async fn create_layout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateLayoutRequest>,
) -> Result<(StatusCode, Json<RemoteLayout>), ApiError> {
    let layout = state.layouts.create(
        &user.user_id,
        body.id,
        LayoutContent {
            name: body.name,
            data: body.data,
        },
    )?;
    tracing::debug!(user = %user.user_id, "Created layout {}", layout.id);
    Ok((StatusCode::CREATED, Json(layout)))
}

async fn get_layout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<LayoutId>,
) -> Result<Json<RemoteLayout>, ApiError> {
    state
        .layouts
        .get(&user.user_id, id)?
        .map(Json)
        .ok_or(ApiError(LayoutStoreError::NotFound(id)))
}

async fn update_layout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<LayoutId>,
    Json(body): Json<UpdateLayoutRequest>,
) -> Result<Json<RemoteLayout>, ApiError> {
    let layout = state.layouts.replace(
        &user.user_id,
        id,
        LayoutContent {
            name: body.name,
            data: body.data,
        },
        body.if_unmodified_since,
    )?;
    tracing::debug!(user = %user.user_id, "Updated layout {}", layout.id);
    Ok(Json(layout))
}

async fn delete_layout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<LayoutId>,
    Query(query): Query<DeleteLayoutQuery>,
) -> Result<StatusCode, ApiError> {
    if state
        .layouts
        .delete(&user.user_id, id, query.if_unmodified_since)?
    {
        tracing::debug!(user = %user.user_id, "Deleted layout {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError(LayoutStoreError::NotFound(id)))
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/v1/layouts", get(list_layouts).post(create_layout))
        .route(
            "/v1/layouts/{id}",
            get(get_layout).put(update_layout).delete(delete_layout),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use layoutsync_core::{
        HttpRemoteLayoutStore, LayoutStorage, MemoryLayoutCache, NewLayout, RemoteError,
        RemoteLayoutStore, ReconcilingLayoutStorage, ReconcilingStorage,
    };
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "secret";

    fn setup() -> (Router, Arc<LayoutFileStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let layouts = Arc::new(LayoutFileStore::new(temp_dir.path()));
        let api_keys =
            ApiKeyStore::parse("api_keys:\n  - key: secret\n    user_id: alice\n").unwrap();
        let app = router(AppState {
            api_keys: Arc::new(api_keys),
            layouts: layouts.clone(),
        });
        (app, layouts, temp_dir)
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", KEY));
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let (app, _, _temp) = setup();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_and_invalid_auth() {
        let (app, _, _temp) = setup();

        let response = app
            .clone()
            .oneshot(Request::get("/v1/layouts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "missing_auth");

        let response = app
            .clone()
            .oneshot(
                Request::get("/v1/layouts")
                    .header(header::AUTHORIZATION, "Basic abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "invalid_auth");

        let response = app
            .oneshot(
                Request::get("/v1/layouts")
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_create_get_list() {
        let (app, _, _temp) = setup();
        let id = LayoutId::new();

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/v1/layouts",
                Some(json!({"id": id, "name": "Plots", "data": {"panels": 1}})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(request("GET", &format!("/v1/layouts/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let layout = body_json(response).await;
        assert_eq!(layout["name"], "Plots");
        assert_eq!(layout["data"], json!({"panels": 1}));

        let response = app
            .oneshot(request("GET", "/v1/layouts", None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let (app, layouts, _temp) = setup();
        let id = LayoutId::new();
        layouts
            .create(
                "alice",
                id,
                LayoutContent {
                    name: "Plots".to_string(),
                    data: json!({}),
                },
            )
            .unwrap();

        let response = app
            .oneshot(request(
                "POST",
                "/v1/layouts",
                Some(json!({"id": id, "name": "Plots", "data": {}})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let (app, layouts, _temp) = setup();
        let id = LayoutId::new();
        let created = layouts
            .create(
                "alice",
                id,
                LayoutContent {
                    name: "Plots".to_string(),
                    data: json!({}),
                },
            )
            .unwrap();
        layouts
            .replace(
                "alice",
                id,
                LayoutContent {
                    name: "Elsewhere".to_string(),
                    data: json!({}),
                },
                None,
            )
            .unwrap();

        let response = app
            .oneshot(request(
                "PUT",
                &format!("/v1/layouts/{}", id),
                Some(json!({
                    "name": "Mine",
                    "data": {},
                    "if_unmodified_since": created.updated_at,
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn test_stale_delete_is_rejected() {
        let (app, layouts, _temp) = setup();
        let url = serve(app).await;
        let id = LayoutId::new();
        let created = layouts
            .create(
                "alice",
                id,
                LayoutContent {
                    name: "Plots".to_string(),
                    data: json!({}),
                },
            )
            .unwrap();
        let replaced = layouts
            .replace(
                "alice",
                id,
                LayoutContent {
                    name: "Elsewhere".to_string(),
                    data: json!({}),
                },
                None,
            )
            .unwrap();

        let remote = HttpRemoteLayoutStore::new(url, KEY);
        assert_eq!(
            remote.delete(id, Some(created.updated_at)).await,
            Err(RemoteError::PreconditionFailed(id))
        );
        assert!(layouts.get("alice", id).unwrap().is_some());

        assert_eq!(remote.delete(id, Some(replaced.updated_at)).await, Ok(true));
        assert!(layouts.get("alice", id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_and_delete_missing() {
        let (app, _, _temp) = setup();
        let uri = format!("/v1/layouts/{}", LayoutId::new());

        let response = app
            .clone()
            .oneshot(request("GET", &uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(request("DELETE", &uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_client_round_trip() {
        let (app, layouts, _temp) = setup();
        let url = serve(app).await;

        assert!(layoutsync_core::check_server(&url).await);

        let remote = Arc::new(HttpRemoteLayoutStore::new(url.clone(), KEY));
        let storage =
            ReconcilingLayoutStorage::new(Arc::new(MemoryLayoutCache::new()), remote.clone());

        let layout = storage
            .save_new_layout(NewLayout::new("Plots", json!({"panels": 2})))
            .await
            .unwrap();
        let conflicts = storage.reconcile().await.unwrap();
        assert!(conflicts.is_empty());

        let stored = layouts.get("alice", layout.id).unwrap().unwrap();
        assert_eq!(stored.name, "Plots");

        let fetched = remote.get(layout.id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);

        let unauthorized = HttpRemoteLayoutStore::new(url, "wrong");
        assert_eq!(unauthorized.list().await, Err(RemoteError::Unauthorized));
    }
}
