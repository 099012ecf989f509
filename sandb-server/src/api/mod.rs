//! HTTP API endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use sandb_core::storage::{CreateOutcome, EngineStats, StorageEngine};
use sandb_core::{Pagination, Record, SanError, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Application state
pub struct AppState {
    pub engine: Arc<StorageEngine>,
    /// Expected `Authorization` header value; `None` disables auth
    pub token: Option<String>,
}

pub type SharedState = Arc<AppState>;

/// Router settings taken from the server configuration
#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub token: Option<String>,
    pub request_timeout: Duration,
}

/// Create the API router
pub fn create_router(engine: Arc<StorageEngine>, options: ApiOptions) -> Router {
    let state = Arc::new(AppState {
        engine,
        token: options.token,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        // Collection management
        .route("/collections", get(list_collections))
        .route(
            "/collections/:name",
            get(collection_detail)
                .put(create_collection)
                .patch(rename_collection)
                .delete(drop_collection),
        )
        // Records
        .route(
            "/data/:name",
            get(read_data).put(add_data).delete(delete_data),
        )
        .route("/stats", get(stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Error response carrying `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

impl From<SanError> for ApiError {
    fn from(err: SanError) -> Self {
        let status = if matches!(err, SanError::CollectionNotFound(_)) {
            StatusCode::NOT_FOUND
        } else if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run a filesystem-bound engine call off the async workers
async fn blocking<T, F>(state: &SharedState, f: F) -> ApiResult<T>
where
    F: FnOnce(&StorageEngine) -> sandb_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError::from(SanError::Internal(e.to_string())))?
        .map_err(ApiError::from)
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RenameParams {
    new_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    start: i64,
    end: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    start: i64,
    end: i64,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct CollectionsResponse {
    pub collections: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub data: Vec<Record>,
}

fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.into(),
    })
}

// ============================================================================
// Middleware
// ============================================================================

async fn require_token(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if let Some(expected) = state.token.as_deref() {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected) {
            debug!("Rejected request to {} without valid token", request.uri().path());
            return ApiError::unauthorized().into_response();
        }
    }
    next.run(request).await
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<MessageResponse> {
    message("All is well")
}

async fn list_collections(
    State(state): State<SharedState>,
) -> ApiResult<Json<CollectionsResponse>> {
    let collections = blocking(&state, |engine| engine.list_collections()).await?;
    Ok(Json(CollectionsResponse { collections }))
}

async fn collection_detail(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let target = name.clone();
    if !blocking(&state, move |engine| Ok(engine.collection_exists(&target))).await? {
        return Err(SanError::CollectionNotFound(name).into());
    }
    Ok(message(format!("Collection '{}' exists", name)))
}

async fn create_collection(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let target = name.clone();
    let outcome = blocking(&state, move |engine| engine.create_collection(&target)).await?;
    Ok(match outcome {
        CreateOutcome::Created => (
            StatusCode::CREATED,
            message(format!("Collection '{}' created", name)),
        ),
        CreateOutcome::AlreadyExists => (
            StatusCode::OK,
            message(format!("Collection '{}' already exists", name)),
        ),
    })
}

async fn rename_collection(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    params: Result<Query<RenameParams>, QueryRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Query(params) = params?;
    let new_name = params
        .new_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter 'new_name' is required"))?;

    let (old, new) = (name.clone(), new_name.clone());
    blocking(&state, move |engine| engine.rename_collection(&old, &new)).await?;
    Ok(message(format!("Collection '{}' renamed to '{}'", name, new_name)))
}

async fn drop_collection(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let target = name.clone();
    blocking(&state, move |engine| engine.drop_collection(&target)).await?;
    Ok(message(format!("Collection '{}' deleted successfully", name)))
}

async fn add_data(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    payload: Result<Json<Vec<Record>>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let Json(records) = payload?;
    let summary = blocking(&state, move |engine| engine.ingest(&name, &records)).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Data added successfully",
            "records": summary.records,
        })),
    ))
}

async fn read_data(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    params: Result<Query<ReadParams>, QueryRejection>,
) -> ApiResult<Json<DataResponse>> {
    let Query(params) = params?;
    let page = Pagination::from_params(params.limit, params.offset)?;
    let range = TimeRange::new(params.start, params.end);

    let data = blocking(&state, move |engine| engine.query(&name, range, page)).await?;
    Ok(Json(DataResponse { data }))
}

async fn delete_data(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Query(params) = params?;
    let range = TimeRange::new(params.start, params.end);

    let summary = blocking(&state, move |engine| engine.delete_range(&name, range)).await?;
    Ok(Json(json!({
        "message": "Data deleted successfully",
        "removed": summary.removed,
    })))
}

async fn stats(State(state): State<SharedState>) -> ApiResult<Json<EngineStats>> {
    let stats = blocking(&state, |engine| engine.stats()).await?;
    Ok(Json(stats))
}
