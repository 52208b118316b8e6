// HTTP server with the segmentation and image API routes

use crate::websocket::{websocket_handler, websocket_with_id_handler};
use crate::websocket_manager::WebSocketManager;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_api::{
    fixtures, AlgorithmInfo, AlgorithmsListResponse, BatchResponse, CacheClearResponse,
    ErrorResponse, HealthResponse, HistoryEntry, HistoryPage, ImageDetails, ImageListPage,
    ImageUploadResponse, PageQuery,
};
use tessera_core::{Error as CoreError, ErrorKind, SegmentationRequest, SegmentationResponse, ServiceConfig};
use tessera_engine::{Orchestrator, OrchestratorStats};
use tessera_storage::{FsImageStore, ImageStore, SEGMENTATION_KEY_PREFIX};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

// Headroom on top of the file limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// API state
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ServiceConfig>,
    pub orchestrator: Arc<Orchestrator>,
    pub images: Arc<FsImageStore>,
    pub ws_manager: Arc<WebSocketManager>,
}

/// Errors returned by handlers, rendered as `ErrorResponse`.
#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Core(err)
    }
}

impl From<tessera_storage::StorageError> for ApiError {
    fn from(err: tessera_storage::StorageError) -> Self {
        ApiError::Core(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
            ApiError::PayloadTooLarge(message) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", message)
            }
            ApiError::Core(err) => match err.kind() {
                ErrorKind::Validation => {
                    let message = match err {
                        CoreError::Validation(message) => message,
                        other => other.to_string(),
                    };
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
                }
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                _ => {
                    error!(error = %err, "Request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        err.public_message(),
                    )
                }
            },
        };
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    let config = Arc::clone(&state.config);

    let segmentation_routes = Router::new()
        .route("/segmentation/segment", post(segment_handler))
        .route("/segmentation/segment/batch", post(segment_batch_handler))
        .route("/segmentation/algorithms", get(list_algorithms_handler))
        .route("/segmentation/algorithms/:name", get(get_algorithm_handler))
        .route("/segmentation/cache", delete(clear_cache_handler))
        .route("/segmentation/stats", get(stats_handler))
        .route("/segmentation/results/history", get(history_handler))
        .route("/segmentation/results/:id", get(get_result_handler));

    let image_routes = Router::new()
        .route(
            "/images/upload",
            post(upload_image_handler)
                .layer(DefaultBodyLimit::max(config.max_file_size + MULTIPART_OVERHEAD)),
        )
        .route("/images/info/:id", get(image_info_handler))
        .route("/images/list", get(list_images_handler));

    let ws_routes = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/ws/:connection_id", get(websocket_with_id_handler));

    let api_routes = segmentation_routes.merge(image_routes).merge(ws_routes);
    let prefix = config.api_prefix.trim_end_matches('/');
    let api_routes = if prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(prefix, api_routes)
    };

    let public_routes = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler));

    public_routes
        .merge(api_routes)
        .nest_service(&config.uploads_url_prefix, ServeDir::new(&config.upload_path))
        .layer(cors_layer(&config))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Serialize)]
struct WelcomeResponse {
    message: String,
    version: String,
    docs_url: String,
    health_check: String,
}

async fn root_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(WelcomeResponse {
        message: format!("Welcome to {}", state.config.app_name),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs_url: "/docs".to_string(),
        health_check: "/health".to_string(),
    })
}

/// Health check endpoint
async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.app_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp,
    })
}

async fn segment_handler(
    State(state): State<ApiState>,
    Json(request): Json<SegmentationRequest>,
) -> ApiResult<SegmentationResponse> {
    let response = state.orchestrator.process(request, None).await?;
    Ok(Json(response))
}

async fn segment_batch_handler(
    State(state): State<ApiState>,
    Json(requests): Json<Vec<SegmentationRequest>>,
) -> ApiResult<BatchResponse> {
    info!(batch_size = requests.len(), "Starting batch segmentation");
    let response = state.orchestrator.process_batch(requests).await?;
    Ok(Json(response))
}

async fn list_algorithms_handler(State(state): State<ApiState>) -> Json<AlgorithmsListResponse> {
    let algorithms: Vec<AlgorithmInfo> = state
        .orchestrator
        .registry()
        .list()
        .iter()
        .map(|algorithm| AlgorithmInfo::from_algorithm(algorithm.as_ref()))
        .collect();
    Json(AlgorithmsListResponse {
        total_count: algorithms.len(),
        algorithms,
    })
}

async fn get_algorithm_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<AlgorithmInfo> {
    let algorithm = state
        .orchestrator
        .registry()
        .get(&name)
        .map_err(|_| ApiError::NotFound(format!("Unknown algorithm: {}", name)))?;
    Ok(Json(AlgorithmInfo::from_algorithm(algorithm.as_ref())))
}

#[derive(Debug, Deserialize)]
struct ClearCacheQuery {
    prefix: Option<String>,
}

async fn clear_cache_handler(
    State(state): State<ApiState>,
    Query(query): Query<ClearCacheQuery>,
) -> Json<CacheClearResponse> {
    let prefix = query
        .prefix
        .unwrap_or_else(|| SEGMENTATION_KEY_PREFIX.to_string());
    let cleared = state.orchestrator.cache().clear_by_prefix(&prefix).await;
    info!(prefix = %prefix, cleared, "Cleared segmentation cache");
    Json(CacheClearResponse { prefix, cleared })
}

async fn stats_handler(State(state): State<ApiState>) -> Json<OrchestratorStats> {
    Json(state.orchestrator.stats())
}

async fn history_handler(Query(page): Query<PageQuery>) -> Json<HistoryPage> {
    let all = fixtures::history();
    Json(HistoryPage {
        results: page.apply(&all),
        total_count: all.len(),
        offset: page.offset,
        limit: page.limit,
    })
}

async fn get_result_handler(Path(id): Path<String>) -> ApiResult<HistoryEntry> {
    fixtures::history_entry(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

async fn upload_image_handler(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> ApiResult<ImageUploadResponse> {
    let config = &state.config;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !config.allowed_content_types.iter().any(|t| *t == content_type) {
            return Err(ApiError::BadRequest(format!(
                "Invalid file type. Allowed types: {}",
                config.allowed_content_types.join(", ")
            )));
        }

        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() > config.max_file_size {
            return Err(ApiError::PayloadTooLarge(format!(
                "File too large. Maximum size: {} bytes",
                config.max_file_size
            )));
        }

        let image = state
            .images
            .ingest(bytes.to_vec(), &filename, &content_type)
            .await?;
        return Ok(Json(ImageUploadResponse::uploaded(image)));
    }

    Err(ApiError::BadRequest("No file provided".to_string()))
}

async fn image_info_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<ImageDetails> {
    let url = state.images.url_for(&id).await?;
    let image = state.images.load(&id).await?;
    Ok(Json(ImageDetails {
        id,
        url,
        dimensions: (image.height(), image.width()),
        channels: 3,
    }))
}

async fn list_images_handler(Query(page): Query<PageQuery>) -> Json<ImageListPage> {
    let all = fixtures::images();
    Json(ImageListPage {
        images: page.apply(&all),
        total_count: all.len(),
        offset: page.offset,
        limit: page.limit,
    })
}
