//! REST endpoints over a shared [`FileStorage`].
//!
//! File references travel in the `reference` query parameter rather than the path, because the
//! percent-encoded original filename inside a reference would otherwise be decoded by the router.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use depot_files::{FileInfo, FileReference, FileStorage, FilesError, REFERENCE_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

type ApiError = (StatusCode, &'static str);

/// Application state shared across REST API handlers
#[derive(Clone)]
pub struct AppState {
    storage: Arc<FileStorage>,
}

impl AppState {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        Self { storage }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthRes {
    ok: bool,
    message: String,
    storage_name: String,
    roots: usize,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Original filename to record in the reference
    name: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UploadRes {
    reference: String,
    size_bytes: u64,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReferenceQuery {
    /// File reference returned by an upload
    reference: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ExistsRes {
    reference: String,
    exists: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FileInfoRes {
    reference: String,
    original_filename: String,
    relative_path: String,
    root: String,
    size_bytes: u64,
    modified_at: Option<String>,
    media_type: Option<String>,
}

impl From<FileInfo> for FileInfoRes {
    fn from(info: FileInfo) -> Self {
        Self {
            reference: info.reference,
            original_filename: info.original_filename,
            relative_path: info.relative_path.display().to_string(),
            root: info.root.display().to_string(),
            size_bytes: info.size_bytes,
            modified_at: info.modified_at.map(|t| t.to_rfc3339()),
            media_type: info.media_type,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, upload, download, remove, exists, info),
    components(schemas(HealthRes, UploadRes, ExistsRes, FileInfoRes))
)]
struct ApiDoc;

/// Builds the router with all file endpoints and Swagger UI.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/files", get(download).post(upload).delete(remove))
        .route("/files/exists", get(exists))
        .route("/files/info", get(info))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(error: FilesError) -> ApiError {
    match error {
        FilesError::FileNotFound(_) => (StatusCode::NOT_FOUND, "File not found"),
        FilesError::InvalidReferenceFormat(_) => {
            (StatusCode::BAD_REQUEST, "Invalid file reference")
        }
        FilesError::FileAlreadyExists(_) => (StatusCode::CONFLICT, "File already exists"),
        FilesError::StorageUnavailable(reason) => {
            tracing::error!("Storage unavailable: {}", reason);
            (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable")
        }
        other => {
            tracing::error!("Storage error: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// Runs blocking filesystem work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, FilesError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(error_response),
        Err(e) => {
            tracing::error!("Storage task failed: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

fn parse_reference(query: &ReferenceQuery) -> Result<FileReference, ApiError> {
    FileReference::parse(&query.reference).map_err(error_response)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Depot REST API is alive".into(),
        storage_name: state.storage.storage_name().to_owned(),
        roots: state.storage.roots().len(),
    })
}

#[utoipa::path(
    post,
    path = "/files",
    params(UploadQuery),
    request_body(
        content = String,
        description = "Raw file bytes",
        content_type = "application/octet-stream"
    ),
    responses(
        (status = 201, description = "File stored", body = UploadRes),
        (status = 409, description = "File already exists"),
        (status = 503, description = "Storage unavailable"),
        (status = 500, description = "Internal server error")
    )
)]
/// Store the request body as a new file
///
/// Returns once the primary copy is committed; secondary copies follow in the background.
#[axum::debug_handler]
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadRes>), ApiError> {
    let storage = Arc::clone(&state.storage);
    let res = blocking(move || {
        let reference = storage.create_reference(query.name.as_deref());
        let size_bytes = storage.save_stream(&reference, &mut &body[..])?;
        Ok(UploadRes {
            reference: reference.to_string(),
            size_bytes,
        })
    })
    .await?;

    tracing::info!("stored {} ({} bytes)", res.reference, res.size_bytes);
    Ok((StatusCode::CREATED, Json(res)))
}

#[utoipa::path(
    get,
    path = "/files",
    params(ReferenceQuery),
    responses(
        (
            status = 200,
            description = "File content",
            body = String,
            content_type = "application/octet-stream"
        ),
        (status = 400, description = "Invalid file reference"),
        (status = 404, description = "File not found")
    )
)]
/// Download a stored file
#[axum::debug_handler]
async fn download(
    State(state): State<AppState>,
    Query(query): Query<ReferenceQuery>,
) -> Result<Response, ApiError> {
    let reference = parse_reference(&query)?;

    // The canonical encoded suffix only uses RFC 5987 attr-chars.
    let canonical = reference.to_string();
    let disposition = match canonical.split_once(REFERENCE_SEPARATOR) {
        Some((_, encoded)) if !encoded.is_empty() => {
            format!("attachment; filename*=UTF-8''{}", encoded)
        }
        _ => "attachment".to_owned(),
    };

    let storage = Arc::clone(&state.storage);
    let content = blocking(move || storage.read(&reference)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

#[utoipa::path(
    delete,
    path = "/files",
    params(ReferenceQuery),
    responses(
        (status = 204, description = "File removed from every root"),
        (status = 400, description = "Invalid file reference"),
        (status = 500, description = "Internal server error")
    )
)]
/// Delete a stored file from every root
#[axum::debug_handler]
async fn remove(
    State(state): State<AppState>,
    Query(query): Query<ReferenceQuery>,
) -> Result<StatusCode, ApiError> {
    let reference = parse_reference(&query)?;
    let storage = Arc::clone(&state.storage);
    blocking(move || storage.remove_file(&reference)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/files/exists",
    params(ReferenceQuery),
    responses(
        (status = 200, description = "Existence check", body = ExistsRes),
        (status = 400, description = "Invalid file reference")
    )
)]
/// Check whether any root contains a stored file
#[axum::debug_handler]
async fn exists(
    State(state): State<AppState>,
    Query(query): Query<ReferenceQuery>,
) -> Result<Json<ExistsRes>, ApiError> {
    let reference = parse_reference(&query)?;
    let storage = Arc::clone(&state.storage);
    let exists = blocking(move || Ok(storage.file_exists(&reference))).await?;
    Ok(Json(ExistsRes {
        reference: query.reference,
        exists,
    }))
}

#[utoipa::path(
    get,
    path = "/files/info",
    params(ReferenceQuery),
    responses(
        (status = 200, description = "File metadata", body = FileInfoRes),
        (status = 400, description = "Invalid file reference"),
        (status = 404, description = "File not found")
    )
)]
/// Describe a stored file
#[axum::debug_handler]
async fn info(
    State(state): State<AppState>,
    Query(query): Query<ReferenceQuery>,
) -> Result<Json<FileInfoRes>, ApiError> {
    let reference = parse_reference(&query)?;
    let storage = Arc::clone(&state.storage);
    let info = blocking(move || storage.file_info(&reference)).await?;
    Ok(Json(info.into()))
}
