//! Upload and download handlers.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::web::dto::{ApiResponse, DownloadQuery, PingResponse, UploadResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::RelayError;

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters are removed, quotes and backslashes are replaced in
/// the ASCII fallback, and non-ASCII names get an RFC 5987 `filename*`.
pub fn content_disposition_header(filename: &str) -> String {
    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    let encoded = urlencoding::encode(filename);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// GET /ping - Liveness check behind the rate limiter.
#[utoipa::path(
    get,
    path = "/ping",
    tag = "relay",
    responses(
        (status = 200, description = "Service is up", body = PingResponse),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        message: "pong".to_string(),
    })
}

/// POST /upload - Store a file and return its access code.
///
/// Request body: multipart/form-data with a "file" field.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "relay",
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file provided"),
        (status = 413, description = "File too large"),
        (status = 429, description = "Rate limited"),
        (status = 503, description = "No access code available")
    )
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, ApiError> {
    let max = state.max_upload_size;
    let multipart_error = move |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(max)
        } else {
            tracing::warn!("Failed to read multipart data: {}", e);
            ApiError::bad_request("Invalid multipart data")
        }
    };

    let mut upload: Option<(String, axum::body::Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, content));
        break;
    }

    let (filename, content) = upload.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let size = content.len() as u64;
    if size > max {
        return Err(RelayError::PayloadTooLarge { size, max }.into());
    }

    // The code is held but not downloadable until the file is on disk
    let entry = state.store.reserve(size)?;

    let storage = Arc::clone(&state.storage);
    let code = entry.code.clone();
    let saved =
        tokio::task::spawn_blocking(move || storage.save(&code, &filename, &content)).await;

    match saved {
        Ok(Ok(path)) => {
            state.store.confirm(&entry.code);
            tracing::info!(code = %entry.code, size_bytes = size, path = %path.display(), "Stored upload");
        }
        Ok(Err(e)) => {
            state.store.discard(&entry.code);
            return Err(e.into());
        }
        Err(e) => {
            state.store.discard(&entry.code);
            tracing::error!("Upload task failed: {}", e);
            return Err(ApiError::internal("Failed to save file"));
        }
    }

    Ok(Json(ApiResponse::new(UploadResponse::from_entry(
        &entry,
        state.store.ttl(),
    ))))
}

/// GET /download?code=XXXX - Stream the file stored under a code.
///
/// A download counts against the quota as soon as streaming starts, even if
/// the client disconnects before the end.
#[utoipa::path(
    get,
    path = "/download",
    tag = "relay",
    params(DownloadQuery),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Invalid code"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response<Body>, ApiError> {
    let entry = state.store.consume(query.code.trim())?;

    let stored = state.storage.locate(&entry.code).map_err(|e| {
        tracing::error!(code = %entry.code, "Stored file missing: {}", e);
        ApiError::internal("Failed to open file")
    })?;

    let file = tokio::fs::File::open(&stored.path).await.map_err(|e| {
        tracing::error!(code = %entry.code, "Failed to open file: {}", e);
        ApiError::internal("Failed to open file")
    })?;

    tracing::info!(
        code = %entry.code,
        remaining_downloads = entry.remaining_downloads,
        "Serving download"
    );

    let content_type = mime_guess::from_path(&stored.file_name)
        .first_or_octet_stream()
        .to_string();

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&stored.file_name),
        )
        .header(header::CONTENT_LENGTH, stored.size)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}
