//! HTTP request handlers for the upload API.

use std::path::Path as FsPath;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ServerError;
use super::AppState;
use crate::models::{NewSubmission, Submission, SubmissionStatus};
use crate::services::SubmissionJob;

/// Service name and version.
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "BEO Separator API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Check the bearer token against the configured key. No key means no auth.
fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ServerError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ServerError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| ServerError::Unauthorized("Invalid Authorization header format".to_string()))?;
    let token = value.strip_prefix("Bearer ").ok_or_else(|| {
        ServerError::Unauthorized("Invalid Authorization header format".to_string())
    })?;
    if token.trim() != expected {
        return Err(ServerError::Unauthorized("Invalid API key".to_string()));
    }
    Ok(())
}

/// Fields collected from the upload form.
#[derive(Default)]
struct UploadForm {
    name: Option<String>,
    email: Option<String>,
    event_name: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Option<Vec<u8>>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            match field.name().unwrap_or_default() {
                "name" => form.name = Some(field.text().await?),
                "email" => form.email = Some(field.text().await?),
                "event_name" => {
                    let value = field.text().await?;
                    form.event_name = Some(value).filter(|v| !v.trim().is_empty());
                }
                "pdf_file" => {
                    form.file_name = field.file_name().map(str::to_string);
                    form.content_type = field.content_type().map(str::to_string);
                    form.data = Some(field.bytes().await?.to_vec());
                }
                _ => {}
            }
        }
        Ok(form)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ServerError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::BadRequest(format!("Missing required field: {}", field)))
}

/// Whether the upload looks like a PDF by name, declared type and content.
fn is_pdf_upload(file_name: &str, content_type: Option<&str>, data: &[u8]) -> bool {
    file_name.to_lowercase().ends_with(".pdf")
        && content_type == Some("application/pdf")
        && infer::get(data).is_some_and(|kind| kind.mime_type() == "application/pdf")
}

/// Final path component of a client-supplied filename.
fn safe_file_name(file_name: &str) -> String {
    FsPath::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload.pdf")
        .to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub status_url: String,
    pub message: String,
}

/// Accept a PDF packet and queue it for processing.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    authorize(&headers, state.settings.api_secret_key.as_deref())?;

    let form = UploadForm::read(multipart).await?;
    let name = required(form.name, "name")?;
    let email = required(form.email, "email")?;
    let data = form
        .data
        .ok_or_else(|| ServerError::BadRequest("Missing required field: pdf_file".to_string()))?;
    let file_name = form.file_name.unwrap_or_default();

    if !state.quota.allow(&email.to_lowercase()).await {
        return Err(ServerError::RateLimited(format!(
            "Rate limit exceeded. Maximum {} submissions per hour.",
            state.settings.rate_limit_per_hour
        )));
    }

    if !is_pdf_upload(&file_name, form.content_type.as_deref(), &data) {
        return Err(ServerError::BadRequest("File must be a PDF".to_string()));
    }

    if let (Some(limit), Some(mb)) = (
        state.settings.max_file_size_bytes(),
        state.settings.max_file_size_mb,
    ) {
        if data.len() as u64 > limit {
            return Err(ServerError::BadRequest(format!(
                "File size exceeds maximum of {}MB",
                mb
            )));
        }
    }

    let upload_dir = tempfile::Builder::new()
        .prefix("beo_upload_")
        .tempdir_in(state.settings.uploads_dir())?;
    let upload_path = upload_dir.path().join(safe_file_name(&file_name));
    tokio::fs::write(&upload_path, &data).await?;

    let id = state
        .store
        .create(&NewSubmission {
            name: name.clone(),
            email: email.clone(),
            event_name: form.event_name.clone(),
            file_size: data.len() as i64,
        })
        .await?;
    tracing::info!("Accepted submission {} ({} bytes)", id, data.len());

    let job = SubmissionJob::new(id, name, email, form.event_name, upload_path)
        .with_upload_dir(upload_dir);
    let processor = state.processor.clone();
    tokio::spawn(async move {
        // Outcome is recorded on the submission.
        let _ = processor.process(job).await;
    });

    let body = UploadResponse {
        submission_id: id,
        status: SubmissionStatus::Pending,
        status_url: format!("/api/status/{}", id),
        message: "File uploaded successfully. Processing will begin shortly.".to_string(),
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// Current state of a submission.
pub async fn submission_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
) -> Result<Json<Submission>, ServerError> {
    authorize(&headers, state.settings.api_secret_key.as_deref())?;

    let id = Uuid::parse_str(&submission_id)
        .map_err(|_| ServerError::BadRequest("Invalid submission id".to_string()))?;
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("Submission not found".to_string()))
}

/// Signed download parameters.
#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub expires: i64,
    pub token: String,
}

/// Serve an archive from local storage when the signature checks out.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<SignedParams>,
) -> Result<Response, ServerError> {
    let not_found = || ServerError::NotFound("File not found".to_string());

    let storage = state.local_storage.as_ref().ok_or_else(not_found)?;
    let file = storage
        .verify(&path, params.expires, &params.token)
        .ok_or_else(not_found)?;
    let content = tokio::fs::read(&file).await.map_err(|_| not_found())?;

    let mime = infer::get(&content)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.file_name().and_then(|n| n.to_str()).unwrap_or("download")
    );
    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}
