//! Web service accepting BEO packets for background splitting.
//!
//! Clients upload a packet, poll its status, and receive a download link by
//! email once the split archive is published.

mod error;
mod handlers;
mod routes;

pub use error::ServerError;
pub use handlers::UploadResponse;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::rate_limit::{InMemoryQuota, QuotaGuard};
use crate::repository::{open_submissions, SubmissionStore};
use crate::services::{
    LocalStorage, LogNotifier, Notifier, ObjectStorage, PostmarkNotifier, SubmissionProcessor,
    SupabaseStorage,
};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn SubmissionStore>,
    pub quota: Arc<dyn QuotaGuard>,
    pub processor: SubmissionProcessor,
    /// Set when archives are kept on disk and served from `/files`.
    pub local_storage: Option<Arc<LocalStorage>>,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        settings.ensure_directories()?;

        let store: Arc<dyn SubmissionStore> =
            Arc::new(open_submissions(&settings.database_url()).await?);

        let (storage, local_storage): (Arc<dyn ObjectStorage>, _) =
            match (&settings.supabase_url, &settings.supabase_service_key) {
                (Some(url), Some(key)) => {
                    tracing::info!("Publishing archives to Supabase bucket {}", settings.storage_bucket_name);
                    (
                        Arc::new(SupabaseStorage::new(url, key, &settings.storage_bucket_name)),
                        None,
                    )
                }
                _ => {
                    let secret = settings
                        .api_secret_key
                        .clone()
                        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                    let local = Arc::new(LocalStorage::new(
                        settings.storage_dir(),
                        &settings.public_base_url,
                        &secret,
                    ));
                    tracing::info!("Storing archives locally in {}", local.root().display());
                    (local.clone(), Some(local))
                }
            };

        let notifier: Arc<dyn Notifier> =
            match (&settings.postmark_api_key, &settings.postmark_from_email) {
                (Some(key), Some(from)) => Arc::new(PostmarkNotifier::new(key, from)),
                _ => {
                    tracing::warn!("Postmark is not configured; download links will only be logged");
                    Arc::new(LogNotifier)
                }
            };

        let processor = SubmissionProcessor::new(
            store.clone(),
            storage,
            notifier,
            Arc::new(settings.split.splitter()),
            settings.download_url_expiry_days,
        );

        Ok(Self {
            settings: Arc::new(settings.clone()),
            store,
            quota: Arc::new(InMemoryQuota::new(settings.rate_limit_per_hour)),
            processor,
            local_storage,
        })
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let state = AppState::new(settings).await?;
    let app = create_router(state);

    let addr: SocketAddr = bind.parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::repository::{AsyncSqlitePool, DieselSubmissionRepository};
    use crate::services::processor::test_support::{MemoryStorage, RecordingNotifier};
    use crate::split::{PopplerLoader, SplitOptions, Splitter};

    const BOUNDARY: &str = "beo-test-boundary";
    const SECRET: &str = "s3cret";
    const PDF_BYTES: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

    async fn setup_test_app(
        configure: impl FnOnce(&mut Settings),
    ) -> (axum::Router, Arc<dyn SubmissionStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mut settings = Settings::with_data_dir(dir.path().to_path_buf());
        settings.api_secret_key = Some(SECRET.to_string());
        configure(&mut settings);
        settings.ensure_directories().unwrap();

        let repo = DieselSubmissionRepository::new(AsyncSqlitePool::from_path(&settings.database_path()));
        repo.init_schema().await.unwrap();
        let store: Arc<dyn SubmissionStore> = Arc::new(repo);

        let splitter = Splitter::new(
            Arc::new(PopplerLoader::new()),
            SplitOptions {
                ocr_enabled: false,
                ..Default::default()
            },
        );
        let processor = SubmissionProcessor::new(
            store.clone(),
            Arc::new(MemoryStorage::default()),
            Arc::new(RecordingNotifier::default()),
            Arc::new(splitter),
            settings.download_url_expiry_days,
        );
        let local = Arc::new(LocalStorage::new(
            settings.storage_dir(),
            &settings.public_base_url,
            SECRET,
        ));

        let state = AppState {
            quota: Arc::new(InMemoryQuota::new(settings.rate_limit_per_hour)),
            settings: Arc::new(settings),
            store: store.clone(),
            processor,
            local_storage: Some(local),
        };
        (create_router(state), store, dir)
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((filename, content_type, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"pdf_file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, filename, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(auth: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = auth {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn valid_upload(email: &str) -> Vec<u8> {
        multipart_body(
            &[("name", "Dana"), ("email", email), ("event_name", "Gala")],
            Some(("packet.pdf", "application/pdf", PDF_BYTES)),
        )
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (app, _store, _dir) = setup_test_app(|_| {}).await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["message"], "BEO Separator API");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_upload_requires_auth() {
        let (app, _store, _dir) = setup_test_app(|_| {}).await;

        let response = app
            .clone()
            .oneshot(upload_request(None, valid_upload("a@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["detail"], "Missing Authorization header");

        let response = app
            .oneshot(upload_request(Some("wrong"), valid_upload("a@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["detail"], "Invalid API key");
    }

    #[tokio::test]
    async fn test_upload_accepted() {
        let (app, store, _dir) = setup_test_app(|_| {}).await;

        let response = app
            .clone()
            .oneshot(upload_request(Some(SECRET), valid_upload("a@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = json_body(response).await;
        assert_eq!(json["status"], "pending");
        let id = json["submission_id"].as_str().unwrap().to_string();
        assert_eq!(json["status_url"], format!("/api/status/{}", id));

        let stored = store
            .get(uuid::Uuid::parse_str(&id).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Dana");
        assert_eq!(stored.event_name.as_deref(), Some("Gala"));
        assert_eq!(stored.file_size, Some(PDF_BYTES.len() as i64));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/status/{}", id))
                    .header("authorization", format!("Bearer {}", SECRET))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["id"], id);
        assert_eq!(json["email"], "a@example.com");
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf() {
        let (app, _store, _dir) = setup_test_app(|_| {}).await;

        let cases = [
            ("packet.txt", "application/pdf", PDF_BYTES),
            ("packet.pdf", "text/plain", PDF_BYTES),
            ("packet.pdf", "application/pdf", b"not a pdf at all".as_slice()),
        ];
        for (filename, content_type, data) in cases {
            let body = multipart_body(
                &[("name", "Dana"), ("email", "b@example.com")],
                Some((filename, content_type, data)),
            );
            let response = app
                .clone()
                .oneshot(upload_request(Some(SECRET), body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", filename);
            assert_eq!(json_body(response).await["detail"], "File must be a PDF");
        }
    }

    #[tokio::test]
    async fn test_upload_missing_field() {
        let (app, _store, _dir) = setup_test_app(|_| {}).await;

        let body = multipart_body(
            &[("name", "Dana")],
            Some(("packet.pdf", "application/pdf", PDF_BYTES)),
        );
        let response = app
            .oneshot(upload_request(Some(SECRET), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "Missing required field: email"
        );
    }

    #[tokio::test]
    async fn test_upload_rate_limited() {
        let (app, _store, _dir) = setup_test_app(|s| s.rate_limit_per_hour = 1).await;

        let response = app
            .clone()
            .oneshot(upload_request(Some(SECRET), valid_upload("c@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(upload_request(Some(SECRET), valid_upload("C@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json_body(response).await["detail"],
            "Rate limit exceeded. Maximum 1 submissions per hour."
        );

        let response = app
            .oneshot(upload_request(Some(SECRET), valid_upload("d@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let (app, _store, _dir) = setup_test_app(|s| s.max_file_size_mb = Some(1)).await;

        let mut data = PDF_BYTES.to_vec();
        data.resize(1024 * 1024 + 1, b' ');
        let body = multipart_body(
            &[("name", "Dana"), ("email", "e@example.com")],
            Some(("packet.pdf", "application/pdf", &data)),
        );
        let response = app
            .oneshot(upload_request(Some(SECRET), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "File size exceeds maximum of 1MB"
        );
    }

    #[tokio::test]
    async fn test_status_not_found() {
        let (app, _store, _dir) = setup_test_app(|_| {}).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/status/{}", uuid::Uuid::new_v4()))
                    .header("authorization", format!("Bearer {}", SECRET))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["detail"], "Submission not found");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/status/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signed_file_download() {
        let (app, _store, dir) = setup_test_app(|_| {}).await;

        let storage = LocalStorage::new(dir.path().join("storage"), "http://localhost:8000", SECRET);
        let local = dir.path().join("beos.zip");
        std::fs::write(&local, b"PK\x03\x04archive").unwrap();
        storage.upload(&local, "submissions/x/beos.zip").await.unwrap();
        let url = storage
            .create_signed_url("submissions/x/beos.zip", std::time::Duration::from_secs(60))
            .await
            .unwrap();
        let path_and_query = url.trim_start_matches("http://localhost:8000").to_string();

        let response = app
            .clone()
            .oneshot(Request::builder().uri(&path_and_query).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"beos.zip\""
        );

        let tampered = path_and_query.replace("token=", "token=0");
        let response = app
            .oneshot(Request::builder().uri(&tampered).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
