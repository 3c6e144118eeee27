//! Object storage for processed archives.
//!
//! Supabase Storage is used when configured; otherwise archives are copied
//! into a local directory and served by the API with a signed token.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from object storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote storage for finished archives.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload the file at `local` to `remote`.
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), StorageError>;

    /// Create a time-limited download URL for `remote`.
    async fn create_signed_url(&self, remote: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Reject absolute paths and parent traversal.
fn validate_remote(remote: &str) -> Result<&str, StorageError> {
    let trimmed = remote.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|seg| seg == ".." || seg.is_empty()) {
        return Err(StorageError::InvalidPath(remote.to_string()));
    }
    Ok(trimmed)
}

/// Supabase Storage REST client.
#[derive(Clone)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseStorage {
    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        }
    }

    fn object_url(&self, remote: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, remote)
    }

    fn sign_url(&self, remote: &str) -> String {
        format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.base_url, self.bucket, remote
        )
    }

    /// Absolute download URL for a `signedURL` value returned by the API.
    fn absolute_signed_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else {
            format!("{}/storage/v1{}", self.base_url, signed)
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), StorageError> {
        let remote = validate_remote(remote)?;
        let bytes = tokio::fs::read(local).await?;
        let size = bytes.len();

        let response = self
            .client
            .post(self.object_url(remote))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;

        tracing::info!("Uploaded {} bytes to {}/{}", size, self.bucket, remote);
        Ok(())
    }

    async fn create_signed_url(&self, remote: &str, ttl: Duration) -> Result<String, StorageError> {
        let remote = validate_remote(remote)?;
        let response = self
            .client
            .post(self.sign_url(remote))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&serde_json::json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await?;
        let signed: SignedUrlResponse = Self::check(response).await?.json().await?;
        Ok(self.absolute_signed_url(&signed.signed_url))
    }
}

/// Filesystem-backed storage with HMAC-style download tokens.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
    secret: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str, secret: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Token binding a path to an expiry timestamp.
    pub fn token(&self, remote: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(remote.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Resolve a signed request to a file path, if the token is valid and unexpired.
    pub fn verify(&self, remote: &str, expires: i64, token: &str) -> Option<PathBuf> {
        let remote = validate_remote(remote).ok()?;
        if expires < Utc::now().timestamp() || self.token(remote, expires) != token {
            return None;
        }
        let path = self.root.join(remote);
        path.is_file().then_some(path)
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), StorageError> {
        let remote = validate_remote(remote)?;
        let dest = self.root.join(remote);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, &dest).await?;
        tracing::info!("Stored {} at {}", local.display(), dest.display());
        Ok(())
    }

    async fn create_signed_url(&self, remote: &str, ttl: Duration) -> Result<String, StorageError> {
        let remote = validate_remote(remote)?;
        if !self.root.join(remote).is_file() {
            return Err(StorageError::InvalidPath(remote.to_string()));
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!(
            "{}/files/{}?expires={}&token={}",
            self.public_base_url,
            remote,
            expires,
            self.token(remote, expires)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_remote() {
        assert_eq!(validate_remote("submissions/a/beos.zip").unwrap(), "submissions/a/beos.zip");
        assert_eq!(validate_remote("/x.zip").unwrap(), "x.zip");
        assert!(validate_remote("../etc/passwd").is_err());
        assert!(validate_remote("a//b").is_err());
        assert!(validate_remote("").is_err());
    }

    #[test]
    fn test_supabase_urls() {
        let storage = SupabaseStorage::new("https://proj.supabase.co/", "key", "beo-outputs");
        assert_eq!(
            storage.object_url("submissions/1/beos.zip"),
            "https://proj.supabase.co/storage/v1/object/beo-outputs/submissions/1/beos.zip"
        );
        assert_eq!(
            storage.sign_url("submissions/1/beos.zip"),
            "https://proj.supabase.co/storage/v1/object/sign/beo-outputs/submissions/1/beos.zip"
        );
        assert_eq!(
            storage.absolute_signed_url("/object/sign/beo-outputs/x.zip?token=abc"),
            "https://proj.supabase.co/storage/v1/object/sign/beo-outputs/x.zip?token=abc"
        );
    }

    #[tokio::test]
    async fn test_local_upload_and_sign() {
        let scratch = TempDir::new().unwrap();
        let local = scratch.path().join("beos.zip");
        std::fs::write(&local, b"PK").unwrap();

        let storage = LocalStorage::new(scratch.path().join("store"), "http://localhost:8000/", "s3cret");
        storage.upload(&local, "submissions/abc/beos.zip").await.unwrap();

        let url = storage
            .create_signed_url("submissions/abc/beos.zip", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:8000/files/submissions/abc/beos.zip?expires="));

        let query = url.split_once('?').unwrap().1;
        let mut expires = 0;
        let mut token = "";
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("token", v) => token = v,
                _ => {}
            }
        }
        let path = storage.verify("submissions/abc/beos.zip", expires, token).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"PK");

        assert!(storage.verify("submissions/abc/beos.zip", expires, "bad").is_none());
        assert!(storage.verify("submissions/abc/beos.zip", 1, token).is_none());
    }

    #[tokio::test]
    async fn test_local_sign_missing_object() {
        let scratch = TempDir::new().unwrap();
        let storage = LocalStorage::new(scratch.path(), "http://localhost", "s");
        let result = storage
            .create_signed_url("nope.zip", Duration::from_secs(60))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }
}
