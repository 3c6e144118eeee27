//! Download-ready notifications.

use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

const POSTMARK_API_URL: &str = "https://api.postmarkapp.com";

/// Errors from sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Postmark rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Content of a "your files are ready" message.
#[derive(Debug, Clone)]
pub struct DownloadReady {
    pub to_name: String,
    pub event_name: Option<String>,
    pub download_url: String,
    pub beo_count: usize,
    pub expiry_days: u64,
}

impl DownloadReady {
    pub fn subject(&self) -> String {
        match &self.event_name {
            Some(event) => format!("Your BEO files are ready - {}", event),
            None => "Your BEO files are ready".to_string(),
        }
    }

    pub fn render_html(&self) -> Result<String, askama::Error> {
        DownloadReadyHtml { message: self }.render()
    }

    pub fn render_text(&self) -> Result<String, askama::Error> {
        DownloadReadyText { message: self }.render()
    }
}

#[derive(Template)]
#[template(path = "download_ready.html")]
struct DownloadReadyHtml<'a> {
    message: &'a DownloadReady,
}

#[derive(Template)]
#[template(path = "download_ready.txt")]
struct DownloadReadyText<'a> {
    message: &'a DownloadReady,
}

/// Delivers download links to submitters.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, message: &DownloadReady) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text_body: &'a str,
    html_body: &'a str,
}

/// Sends mail through the Postmark API.
#[derive(Clone)]
pub struct PostmarkNotifier {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
}

impl PostmarkNotifier {
    pub fn new(api_key: &str, from_email: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: POSTMARK_API_URL.to_string(),
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
        }
    }

    /// Point at a different API endpoint.
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Notifier for PostmarkNotifier {
    async fn send(&self, to: &str, message: &DownloadReady) -> Result<(), NotifyError> {
        let subject = message.subject();
        let text_body = message.render_text()?;
        let html_body = message.render_html()?;

        let response = self
            .client
            .post(format!("{}/email", self.api_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Postmark-Server-Token", &self.api_key)
            .json(&PostmarkEmail {
                from: &self.from_email,
                to,
                subject: &subject,
                text_body: &text_body,
                html_body: &html_body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Sent download link to {}", to);
        Ok(())
    }
}

/// Logs messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, message: &DownloadReady) -> Result<(), NotifyError> {
        warn!(
            "Email not configured; download link for {} ({}): {}",
            to,
            message.subject(),
            message.download_url
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(event: Option<&str>) -> DownloadReady {
        DownloadReady {
            to_name: "Dana <Ops>".to_string(),
            event_name: event.map(str::to_string),
            download_url: "https://dl.example/x?token=a&b=c".to_string(),
            beo_count: 7,
            expiry_days: 30,
        }
    }

    #[test]
    fn test_subject() {
        assert_eq!(message(None).subject(), "Your BEO files are ready");
        assert_eq!(
            message(Some("Spring Gala")).subject(),
            "Your BEO files are ready - Spring Gala"
        );
    }

    #[test]
    fn test_render_html_escapes() {
        let html = message(Some("Spring Gala")).render_html().unwrap();
        assert!(html.contains("Hi Dana &lt;Ops&gt;,"));
        assert!(html.contains("for Spring Gala"));
        assert!(html.contains("7 individual BEO file(s)"));
        assert!(html.contains("expire in 30 days"));
    }

    #[test]
    fn test_render_text() {
        let text = message(None).render_text().unwrap();
        assert!(text.contains("Hi Dana <Ops>,"));
        assert!(text.contains("Download your files: https://dl.example/x?token=a&b=c"));
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send("a@example.com", &message(None)).await.is_ok());
    }
}
