//! HTTP client for the hosted sync service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use budgetsync_common::{Error, Result};
use budgetsync_sync::state::encode_watermark;
use budgetsync_sync::{
    ConflictResolution, DownloadResponse, RemoteTransport, SyncBatch, UploadResponse,
};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ResolutionsBody<'a> {
    resolutions: &'a [ConflictResolution],
}

#[derive(Serialize)]
struct ErrorLogBody<'a> {
    context: &'a str,
    message: &'a str,
}

/// Remote transport speaking JSON over HTTPS.
pub struct HttpTransport {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for the service rooted at `endpoint`.
    ///
    /// # Errors
    /// - Endpoint is not an absolute http(s) URL
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        Self::with_timeout(endpoint, token, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom per-request timeout.
    pub fn with_timeout(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let base = parse_base(endpoint)?;
        let http = Client::builder()
            .user_agent(concat!("BudgetSync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, base, token })
    }

    /// Service root all request paths are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid request path {}: {}", path, e)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.url(path)?;
        debug!("POST {}", url);

        let response = self
            .authorize(self.http.post(url))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| send_error(path, e))?;

        check_status(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Failed to read response: {}", e)))?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn upload(&self, batch: &SyncBatch) -> Result<UploadResponse> {
        let response = self.post("sync", batch).await?;
        Self::read_json(response).await
    }

    async fn download(&self, since: Option<DateTime<Utc>>) -> Result<DownloadResponse> {
        let url = self.url("sync")?;
        debug!("GET {} (since {:?})", url, since);

        let mut request = self.authorize(self.http.get(url));
        if let Some(since) = since {
            request = request.query(&[("since", encode_watermark(since))]);
        }

        let response = request.send().await.map_err(|e| send_error("sync", e))?;
        let response = check_status(response).await?;
        Self::read_json(response).await
    }

    async fn resolve_conflicts(&self, resolutions: &[ConflictResolution]) -> Result<()> {
        self.post("sync/conflicts", &ResolutionsBody { resolutions })
            .await
            .map(|_| ())
    }

    async fn log_error(&self, context: &str, message: &str) -> Result<()> {
        self.post("logs/errors", &ErrorLogBody { context, message })
            .await
            .map(|_| ())
    }
}

/// Parse the endpoint so relative paths join below it.
fn parse_base(endpoint: &str) -> Result<Url> {
    let mut base = Url::parse(endpoint.trim())
        .map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", endpoint, e)))?;

    if !matches!(base.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Endpoint must be http or https: {}",
            endpoint
        )));
    }

    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

fn send_error(path: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("Request to {} timed out", path))
    } else if e.is_connect() || e.is_request() {
        Error::Network(format!("Request to {} failed: {}", path, e))
    } else {
        Error::Transport(format!("Request to {} failed: {}", path, e))
    }
}

/// Map a non-success status to an error. Server-side failures are transient.
pub fn classify_status(status: StatusCode, body: &str) -> Option<Error> {
    if status.is_success() {
        None
    } else if status.is_server_error() {
        Some(Error::Network(format!("Server error: {} - {}", status, body)))
    } else if status == StatusCode::NOT_FOUND {
        Some(Error::NotFound(format!("Endpoint not found: {}", body)))
    } else {
        Some(Error::Transport(format!("API error: {} - {}", status, body)))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body)
        .unwrap_or_else(|| Error::Transport(format!("Unexpected status {}", status))))
}
