//! Request/response calls against the pipeline API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use vibe_proto::protocol::{
    AuthStatusResponse, AuthUrlResponse, ErrorBody, HealthResponse, LibraryResponse,
    SearchRequest, SearchResponse, SearchResult, Stage, StartResponse, SyncRequest, VerifyReport,
};

use crate::error::ApiError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Base URL of the API, validated once at startup and shared read-only.
///
/// Always stored without a trailing slash so `join("/api/...")` never
/// produces `//`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase(Arc<str>);

impl ApiBase {
    pub fn parse(base: &str) -> Result<Self, ApiError> {
        let trimmed = base.trim().trim_end_matches('/');
        let url = Url::parse(trimmed).map_err(|e| ApiError::InvalidBase {
            base: base.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidBase {
                base: base.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }
        Ok(Self(Arc::from(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `path` must start with `/`.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }

    pub fn stream_url(&self, stage: Stage) -> String {
        self.join(stage.stream_path())
    }
}

impl fmt::Display for ApiBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a sync job reads its songs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSource {
    Playlist(String),
    LikedSongs,
}

/// One start call.  Each variant maps to exactly one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRequest {
    Sync(SyncSource),
    Download,
    Embed,
}

impl StartRequest {
    pub fn stage(&self) -> Stage {
        match self {
            StartRequest::Sync(_) => Stage::Sync,
            StartRequest::Download => Stage::Download,
            StartRequest::Embed => Stage::Embed,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            StartRequest::Sync(SyncSource::Playlist(_)) => "/api/sync",
            StartRequest::Sync(SyncSource::LikedSongs) => "/api/sync/liked",
            StartRequest::Download => "/api/download",
            StartRequest::Embed => "/api/embed",
        }
    }
}

/// Thin typed wrapper over `reqwest::Client`.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: ApiBase,
    http: reqwest::Client,
    /// `None` leaves request/response calls unbounded.
    request_timeout: Option<Duration>,
}

impl ApiClient {
    pub fn new(base: ApiBase, request_timeout: Option<Duration>) -> Result<Self, ApiError> {
        // No client-wide timeout: the same client carries long-lived
        // progress streams.  Request/response calls set one per request.
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("vibe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base,
            http,
            request_timeout,
        })
    }

    pub fn base(&self) -> &ApiBase {
        &self.base
    }

    /// The underlying client, for transports that stream from the same host.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn start(&self, request: &StartRequest) -> Result<StartResponse, ApiError> {
        let url = self.base.join(request.path());
        debug!("POST {}", url);
        let builder = self.http.post(&url);
        let builder = match request {
            StartRequest::Sync(SyncSource::Playlist(id)) => builder.json(&SyncRequest {
                playlist_id: id.trim().to_string(),
            }),
            _ => builder,
        };
        self.send_json(builder).await
    }

    /// Reconcile download bookkeeping with the files on disk.
    pub async fn verify_downloads(&self) -> Result<VerifyReport, ApiError> {
        let builder = self.http.post(self.base.join("/api/download/verify"));
        self.send_json(builder).await
    }

    pub async fn search(&self, query: &str, n_results: u32) -> Result<Vec<SearchResult>, ApiError> {
        let body = SearchRequest {
            query: query.to_string(),
            n_results,
        };
        let builder = self.http.post(self.base.join("/api/search")).json(&body);
        let response: SearchResponse = self.send_json(builder).await?;
        Ok(response.results)
    }

    pub async fn library(&self) -> Result<LibraryResponse, ApiError> {
        self.send_json(self.http.get(self.base.join("/api/library")))
            .await
    }

    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.send_json(self.http.get(self.base.join("/health"))).await
    }

    pub async fn auth_url(&self) -> Result<String, ApiError> {
        let response: AuthUrlResponse = self
            .send_json(self.http.get(self.base.join("/api/auth/url")))
            .await?;
        Ok(response.url)
    }

    /// Whether the server holds a Spotify token.  Any failure reads as
    /// "not authenticated".
    pub async fn auth_status(&self) -> bool {
        let builder = self.http.get(self.base.join("/api/auth/status"));
        match self.send_json::<AuthStatusResponse>(builder).await {
            Ok(status) => status.authenticated,
            Err(e) => {
                warn!("Auth status check failed: {}", e);
                false
            }
        }
    }

    /// Hand an OAuth authorization code to the server.
    pub async fn auth_callback(&self, code: &str) -> Result<(), ApiError> {
        let builder = self
            .http
            .get(self.base.join("/api/auth/callback"))
            .query(&[("code", code)]);
        let response = self.bounded(builder).send().await?;
        check_status(response).await.map(|_| ())
    }

    fn bounded(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.bounded(builder).send().await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        detail: error_detail(status, &text),
    })
}

fn error_detail(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message(),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}
