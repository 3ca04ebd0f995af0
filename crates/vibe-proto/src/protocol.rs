use serde::{Deserialize, Serialize};
use std::fmt;

/// Named server-push event carrying a JSON `ProgressSnapshot`.
pub const EVENT_PROGRESS: &str = "progress";
/// Named server-push event that ends a stream normally.
pub const EVENT_COMPLETE: &str = "complete";
/// Named server-push event that ends a stream with `{"message": ...}`.
pub const EVENT_ERROR: &str = "error";

/// Status value the server returns when a stage job was accepted.
pub const STATUS_STARTED: &str = "started";

/// One phase of the pipeline.  Each stage is started and streamed
/// independently of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Sync,
    Download,
    Embed,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Sync, Stage::Download, Stage::Embed];

    /// Path of the stage's text/event-stream endpoint, relative to the API base.
    pub fn stream_path(self) -> &'static str {
        match self {
            Stage::Sync => "/api/sync/stream",
            Stage::Download => "/api/download/stream",
            Stage::Embed => "/api/embed/stream",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Sync => "Sync",
            Stage::Download => "Download",
            Stage::Embed => "Embed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Client-side status of one progress channel.
///
/// Transitions:
///   Idle -> Connecting -> Connected -> Complete | Error
///   any  -> Connecting (a fresh connect supersedes)
///   any  -> Idle       (explicit close)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Idle, // no connection
    Connecting, // request sent, waiting for the response head
    Connected,  // stream open, events flowing
    Complete,   // server sent `complete`
    Error,      // transport failure, server `error` event, or early close
}

impl ChannelStatus {
    /// `Complete` and `Error` end a channel until the next connect.
    pub fn is_terminal(self) -> bool {
        matches!(self, ChannelStatus::Complete | ChannelStatus::Error)
    }

    /// True while a connection may still deliver events.
    pub fn is_live(self) -> bool {
        matches!(self, ChannelStatus::Connecting | ChannelStatus::Connected)
    }

    pub fn label(self) -> &'static str {
        match self {
            ChannelStatus::Idle => "idle",
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Complete => "complete",
            ChannelStatus::Error => "error",
        }
    }
}

/// The song a stage is currently working on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SongRef {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_id: Option<String>,
}

/// Payload of a `progress` event.  Every event replaces the previous
/// snapshot wholesale; counters the stage does not report default to 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub current: u64,
    /// 0 until the server knows the real count.
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub failed: u64,
    /// Download stage only: number of transfers in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<u64>,
    #[serde(default)]
    pub song: Option<SongRef>,
}

/// Payload of a server-sent `error` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamErrorPayload {
    pub message: String,
}

// ── request / response bodies ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub playlist_id: String,
}

/// Response of every stage start call (`/api/sync`, `/api/sync/liked`,
/// `/api/download`, `/api/embed`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StartResponse {
    pub status: String,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl StartResponse {
    pub fn is_started(&self) -> bool {
        self.status == STATUS_STARTED
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub n_results: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResult {
    pub spotify_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_art_url: String,
    pub spotify_link: String,
    /// Cosine similarity in `[0, 1]`, as ranked by the server.
    pub similarity_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SongSummary {
    pub spotify_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(default)]
    pub album_art_url: String,
    #[serde(default)]
    pub spotify_link: String,
    /// pending | downloading | done | failed
    pub download_status: String,
    /// pending | processing | stored | failed
    pub embed_status: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct LibraryStats {
    pub total: u64,
    pub downloaded: u64,
    pub embedded: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LibraryResponse {
    pub songs: Vec<SongSummary>,
    pub stats: LibraryStats,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct VerifyFixed {
    pub marked_done: u64,
    pub marked_pending: u64,
}

/// Result of reconciling download bookkeeping with the files on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VerifyReport {
    pub status: String,
    #[serde(default)]
    pub fixed: VerifyFixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body returned with non-2xx responses: `{"detail": ...}`.  `detail`
/// is usually a string but validation failures send a list of objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
