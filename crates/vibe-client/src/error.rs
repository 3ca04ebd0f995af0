//! Error types for the client.
//!
//! `ChannelError` is stored inside `ChannelState`, which is broadcast through
//! `watch` channels, so it is `Clone + PartialEq` and carries rendered
//! messages rather than source errors.

use std::time::Duration;

use thiserror::Error;
use vibe_proto::protocol::Stage;

/// Failure of a request/response call against the API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API base {base:?}: {reason}")]
    InvalidBase { base: String, reason: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response; `detail` is the server's `{"detail": ...}` text when
    /// the body carried one.
    #[error("server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Text suitable for a banner: the server's own detail when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { detail, .. } if !detail.is_empty() => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Why a progress channel ended in `ChannelStatus::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("stream connection failed: {0}")]
    Transport(String),

    #[error("stream endpoint returned HTTP {status}")]
    Http { status: u16 },

    /// The server closed the stream without sending `complete`.
    #[error("stream closed before completion")]
    ClosedEarly,

    #[error("no data received for {}s", .0.as_secs())]
    IdleTimeout(Duration),

    /// The server sent an `error` event.
    #[error("{0}")]
    Server(String),
}

/// Why `StageController::start` did not start a job.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0} is already running")]
    AlreadyRunning(Stage),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{requested} request sent to the {stage} controller")]
    WrongStage { stage: Stage, requested: Stage },

    /// The server answered but did not start a job (`no_pending` etc).
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}
