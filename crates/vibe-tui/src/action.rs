//! Action enum — all user-initiated intents.

use vibe_client::StartRequest;
use vibe_proto::protocol::Stage;

/// Unique identifier for a focusable component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    Auth,
    Sync,
    Download,
    Embed,
    Search,
}

impl ComponentId {
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Sync => ComponentId::Sync,
            Stage::Download => ComponentId::Download,
            Stage::Embed => ComponentId::Embed,
        }
    }
}

/// All actions that can flow through the system.
/// Components produce Actions; the App dispatches them.
#[derive(Debug, Clone)]
pub enum Action {
    // ── Navigation ───────────────────────────────────────────────────────────
    FocusNext,
    FocusPrev,
    FocusPane(ComponentId),

    // ── Stages ───────────────────────────────────────────────────────────────
    Start(StartRequest),
    /// Close the stage's stream and forget the run.
    Reset(Stage),
    VerifyDownloads,

    // ── Search ───────────────────────────────────────────────────────────────
    Search(String),
    ClearSearch,

    // ── Auth ─────────────────────────────────────────────────────────────────
    FetchAuthUrl,
    RefreshAuth,
    SubmitAuthCode(String),

    // ── System ───────────────────────────────────────────────────────────────
    RefreshLibrary,
    /// Surface a local validation message without a round trip.
    Notice(String),
    Quit,
}
