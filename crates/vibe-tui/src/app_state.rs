//! AppState — shared read-only data passed to all components during render/event.
//!
//! Components read this for controller state, but never mutate it.
//! The App event-loop is the only thing that writes to AppState.

use vibe_client::{SearchState, StageState};
use vibe_proto::protocol::{LibraryStats, Stage};

use crate::widgets::status_bar::InputMode;

#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
    /// `None` until the first status check returns.
    pub authenticated: Option<bool>,
    pub url: Option<String>,
    /// A code exchange is in flight.
    pub exchanging: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub api_base: String,
    pub server_up: Option<bool>,
    pub auth: AuthInfo,
    pub library: Option<LibraryStats>,
    pub sync: StageState,
    pub download: StageState,
    pub embed: StageState,
    pub search: SearchState,
    pub input_mode: InputMode,
}

impl AppState {
    pub fn stage(&self, stage: Stage) -> &StageState {
        match stage {
            Stage::Sync => &self.sync,
            Stage::Download => &self.download,
            Stage::Embed => &self.embed,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageState {
        match stage {
            Stage::Sync => &mut self.sync,
            Stage::Download => &mut self.download,
            Stage::Embed => &mut self.embed,
        }
    }
}
