//! StagePanel — start button, live progress and the last outcome of one
//! pipeline stage.  The sync panel also owns the playlist field.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use vibe_client::{StageState, StartRequest, SyncSource};
use vibe_proto::protocol::{ChannelStatus, Stage};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{
        style_error, style_muted, style_secondary, C_BADGE_ERR, C_BADGE_LIVE, C_BADGE_PENDING,
        C_MUTED, C_PRIMARY, C_RUNNING,
    },
    widgets::{
        pane_chrome::{pane_chrome, Badge},
        progress_bar::draw_progress,
        text::truncate,
        text_input::{InputAction, TextInput},
    },
};

pub struct StagePanel {
    stage: Stage,
    number_key: char,
    playlist: Option<TextInput>,
}

impl StagePanel {
    pub fn new(stage: Stage, number_key: char) -> Self {
        let playlist = (stage == Stage::Sync)
            .then(|| TextInput::new("playlist", "Spotify playlist ID or URL (i to edit)"));
        Self {
            stage,
            number_key,
            playlist,
        }
    }

    fn start_request(&mut self) -> Option<Action> {
        match self.stage {
            Stage::Sync => {
                let input = self.playlist.as_mut()?;
                if input.text().trim().is_empty() {
                    input.activate();
                    return None;
                }
                Some(Action::Start(StartRequest::Sync(SyncSource::Playlist(
                    input.text().trim().to_string(),
                ))))
            }
            Stage::Download => Some(Action::Start(StartRequest::Download)),
            Stage::Embed => Some(Action::Start(StartRequest::Embed)),
        }
    }
}

fn verb(stage: Stage) -> &'static str {
    match stage {
        Stage::Sync => "Syncing tracks",
        Stage::Download => "Downloading",
        Stage::Embed => "Embedding",
    }
}

fn badge(st: &StageState) -> (&'static str, Color) {
    if st.starting {
        return ("STARTING", C_BADGE_PENDING);
    }
    match st.status {
        ChannelStatus::Idle => ("IDLE", C_MUTED),
        ChannelStatus::Connecting => ("CONNECTING", C_BADGE_PENDING),
        ChannelStatus::Connected => ("RUNNING", C_BADGE_LIVE),
        ChannelStatus::Complete => ("DONE", C_BADGE_LIVE),
        ChannelStatus::Error => ("ERR", C_BADGE_ERR),
    }
}

/// One-line summary of where the stage is.
fn status_line(stage: Stage, st: &StageState) -> (String, Style) {
    if st.starting {
        return (format!("Starting {}…", stage.label().to_lowercase()), style_secondary());
    }
    match (st.status, &st.message) {
        (ChannelStatus::Error, message) => (
            format!("✗ {}", message.as_deref().unwrap_or("stream failed")),
            style_error(),
        ),
        // A rejected start leaves the previous run's status in place, so
        // its message outranks an old "complete".
        (_, Some(message)) if !st.running => (format!("! {}", message), style_error()),
        (ChannelStatus::Connecting, _) => ("Connecting…".to_string(), style_secondary()),
        (ChannelStatus::Connected, _) => {
            (format!("{}…", verb(stage)), Style::default().fg(C_RUNNING))
        }
        (ChannelStatus::Complete, _) => (
            format!("✓ {} complete", stage.label()),
            Style::default().fg(C_RUNNING),
        ),
        (ChannelStatus::Idle, _) => ("Idle. Enter to start".to_string(), style_muted()),
    }
}

/// "✓ 9  ✗ 1  3 active"; empty when nothing was counted yet.
fn counters(st: &StageState) -> String {
    let progress = st.progress();
    let mut parts = Vec::new();
    if progress.success > 0 || progress.failed > 0 {
        parts.push(format!("✓ {}", progress.success));
        parts.push(format!("✗ {}", progress.failed));
    }
    if let Some(active) = progress.active.filter(|n| *n > 0) {
        parts.push(format!("{} active", active));
    }
    parts.join("  ")
}

impl Component for StagePanel {
    fn id(&self) -> ComponentId {
        ComponentId::for_stage(self.stage)
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }

        if let Some(input) = self.playlist.as_mut().filter(|i| i.is_active()) {
            return match input.handle_key(key) {
                InputAction::Submitted(text) if !text.is_empty() => {
                    if state.stage(self.stage).is_busy() {
                        return vec![];
                    }
                    vec![Action::Start(StartRequest::Sync(SyncSource::Playlist(text)))]
                }
                _ => vec![],
            };
        }

        let busy = state.stage(self.stage).is_busy();
        match key.code {
            KeyCode::Enter | KeyCode::Char('s') if !busy => {
                self.start_request().into_iter().collect()
            }
            KeyCode::Char('i') | KeyCode::Char('/') => {
                if let Some(input) = self.playlist.as_mut() {
                    input.activate();
                }
                vec![]
            }
            KeyCode::Char('l') if self.stage == Stage::Sync && !busy => {
                vec![Action::Start(StartRequest::Sync(SyncSource::LikedSongs))]
            }
            KeyCode::Char('v') if self.stage == Stage::Download && !busy => {
                vec![Action::VerifyDownloads]
            }
            KeyCode::Char('x') => vec![Action::Reset(self.stage)],
            _ => vec![],
        }
    }

    fn is_editing(&self) -> bool {
        self.playlist.as_ref().is_some_and(|i| i.is_active())
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let st = state.stage(self.stage);
        let (badge_text, badge_color) = badge(st);
        let block = pane_chrome(
            self.stage.label(),
            Some(self.number_key),
            focused,
            Some(Badge {
                text: badge_text,
                color: badge_color,
            }),
        );
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 || inner.width < 4 {
            return;
        }

        let mut constraints = Vec::new();
        if self.playlist.is_some() {
            constraints.push(Constraint::Length(1));
        }
        constraints.extend([
            Constraint::Length(1), // status
            Constraint::Length(1), // bar
            Constraint::Length(1), // counters
            Constraint::Min(0),    // song
        ]);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(inner);
        let mut rows = rows.iter().copied();

        if let Some(input) = &self.playlist {
            if let Some(row) = rows.next() {
                input.draw(frame, row);
            }
        }

        let width = inner.width as usize;
        let (status, status_style) = status_line(self.stage, st);
        if let Some(row) = rows.next() {
            frame.render_widget(
                Paragraph::new(Line::styled(truncate(&status, width), status_style)),
                row,
            );
        }

        let progress = st.progress();
        let show_bar = st.running || st.snapshot.is_some();
        if let Some(row) = rows.next() {
            if show_bar {
                let label = format!("{}/{}", progress.current, progress.total);
                draw_progress(frame, row, progress.percentage, Some(&label));
            }
        }

        if let Some(row) = rows.next() {
            let text = counters(st);
            frame.render_widget(Paragraph::new(Line::styled(text, style_secondary())), row);
        }

        if let (Some(row), Some(song)) = (rows.next(), progress.song.as_ref()) {
            if row.height > 0 {
                let text = if song.artist.is_empty() {
                    format!("♪ {}", song.title)
                } else {
                    format!("♪ {} — {}", song.title, song.artist)
                };
                frame.render_widget(
                    Paragraph::new(Line::from(Span::styled(
                        truncate(&text, width),
                        Style::default().fg(C_PRIMARY),
                    ))),
                    row,
                );
            }
        }
    }

    fn min_height(&self) -> u16 {
        if self.playlist.is_some() {
            8
        } else {
            7
        }
    }
}
