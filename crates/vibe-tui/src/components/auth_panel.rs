//! AuthPanel — Spotify connection status and the authorization flow.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{style_muted, style_secondary, C_BADGE_ERR, C_BADGE_LIVE, C_BADGE_PENDING, C_ACCENT},
    widgets::{
        pane_chrome::{pane_chrome, Badge},
        text_input::{InputAction, TextInput},
    },
};

pub struct AuthPanel {
    code: TextInput,
}

impl Default for AuthPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthPanel {
    pub fn new() -> Self {
        Self {
            code: TextInput::new("code", "paste the code or the redirect URL"),
        }
    }
}

/// Accept either a bare code or the whole callback URL.
fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    let code = match input.split_once('?') {
        Some((_, query)) => query
            .split('&')
            .find_map(|pair| pair.strip_prefix("code="))?,
        None => input,
    };
    (!code.is_empty()).then(|| code.to_string())
}

impl Component for AuthPanel {
    fn id(&self) -> ComponentId {
        ComponentId::Auth
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }

        if self.code.is_active() {
            return match self.code.handle_key(key) {
                InputAction::Submitted(text) => {
                    self.code.clear();
                    match extract_code(&text) {
                        Some(code) => vec![Action::SubmitAuthCode(code)],
                        None => vec![Action::Notice("No authorization code found".to_string())],
                    }
                }
                _ => vec![],
            };
        }

        match key.code {
            KeyCode::Char('u') | KeyCode::Enter => vec![Action::FetchAuthUrl],
            KeyCode::Char('i') if !state.auth.exchanging => {
                self.code.activate();
                vec![]
            }
            KeyCode::Char('r') => vec![Action::RefreshAuth],
            _ => vec![],
        }
    }

    fn is_editing(&self) -> bool {
        self.code.is_active()
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let auth = &state.auth;
        let (badge_text, badge_color, status) = match auth.authenticated {
            _ if auth.exchanging => ("…", C_BADGE_PENDING, "Exchanging code…"),
            Some(true) => ("OK", C_BADGE_LIVE, "✓ Connected to Spotify"),
            Some(false) => ("OFF", C_BADGE_ERR, "Not connected. u for the login link"),
            None => ("?", C_BADGE_PENDING, "Checking…"),
        };
        let block = pane_chrome(
            "Spotify",
            Some('1'),
            focused,
            Some(Badge {
                text: badge_text,
                color: badge_color,
            }),
        );
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
            ])
            .split(inner);

        let status_style = match auth.authenticated {
            Some(true) if !auth.exchanging => Style::default().fg(C_BADGE_LIVE),
            _ => style_secondary(),
        };
        frame.render_widget(Paragraph::new(Line::styled(status, status_style)), rows[0]);

        if self.code.is_active() || auth.authenticated == Some(false) {
            self.code.draw(frame, rows[1]);
        }

        // Long URL; wrap rather than truncate so it can be copied whole.
        if let Some(url) = &auth.url {
            frame.render_widget(
                Paragraph::new(vec![
                    Line::styled("Open in a browser:", style_muted()),
                    Line::from(Span::styled(url.as_str(), Style::default().fg(C_ACCENT))),
                ])
                .wrap(Wrap { trim: false }),
                rows[2],
            );
        }
    }

    fn min_height(&self) -> u16 {
        5
    }
}
