//! Top header line and bottom keys bar.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::action::ComponentId;
use crate::app_state::AppState;
use crate::theme::{
    C_ACCENT, C_CONNECTING, C_MODE_INPUT, C_MODE_NORMAL, C_MUTED, C_PRIMARY, C_RUNNING,
    C_SECONDARY,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// A text field owns the keyboard.
    Input,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Input => "INPUT",
        }
    }

    pub fn color(self) -> ratatui::style::Color {
        match self {
            Self::Normal => C_MODE_NORMAL,
            Self::Input => C_MODE_INPUT,
        }
    }
}

/// " vibe ● http://localhost:8000   120 songs · 98 downloaded · 40 embedded"
pub fn draw_header(frame: &mut Frame, area: Rect, state: &AppState) {
    let dot = match state.server_up {
        Some(true) => Span::styled("●", Style::default().fg(C_RUNNING)),
        Some(false) => Span::styled("●", Style::default().fg(C_ACCENT)),
        None => Span::styled("○", Style::default().fg(C_CONNECTING)),
    };

    let mut spans = vec![
        Span::styled(
            " vibe ",
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        dot,
        Span::styled(format!(" {}", state.api_base), Style::default().fg(C_SECONDARY)),
    ];

    if let Some(stats) = state.library {
        spans.push(Span::styled(
            format!(
                "   {} songs · {} downloaded · {} embedded",
                stats.total, stats.downloaded, stats.embedded
            ),
            Style::default().fg(C_MUTED),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, mode: InputMode, focused: Option<ComponentId>) {
    let keys = match mode {
        InputMode::Input => " type  Enter submit  Esc clear/close",
        InputMode::Normal => match focused {
            Some(ComponentId::Auth) => {
                " u auth url  i paste code  r refresh  Tab/1-5 panes  q quit"
            }
            Some(ComponentId::Sync) => {
                " i playlist  Enter start  l liked songs  x reset  Tab/1-5 panes  q quit"
            }
            Some(ComponentId::Download) => {
                " Enter start  v verify files  x reset  Tab/1-5 panes  q quit"
            }
            Some(ComponentId::Embed) => " Enter start  x reset  Tab/1-5 panes  q quit",
            Some(ComponentId::Search) => {
                " / query  ↑↓/jk select  c clear  Tab/1-5 panes  q quit"
            }
            None => " Tab/1-5 panes  q quit",
        },
    };

    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default()
                .fg(mode.color())
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(keys, Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
