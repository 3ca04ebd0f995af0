//! TextInput — wraps tui-input for the one-line fields in panes (playlist
//! id, search query, auth code).

use ratatui::crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::theme::{C_INPUT_BG, C_INPUT_FG, C_MUTED, C_SECONDARY};

#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Changed,
    Submitted(String),
    Cancelled,
    None,
}

pub struct TextInput {
    input: Input,
    active: bool,
    prompt: &'static str,
    placeholder: String,
}

impl TextInput {
    pub fn new(prompt: &'static str, placeholder: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            active: false,
            prompt,
            placeholder: placeholder.into(),
        }
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn clear(&mut self) {
        self.input = Input::default();
    }

    pub fn text(&self) -> &str {
        self.input.value()
    }

    /// Handle a key event while active.
    ///
    /// Esc clears a non-empty field first and leaves editing on the second
    /// press.  Enter leaves editing and submits the trimmed text.
    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        match key.code {
            KeyCode::Esc => {
                if !self.input.value().is_empty() {
                    self.clear();
                    InputAction::Changed
                } else {
                    self.deactivate();
                    InputAction::Cancelled
                }
            }
            KeyCode::Enter => {
                self.deactivate();
                InputAction::Submitted(self.input.value().trim().to_string())
            }
            _ => {
                let before = self.input.value().to_string();
                self.input.handle_event(&Event::Key(key));
                if self.input.value() != before {
                    InputAction::Changed
                } else {
                    InputAction::None
                }
            }
        }
    }

    /// Render the input line into `area`.
    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        if area.width < 4 || area.height == 0 {
            return;
        }
        let prefix_w = self.prompt.chars().count() as u16 + 1;
        let scroll = self
            .input
            .visual_scroll(area.width.saturating_sub(prefix_w + 1) as usize);
        let value = self.input.value();

        let prompt = Span::styled(format!("{} ", self.prompt), Style::default().fg(C_SECONDARY));
        let body = if value.is_empty() {
            Span::styled(self.placeholder.as_str(), Style::default().fg(C_MUTED))
        } else {
            let visible: String = value.chars().skip(scroll).collect();
            Span::styled(visible, Style::default().fg(C_INPUT_FG))
        };

        let style = if self.active {
            Style::default().bg(C_INPUT_BG)
        } else {
            Style::default()
        };
        frame.render_widget(Paragraph::new(Line::from(vec![prompt, body])).style(style), area);

        if self.active {
            let cursor = self.input.visual_cursor().saturating_sub(scroll) as u16;
            let x = (area.x + prefix_w + cursor).min(area.x + area.width - 1);
            frame.set_cursor_position((x, area.y));
        }
    }
}
