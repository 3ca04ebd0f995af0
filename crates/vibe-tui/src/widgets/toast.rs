//! Toasts — transient one-line notices stacked above the keys bar.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::Line,
    widgets::{Clear, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::theme::{C_TOAST_ERROR, C_TOAST_INFO, C_TOAST_SUCCESS, C_TOAST_WARNING};
use crate::widgets::text::truncate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    fn icon(self) -> &'static str {
        match self {
            Severity::Info => "·",
            Severity::Success => "✓",
            Severity::Warning => "!",
            Severity::Error => "✗",
        }
    }

    fn style(self) -> Style {
        let color = match self {
            Severity::Info => C_TOAST_INFO,
            Severity::Success => C_TOAST_SUCCESS,
            Severity::Warning => C_TOAST_WARNING,
            Severity::Error => C_TOAST_ERROR,
        };
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    }

    fn lifetime(self) -> Duration {
        match self {
            Severity::Info | Severity::Success => Duration::from_secs(3),
            Severity::Warning => Duration::from_secs(4),
            Severity::Error => Duration::from_secs(6),
        }
    }
}

struct Toast {
    message: String,
    severity: Severity,
    expires: Instant,
}

const SPINNER_FRAMES: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
const MAX_VISIBLE: usize = 4;

#[derive(Default)]
pub struct ToastManager {
    toasts: VecDeque<Toast>,
    /// Message and frame of the in-flight operation, if any.
    spinner: Option<(String, usize)>,
}

impl ToastManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        self.toasts.retain(|t| t.message != message);
        self.toasts.push_back(Toast {
            message,
            severity,
            expires: Instant::now() + severity.lifetime(),
        });
        while self.toasts.len() > MAX_VISIBLE * 2 {
            self.toasts.pop_front();
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Info);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Success);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Warning);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Error);
    }

    /// Show an animated toast until `resolve_spinner`.
    pub fn spinner(&mut self, message: impl Into<String>) {
        self.spinner = Some((message.into(), 0));
    }

    pub fn resolve_spinner(&mut self, message: impl Into<String>, severity: Severity) {
        self.spinner = None;
        self.push(message, severity);
    }

    /// Drop expired toasts and advance the spinner.  Returns whether
    /// anything on screen changed.
    pub fn tick(&mut self) -> bool {
        let now = Instant::now();
        let before = self.toasts.len();
        self.toasts.retain(|t| t.expires > now);
        if let Some((_, frame)) = self.spinner.as_mut() {
            *frame = (*frame + 1) % SPINNER_FRAMES.len();
            return true;
        }
        self.toasts.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty() && self.spinner.is_none()
    }

    /// Render toasts right-aligned, newest at the bottom of `area`.
    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        if self.is_empty() || area.height == 0 {
            return;
        }
        let max_width = (area.width / 2).clamp(30, 60).min(area.width) as usize;

        let mut rows: Vec<(String, Style)> = self
            .toasts
            .iter()
            .rev()
            .take(MAX_VISIBLE)
            .map(|t| (format!(" {} {} ", t.severity.icon(), t.message), t.severity.style()))
            .collect();
        if let Some((message, i)) = &self.spinner {
            rows.insert(
                0,
                (
                    format!(" {} {} ", SPINNER_FRAMES[*i], message),
                    Severity::Info.style(),
                ),
            );
        }

        let mut y = area.y + area.height;
        for (text, style) in rows {
            if y == area.y {
                break;
            }
            y -= 1;
            let text = truncate(&text, max_width);
            let w = text.width() as u16;
            let toast_area = Rect {
                x: area.x + area.width.saturating_sub(w + 1),
                y,
                width: w,
                height: 1,
            };
            frame.render_widget(Clear, toast_area);
            frame.render_widget(Paragraph::new(Line::styled(text, style)), toast_area);
        }
    }
}
