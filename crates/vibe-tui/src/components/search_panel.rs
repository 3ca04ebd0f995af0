//! SearchPanel — natural-language query over the embedded library, results
//! ranked by similarity.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{List, ListItem, ListState, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;
use vibe_proto::protocol::SearchResult;

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{
        style_error, style_muted, style_secondary, style_selected, style_selected_focused,
        C_BADGE_ERR, C_BADGE_PENDING, C_MUTED, C_PRIMARY, C_SCORE,
    },
    widgets::{
        pane_chrome::{pane_chrome, Badge},
        text::{fit, truncate},
        text_input::{InputAction, TextInput},
    },
};

pub struct SearchPanel {
    query: TextInput,
    selected: usize,
    list_state: ListState,
}

impl Default for SearchPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchPanel {
    pub fn new() -> Self {
        Self {
            query: TextInput::new("search", "describe a vibe, e.g. late night drive (/ to edit)"),
            selected: 0,
            list_state: ListState::default(),
        }
    }

    fn select(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }
}

/// "87%" for a similarity of 0.87.
fn score_label(score: f64) -> String {
    format!("{:>3.0}%", (score * 100.0).clamp(0.0, 100.0))
}

fn result_line(result: &SearchResult, width: usize) -> Line<'static> {
    let score = score_label(result.similarity_score);
    let rest = width.saturating_sub(score.len() + 1);
    let mut tail = format!(" · {}", result.artist);
    if !result.album.is_empty() {
        tail.push_str(&format!(" · {}", result.album));
    }
    let title = truncate(&result.title, rest);
    let tail = truncate(&tail, rest.saturating_sub(title.width()));
    Line::from(vec![
        Span::styled(score, Style::default().fg(C_SCORE)),
        Span::raw(" "),
        Span::styled(title, Style::default().fg(C_PRIMARY)),
        Span::styled(tail, Style::default().fg(C_MUTED)),
    ])
}

impl Component for SearchPanel {
    fn id(&self) -> ComponentId {
        ComponentId::Search
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }

        if self.query.is_active() {
            return match self.query.handle_key(key) {
                InputAction::Submitted(text) if !text.is_empty() => {
                    self.selected = 0;
                    vec![Action::Search(text)]
                }
                _ => vec![],
            };
        }

        let len = state.search.results.len();
        match key.code {
            KeyCode::Char('/') | KeyCode::Char('i') => {
                self.query.activate();
                vec![]
            }
            KeyCode::Enter if !self.query.text().trim().is_empty() => {
                self.selected = 0;
                vec![Action::Search(self.query.text().trim().to_string())]
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.select(1, len);
                vec![]
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.select(-1, len);
                vec![]
            }
            KeyCode::Home | KeyCode::Char('g') => {
                self.selected = 0;
                vec![]
            }
            KeyCode::End | KeyCode::Char('G') => {
                self.selected = len.saturating_sub(1);
                vec![]
            }
            KeyCode::Char('c') => {
                self.query.clear();
                self.selected = 0;
                vec![Action::ClearSearch]
            }
            _ => vec![],
        }
    }

    fn is_editing(&self) -> bool {
        self.query.is_active()
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let search = &state.search;
        let badge = if search.searching {
            Some(Badge {
                text: "SEARCHING",
                color: C_BADGE_PENDING,
            })
        } else if search.error.is_some() {
            Some(Badge {
                text: "ERR",
                color: C_BADGE_ERR,
            })
        } else {
            None
        };
        let block = pane_chrome("Search", Some('5'), focused, badge);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height < 2 || inner.width < 8 {
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
        self.query.draw(frame, rows[0]);

        let width = inner.width as usize;
        let (summary, style) = if search.searching {
            (format!("Searching for \"{}\"…", search.query), style_secondary())
        } else if let Some(err) = &search.error {
            (err.clone(), style_error())
        } else if search.has_searched && search.results.is_empty() {
            ("No results found".to_string(), style_muted())
        } else if search.has_searched {
            (
                format!("{} results for \"{}\"", search.results.len(), search.query),
                style_secondary(),
            )
        } else {
            ("Search your embedded songs by mood or description".to_string(), style_muted())
        };
        frame.render_widget(
            Paragraph::new(Line::styled(truncate(&summary, width), style)),
            rows[1],
        );

        if search.results.is_empty() {
            return;
        }
        if self.selected >= search.results.len() {
            self.selected = search.results.len() - 1;
        }

        let items: Vec<ListItem> = search
            .results
            .iter()
            .map(|r| ListItem::new(result_line(r, width)))
            .collect();
        let highlight = if focused {
            style_selected_focused()
        } else {
            style_selected()
        };
        let list = List::new(items).highlight_style(highlight).highlight_symbol("");
        self.list_state.select(Some(self.selected));
        frame.render_stateful_widget(list, rows[2], &mut self.list_state);

        // Link of the selected song along the bottom edge when there is room.
        if focused && rows[2].height as usize > search.results.len() {
            if let Some(result) = search.results.get(self.selected) {
                let link_row = Rect {
                    y: rows[2].y + rows[2].height - 1,
                    height: 1,
                    ..rows[2]
                };
                frame.render_widget(
                    Paragraph::new(Line::styled(fit(&result.spotify_link, width), style_muted())),
                    link_row,
                );
            }
        }
    }

    fn min_height(&self) -> u16 {
        6
    }
}
