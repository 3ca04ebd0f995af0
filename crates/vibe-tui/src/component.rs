//! Component trait — the interface every UI panel implements.
//!
//! - Components own their local state (inputs, selection) and render themselves.
//! - Components receive `AppState` (read-only) for data they don't own.
//! - Components produce `Vec<Action>`; they never call controllers directly.

use ratatui::crossterm::event::KeyEvent;
use ratatui::{layout::Rect, Frame};

use crate::action::{Action, ComponentId};
use crate::app_state::AppState;

pub trait Component {
    fn id(&self) -> ComponentId;

    /// Handle a key event. Only called when this component has focus.
    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action>;

    /// True while a text field owns the keyboard; global keys are suspended.
    fn is_editing(&self) -> bool {
        false
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState);

    /// The minimum height required to render meaningfully.
    fn min_height(&self) -> u16 {
        3
    }
}
