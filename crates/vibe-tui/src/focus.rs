//! FocusRing — which pane receives keys; Tab walks the panes in order.

use crate::action::ComponentId;

pub struct FocusRing {
    panes: &'static [ComponentId],
    index: usize,
}

impl FocusRing {
    pub fn new(panes: &'static [ComponentId]) -> Self {
        Self { panes, index: 0 }
    }

    pub fn current(&self) -> Option<ComponentId> {
        self.panes.get(self.index).copied()
    }

    /// Move `delta` panes, wrapping at both ends.
    pub fn step(&mut self, delta: isize) {
        if self.panes.is_empty() {
            return;
        }
        let len = self.panes.len() as isize;
        self.index = (self.index as isize + delta).rem_euclid(len) as usize;
    }

    pub fn set(&mut self, id: ComponentId) {
        if let Some(pos) = self.panes.iter().position(|&p| p == id) {
            self.index = pos;
        }
    }

    pub fn is_focused(&self, id: ComponentId) -> bool {
        self.current() == Some(id)
    }
}
