pub mod auth_panel;
pub mod search_panel;
pub mod stage_panel;
