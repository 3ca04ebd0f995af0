pub mod pane_chrome;
pub mod progress_bar;
pub mod status_bar;
pub mod text;
pub mod text_input;
pub mod toast;
