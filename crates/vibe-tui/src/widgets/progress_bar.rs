//! Smooth Unicode progress bar widget.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::{C_MUTED, C_RUNNING, C_SECONDARY};

const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

/// Render a bar for `percentage` (0..=100) with an optional counter label
/// such as `10/50` on the right.
pub fn draw_progress(frame: &mut Frame, area: Rect, percentage: f64, label: Option<&str>) {
    if area.width < 4 || area.height == 0 {
        return;
    }

    let pct_label = format!("{:>3.0}%", percentage.clamp(0.0, 100.0));
    let right_label = label.unwrap_or_default();
    let label_w = (pct_label.len() + right_label.chars().count() + 2) as u16;
    let bar_w = area.width.saturating_sub(label_w).max(4) as usize;

    let mut spans = vec![
        Span::styled(format!("{} ", pct_label), Style::default().fg(C_SECONDARY)),
        Span::styled(bar(percentage, bar_w), Style::default().fg(C_RUNNING)),
    ];
    if !right_label.is_empty() {
        spans.push(Span::styled(
            format!(" {}", right_label),
            Style::default().fg(C_MUTED),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// `width` cells of bar, 8 sub-steps per cell.
fn bar(percentage: f64, width: usize) -> String {
    let eighths = (percentage.clamp(0.0, 100.0) / 100.0 * width as f64 * 8.0) as usize;
    let full_blocks = eighths / 8;
    let partial = eighths % 8;

    let mut bar = String::with_capacity(width * 3);
    for _ in 0..full_blocks.min(width) {
        bar.push('█');
    }
    if full_blocks < width {
        bar.push(BLOCKS[partial]);
        for _ in (full_blocks + 1)..width {
            bar.push(' ');
        }
    }
    bar
}
