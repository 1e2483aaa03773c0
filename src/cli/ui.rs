use crate::core::notice::Notice;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Text roles used across the views.
pub enum StyleType {
    Title,
    TotalLabel,
    TotalValue,
    Warning,
    Error,
    Subtle,
}

pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::TotalLabel => style(text).bold(),
        StyleType::TotalValue => style(text).green().bold(),
        StyleType::Warning => style(text).yellow(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Rounded UTF-8 table that wraps to the terminal width.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Right-aligned value, or a grey "N/A" for unknown values.
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(
        Cell::new("N/A")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        |v| Cell::new(format_fn(v)).set_alignment(CellAlignment::Right),
    )
}

/// Signed value, green when non-negative and red otherwise. `None` is "N/A".
pub fn signed_cell(value: Option<f64>, format_fn: impl Fn(f64) -> String) -> Cell {
    match value {
        Some(v) => Cell::new(format_fn(v))
            .fg(if v >= 0.0 { Color::Green } else { Color::Red })
            .set_alignment(CellAlignment::Right),
        None => format_optional_cell(None::<f64>, format_fn),
    }
}

pub fn change_cell(change: Option<f64>) -> Cell {
    signed_cell(change, |c| format!("{c:.2}%"))
}

pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(template);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn format_notices(notices: &[Notice]) -> String {
    notices
        .iter()
        .map(|notice| {
            let (marker, style_type) = match notice {
                Notice::FetchFailed { .. } => ("x", StyleType::Error),
                _ => ("!", StyleType::Warning),
            };
            format!("{marker} {}", style_text(&notice.to_string(), style_type))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_cells_render_na() {
        assert_eq!(format_optional_cell(None::<f64>, |v| format!("{v:.2}")).content(), "N/A");
        assert_eq!(change_cell(None).content(), "N/A");
        assert_eq!(change_cell(Some(-1.234)).content(), "-1.23%");
    }

    #[test]
    fn test_notices_are_listed_one_per_line() {
        let text = format_notices(&[
            Notice::NoNetwork,
            Notice::FetchFailed {
                reason: "timeout".into(),
            },
        ]);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("timeout"));
    }
}
