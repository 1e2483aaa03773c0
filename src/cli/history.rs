use super::ui;
use crate::core::ledger::{HistoryKind, PortfolioState};
use chrono::Local;
use comfy_table::{Cell, CellAlignment, Color};

/// Newest entries first, at most `limit` of them.
pub fn display_history(state: &PortfolioState, limit: usize) -> String {
    if state.history.is_empty() {
        return "No history yet.".to_string();
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("When"),
        ui::header_cell(""),
        ui::header_cell("Asset"),
        ui::header_cell("Amount"),
        ui::header_cell("Unit cost"),
        ui::header_cell("Note"),
    ]);

    for entry in state.history.iter().take(limit) {
        let (sign, color) = match entry.kind {
            HistoryKind::Add => ("+", Color::Green),
            HistoryKind::Remove => ("-", Color::Red),
        };
        table.add_row(vec![
            Cell::new(
                entry
                    .timestamp
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M"),
            ),
            Cell::new(sign).fg(color),
            Cell::new(entry.lot.asset.label()),
            Cell::new(format!("{:.4}", entry.lot.amount)).set_alignment(CellAlignment::Right),
            ui::format_optional_cell(entry.lot.price_at_acquisition, |p| format!("{p:.2}")),
            Cell::new(entry.description.as_deref().unwrap_or("")),
        ]);
    }

    let mut output = table.to_string();
    let hidden = state.history.len().saturating_sub(limit);
    if hidden > 0 {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(&format!("{hidden} older entries not shown"), ui::StyleType::Subtle)
        ));
    }
    output
}
