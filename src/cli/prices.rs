use super::ui;
use crate::core::asset::AssetType;
use crate::core::price::{PriceSnapshot, PriceTable};
use chrono::{DateTime, Local};
use comfy_table::Cell;

fn fetched_label(snapshot: &PriceSnapshot) -> String {
    let when = DateTime::from_timestamp_millis(snapshot.fetched_at)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    if snapshot.is_from_backup {
        format!("saved prices from {when}")
    } else {
        format!("fetched {when}")
    }
}

/// Market table for a snapshot: buy, sell and daily change per asset.
pub fn display_snapshot(snapshot: &PriceSnapshot) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Asset"),
        ui::header_cell("Buy"),
        ui::header_cell("Sell"),
        ui::header_cell("Change"),
    ]);

    for asset in AssetType::ALL.into_iter().filter(|a| !a.is_base()) {
        let buy = snapshot.buy_prices.as_ref().and_then(|t| t.get(asset));
        table.add_row(vec![
            Cell::new(asset.label()),
            ui::format_optional_cell(buy, |p| format!("{p:.2}")),
            ui::format_optional_cell(snapshot.sell_prices.get(asset), |p| format!("{p:.2}")),
            ui::change_cell(snapshot.changes.get(asset)),
        ]);
    }

    format!(
        "{} {}\n\n{}",
        ui::style_text(&format!("Prices ({})", AssetType::BASE.code()), ui::StyleType::Title),
        ui::style_text(&format!("({})", fetched_label(snapshot)), ui::StyleType::Subtle),
        table
    )
}

/// Last known sell prices, shown when no snapshot could be obtained.
pub fn display_known_prices(prices: &PriceTable) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Asset"), ui::header_cell("Last known")]);
    for asset in AssetType::ALL.into_iter().filter(|a| !a.is_base()) {
        table.add_row(vec![
            Cell::new(asset.label()),
            ui::format_optional_cell(prices.get(asset), |p| format!("{p:.2}")),
        ]);
    }
    format!(
        "{}\n\n{}",
        ui::style_text("Last known prices", ui::StyleType::Title),
        table
    )
}
