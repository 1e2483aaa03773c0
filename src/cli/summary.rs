use super::ui;
use crate::core::analytics;
use crate::core::asset::AssetType;
use crate::core::ledger::PortfolioState;
use comfy_table::{Cell, CellAlignment};

/// Holdings table valued in `target`, with a total line underneath.
pub fn display_summary(state: &PortfolioState, target: AssetType) -> String {
    let held = state.held_assets();
    if held.is_empty() {
        return "No holdings yet. Add some with `goldfolio add <asset> <amount>`.".to_string();
    }

    let valuation = analytics::value_portfolio(state, target);
    let base = AssetType::BASE.code();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Asset"),
        ui::header_cell("Amount"),
        ui::header_cell(&format!("Price ({base})")),
        ui::header_cell(&format!("Value ({target})")),
        ui::header_cell(&format!("Avg cost ({base})")),
        ui::header_cell(&format!("Gain ({base})")),
    ]);

    for asset in held {
        let price = if asset.is_base() {
            Some(1.0)
        } else {
            state.prices.get(asset)
        };
        let value = valuation.by_asset.get(&asset).copied().flatten();
        table.add_row(vec![
            Cell::new(asset.label()),
            Cell::new(format!("{:.4}", state.total(asset))).set_alignment(CellAlignment::Right),
            ui::format_optional_cell(price, |p| format!("{p:.2}")),
            ui::format_optional_cell(value, |v| format!("{v:.2}")),
            ui::format_optional_cell(analytics::average_cost(state, asset), |c| format!("{c:.2}")),
            ui::signed_cell(analytics::unrealized_gain(state, asset), |g| format!("{g:+.2}")),
        ]);
    }

    let mut output = format!("{}\n\n", ui::style_text("Holdings", ui::StyleType::Title));
    output.push_str(&table.to_string());

    let total_style = if valuation.is_partial() {
        ui::StyleType::Warning
    } else {
        ui::StyleType::TotalValue
    };
    output.push_str(&format!(
        "\n\nTotal Value ({}): {}",
        ui::style_text(target.code(), ui::StyleType::TotalLabel),
        ui::style_text(&format!("{:.2}", valuation.total), total_style)
    ));
    if valuation.is_partial() {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                &format!(
                    "{} lot(s) left out because their price is unknown",
                    valuation.excluded.len()
                ),
                ui::StyleType::Subtle
            )
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::{DEFAULT_HISTORY_LIMIT, Ledger};
    use crate::core::price::PriceTable;

    #[test]
    fn test_summary_marks_unknown_prices() {
        let mut ledger = Ledger::new(PortfolioState::default(), DEFAULT_HISTORY_LIMIT);
        ledger.append(AssetType::GramGold, 2.0, None, Some(2000.0));
        ledger.append(AssetType::Silver, 10.0, None, None);
        let mut prices = PriceTable::new();
        prices.set(AssetType::GramGold, Some(2500.0));
        ledger.merge_prices(&prices);

        let output = console::strip_ansi_codes(&display_summary(ledger.state(), AssetType::Try))
            .to_string();
        assert!(output.contains("Gram Gold"));
        assert!(output.contains("5000.00"));
        assert!(output.contains("+1000.00"));
        assert!(output.contains("N/A"));
        assert!(output.contains("1 lot(s) left out"));
    }

    #[test]
    fn test_empty_summary() {
        let output = display_summary(&PortfolioState::default(), AssetType::Usd);
        assert!(output.starts_with("No holdings yet"));
    }
}
