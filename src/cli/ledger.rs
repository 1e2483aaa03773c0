use super::ui;
use crate::core::ledger::{IgnoreReason, LedgerChange, Outcome};

/// One line telling the user what a mutation did, or why it did nothing.
pub fn describe_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Applied(LedgerChange::Appended { lot, .. }) => format!(
            "Added {} {} (lot {})",
            lot.amount,
            lot.asset.label(),
            ui::style_text(&lot.id, ui::StyleType::Subtle)
        ),
        Outcome::Applied(LedgerChange::Reduced { entry, .. }) => format!(
            "Removed {} {}",
            entry.lot.amount,
            entry.lot.asset.label()
        ),
        Outcome::Applied(LedgerChange::Reset) => "Cleared all holdings and history".to_string(),
        Outcome::Ignored(reason) => {
            let text = match reason {
                IgnoreReason::InvalidAmount => "Amount must be a positive number, nothing changed",
                IgnoreReason::NoChange => "Total is already at that amount, nothing changed",
                IgnoreReason::UnknownLot => "No lot with that id",
                IgnoreReason::InProgress => "The same change is still being saved, try again",
            };
            ui::style_text(text, ui::StyleType::Warning)
        }
    }
}
