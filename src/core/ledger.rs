//! Lot-based holdings ledger.
//!
//! Every net increase creates a [`Lot`]; decreases consume lots newest-first.
//! All mutations are synchronous and either fully applied or not applied at all.
//! Each applied mutation returns a [`LedgerChange`] describing the rows that must be
//! written for durable storage to match.

use crate::core::asset::AssetType;
use crate::core::numeric::{self, EPSILON};
use crate::core::price::PriceTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// One discrete acquisition of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: String,
    pub asset: AssetType,
    pub amount: f64,
    pub description: Option<String>,
    pub acquired_at: DateTime<Utc>,
    /// Unit price in the base currency at acquisition, when known.
    pub price_at_acquisition: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub kind: HistoryKind,
    /// The lot added, or a synthetic lot carrying the total amount removed.
    pub lot: Lot,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
    /// Holdings of the asset before this entry.
    pub previous_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioState {
    /// In creation order, oldest first.
    pub lots: Vec<Lot>,
    pub prices: PriceTable,
    /// Most recent first.
    pub history: Vec<HistoryEntry>,
}

impl PortfolioState {
    pub fn total(&self, asset: AssetType) -> f64 {
        numeric::sum(self.lots_of(asset).map(|lot| lot.amount))
    }

    pub fn lots_of(&self, asset: AssetType) -> impl Iterator<Item = &Lot> {
        self.lots.iter().filter(move |lot| lot.asset == asset)
    }

    pub fn held_assets(&self) -> Vec<AssetType> {
        AssetType::ALL
            .into_iter()
            .filter(|asset| self.lots_of(*asset).next().is_some())
            .collect()
    }
}

/// Rows touched by one applied mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerChange {
    Appended {
        lot: Lot,
        entry: HistoryEntry,
        dropped_history: Vec<String>,
    },
    Reduced {
        removed_lots: Vec<String>,
        updated_lots: Vec<Lot>,
        entry: HistoryEntry,
        dropped_history: Vec<String>,
    },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Amount was not a positive finite number.
    InvalidAmount,
    /// New total equals the current one.
    NoChange,
    UnknownLot,
    /// The same operation is still settling.
    InProgress,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied(LedgerChange),
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Debug, Clone)]
pub struct Ledger {
    state: PortfolioState,
    history_limit: usize,
}

impl Ledger {
    pub fn new(state: PortfolioState, history_limit: usize) -> Self {
        Self {
            state,
            history_limit: history_limit.max(1),
        }
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn total(&self, asset: AssetType) -> f64 {
        self.state.total(asset)
    }

    /// Price table updates come only from accepted market snapshots.
    pub fn merge_prices(&mut self, prices: &PriceTable) {
        self.state.prices.merge_known(prices);
    }

    pub fn append(
        &mut self,
        asset: AssetType,
        amount: f64,
        description: Option<String>,
        price_at_acquisition: Option<f64>,
    ) -> Outcome {
        if !numeric::is_positive_amount(amount) {
            debug!(%asset, amount, "Ignoring append with invalid amount");
            return Outcome::Ignored(IgnoreReason::InvalidAmount);
        }
        let previous = self.total(asset);
        let now = Utc::now();
        let lot = Lot {
            id: new_id(),
            asset,
            amount,
            description: description.clone(),
            acquired_at: now,
            price_at_acquisition: price_at_acquisition.filter(|p| p.is_finite() && *p > 0.0),
        };
        let entry = HistoryEntry {
            id: new_id(),
            kind: HistoryKind::Add,
            lot: lot.clone(),
            timestamp: now,
            description,
            previous_amount: Some(previous),
        };

        self.state.lots.push(lot.clone());
        let dropped_history = self.record(entry.clone());
        debug!(%asset, amount, "Appended lot {}", lot.id);
        Outcome::Applied(LedgerChange::Appended {
            lot,
            entry,
            dropped_history,
        })
    }

    pub fn set_total(
        &mut self,
        asset: AssetType,
        new_total: f64,
        description: Option<String>,
        price_at_acquisition: Option<f64>,
    ) -> Outcome {
        if !new_total.is_finite() || new_total < 0.0 {
            return Outcome::Ignored(IgnoreReason::InvalidAmount);
        }
        let current = self.total(asset);
        if numeric::approx_eq(new_total, current) {
            return Outcome::Ignored(IgnoreReason::NoChange);
        }

        let delta = numeric::sub(new_total, current);
        if delta > 0.0 {
            return self.append(asset, delta, description, price_at_acquisition);
        }
        self.reduce_lifo(asset, -delta, description)
    }

    /// Consumes lots newest-first until `amount` is gone. `amount` never exceeds
    /// the current total because it is derived from it.
    fn reduce_lifo(&mut self, asset: AssetType, amount: f64, description: Option<String>) -> Outcome {
        let previous = self.total(asset);
        let mut remaining = amount.min(previous);
        let mut removed_lots = Vec::new();
        let mut updated_lots = Vec::new();

        for lot in self.state.lots.iter_mut().rev().filter(|l| l.asset == asset) {
            if remaining <= EPSILON {
                break;
            }
            if lot.amount <= remaining + EPSILON {
                remaining = numeric::sub(remaining, lot.amount);
                removed_lots.push(lot.id.clone());
            } else {
                lot.amount = numeric::sub(lot.amount, remaining);
                remaining = 0.0;
                updated_lots.push(lot.clone());
            }
        }
        self.state.lots.retain(|lot| !removed_lots.contains(&lot.id));

        let now = Utc::now();
        let entry = HistoryEntry {
            id: new_id(),
            kind: HistoryKind::Remove,
            lot: Lot {
                id: new_id(),
                asset,
                amount,
                description: description.clone(),
                acquired_at: now,
                price_at_acquisition: None,
            },
            timestamp: now,
            description,
            previous_amount: Some(previous),
        };
        let dropped_history = self.record(entry.clone());
        debug!(
            %asset,
            amount,
            removed = removed_lots.len(),
            updated = updated_lots.len(),
            "Reduced holdings newest-first"
        );
        Outcome::Applied(LedgerChange::Reduced {
            removed_lots,
            updated_lots,
            entry,
            dropped_history,
        })
    }

    pub fn remove_lot(&mut self, lot_id: &str) -> Outcome {
        let Some(index) = self.state.lots.iter().position(|lot| lot.id == lot_id) else {
            return Outcome::Ignored(IgnoreReason::UnknownLot);
        };
        let previous = self.total(self.state.lots[index].asset);
        let lot = self.state.lots.remove(index);
        let entry = HistoryEntry {
            id: new_id(),
            kind: HistoryKind::Remove,
            lot: lot.clone(),
            timestamp: Utc::now(),
            description: lot.description.clone(),
            previous_amount: Some(previous),
        };
        let dropped_history = self.record(entry.clone());
        Outcome::Applied(LedgerChange::Reduced {
            removed_lots: vec![lot.id],
            updated_lots: Vec::new(),
            entry,
            dropped_history,
        })
    }

    /// Clears lots and history. Prices are market data and stay.
    pub fn reset(&mut self) -> Outcome {
        self.state.lots.clear();
        self.state.history.clear();
        Outcome::Applied(LedgerChange::Reset)
    }

    /// Prepends an entry and returns the ids of entries dropped by the cap.
    fn record(&mut self, entry: HistoryEntry) -> Vec<String> {
        self.state.history.insert(0, entry);
        if self.state.history.len() <= self.history_limit {
            return Vec::new();
        }
        self.state
            .history
            .split_off(self.history_limit)
            .into_iter()
            .map(|e| e.id)
            .collect()
    }
}
