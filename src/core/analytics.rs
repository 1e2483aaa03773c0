//! Provides valuation and cost-basis calculations over a portfolio state.
//!
//! Unknown prices never count as zero: a lot whose value cannot be computed is
//! left out of the totals and reported in [`Valuation::excluded`].
use crate::core::asset::AssetType;
use crate::core::ledger::{HistoryKind, Lot, PortfolioState};
use crate::core::numeric::{self, EPSILON};
use crate::core::price::PriceTable;
use std::collections::BTreeMap;
use tracing::debug;

/// Value of the holdings expressed in one target asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub target: AssetType,
    /// Sum over the lots that could be valued.
    pub total: f64,
    /// Per held asset; `None` when none of its lots could be valued.
    pub by_asset: BTreeMap<AssetType, Option<f64>>,
    /// Ids of lots left out because a price in their chain is unknown.
    pub excluded: Vec<String>,
}

impl Valuation {
    pub fn is_partial(&self) -> bool {
        !self.excluded.is_empty()
    }
}

/// Value of one lot in `target` units, or `None` when a needed price is unknown.
pub fn lot_value(lot: &Lot, prices: &PriceTable, target: AssetType) -> Option<f64> {
    let unit_price = if lot.asset.is_base() {
        1.0
    } else {
        prices.get(lot.asset)?
    };
    let in_base = numeric::mul(lot.amount, unit_price);
    if target.is_base() {
        return Some(in_base);
    }
    let target_price = prices.get(target)?;
    numeric::div(in_base, target_price)
}

pub fn value_portfolio(state: &PortfolioState, target: AssetType) -> Valuation {
    let mut valuation = Valuation {
        target,
        total: 0.0,
        by_asset: BTreeMap::new(),
        excluded: Vec::new(),
    };

    for lot in &state.lots {
        let slot = valuation.by_asset.entry(lot.asset).or_insert(None);
        match lot_value(lot, &state.prices, target) {
            Some(value) => {
                *slot = Some(numeric::add(slot.unwrap_or(0.0), value));
                valuation.total = numeric::add(valuation.total, value);
            }
            None => {
                debug!(lot = %lot.id, asset = %lot.asset, %target, "Price unknown, excluding lot from valuation");
                valuation.excluded.push(lot.id.clone());
            }
        }
    }

    valuation
}

/// Average base-currency cost of the units currently held.
///
/// Walks history newest-first, attributing cost to the adds that still make up
/// the holdings. A removal means older adds must cover more, so it raises the
/// amount left to account for. The result is the cost-weighted average over the
/// units attributed. Returns `None` when an add that is needed has no recorded
/// price, or when history runs out before the holdings are covered.
pub fn average_cost(state: &PortfolioState, asset: AssetType) -> Option<f64> {
    let held = state.total(asset);
    if held <= EPSILON {
        return None;
    }

    let mut remaining = held;
    let mut covered = 0.0;
    let mut cost = 0.0;
    for entry in state.history.iter().filter(|e| e.lot.asset == asset) {
        if remaining <= EPSILON {
            break;
        }
        match entry.kind {
            HistoryKind::Remove => remaining = numeric::add(remaining, entry.lot.amount),
            HistoryKind::Add => {
                let Some(price) = entry.lot.price_at_acquisition else {
                    debug!(%asset, entry = %entry.id, "Add without acquisition price, cost unknown");
                    return None;
                };
                let taken = entry.lot.amount.min(remaining);
                cost = numeric::add(cost, numeric::mul(taken, price));
                covered = numeric::add(covered, taken);
                remaining = numeric::sub(remaining, taken);
            }
        }
    }

    if remaining > EPSILON {
        debug!(%asset, remaining, "History does not cover current holdings");
        return None;
    }
    numeric::div(cost, covered)
}

/// Current base-currency value of an asset's holdings minus what they cost.
pub fn unrealized_gain(state: &PortfolioState, asset: AssetType) -> Option<f64> {
    let avg = average_cost(state, asset)?;
    let held = state.total(asset);
    let mut value = 0.0;
    for lot in state.lots_of(asset) {
        value = numeric::add(value, lot_value(lot, &state.prices, AssetType::BASE)?);
    }
    Some(numeric::sub(value, numeric::mul(avg, held)))
}
