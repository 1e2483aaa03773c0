pub mod api;
pub mod page;
pub mod util;

pub use api::MarketApiProvider;
pub use page::MarketPageProvider;
pub use util::{ConnectivityProbe, HttpConnectivity, RetryPolicy};

use crate::core::asset::AssetType;
use crate::core::error::PriceError;
use crate::core::price::{PriceChangeTable, PriceSnapshot, PriceTable};

/// Collects per-asset quotes parsed from one response.
///
/// Unparsable or negative fields are stored as unknown; the base currency stays at
/// 1 (prices) and 0 (change) whatever the response says.
#[derive(Debug, Default)]
pub(crate) struct SnapshotBuilder {
    sell: PriceTable,
    buy: PriceTable,
    changes: PriceChangeTable,
}

impl SnapshotBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(
        &mut self,
        asset: AssetType,
        buy: Option<f64>,
        sell: Option<f64>,
        change: Option<f64>,
    ) {
        self.buy.set(asset, buy);
        self.sell.set(asset, sell);
        self.changes.set(asset, change);
    }

    /// Fails with [`PriceError::NoValidPrice`] when not a single sell price parsed.
    pub(crate) fn finish(self, provider: &str, fetched_at: i64) -> Result<PriceSnapshot, PriceError> {
        if self.sell.known_count() == 0 {
            return Err(PriceError::NoValidPrice {
                provider: provider.to_string(),
            });
        }
        Ok(PriceSnapshot {
            sell_prices: self.sell,
            buy_prices: (self.buy.known_count() > 0).then_some(self.buy),
            changes: self.changes,
            fetched_at,
            is_from_backup: false,
        })
    }
}
