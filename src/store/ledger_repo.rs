//! Durable rows for the ledger: one row per lot, one per history entry and one
//! for the price table. Each [`LedgerChange`] is written as a single batch.

use crate::core::cache::{KeyValueCollection, Store, WriteOp};
use crate::core::ledger::{HistoryEntry, LedgerChange, Lot, PortfolioState};
use crate::core::price::PriceTable;
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tracing::{debug, warn};

pub const COLLECTION: &str = "ledger";
const LOT_PREFIX: &str = "lot/";
const HISTORY_PREFIX: &str = "history/";
const PRICES_KEY: &[u8] = b"prices";

fn lot_key(id: &str) -> Vec<u8> {
    format!("{LOT_PREFIX}{id}").into_bytes()
}

fn history_key(id: &str) -> Vec<u8> {
    format!("{HISTORY_PREFIX}{id}").into_bytes()
}

pub struct LedgerRepository {
    collection: Arc<dyn KeyValueCollection>,
}

impl LedgerRepository {
    pub fn new(store: &dyn Store) -> Result<Self> {
        let collection = store
            .get_collection(COLLECTION, true, true)
            .ok_or_else(|| anyhow!("Failed to open collection: {COLLECTION}"))?;
        Ok(Self { collection })
    }

    pub fn with_collection(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    /// Reads the persisted state. Rows that no longer deserialize are skipped.
    pub async fn load_state(&self) -> Result<PortfolioState> {
        // Ids are UUIDv7, so key order is creation order.
        let lots: Vec<Lot> = self
            .collection
            .scan_prefix(LOT_PREFIX.as_bytes())
            .await
            .context("Failed to read lots")?
            .into_iter()
            .filter_map(|(key, value)| decode_row(&key, &value))
            .collect();

        let mut history: Vec<HistoryEntry> = self
            .collection
            .scan_prefix(HISTORY_PREFIX.as_bytes())
            .await
            .context("Failed to read history")?
            .into_iter()
            .filter_map(|(key, value)| decode_row(&key, &value))
            .collect();
        history.reverse();

        let prices = match self.collection.get(PRICES_KEY).await {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring unreadable stored prices: {}", e);
                PriceTable::new()
            }),
            None => PriceTable::new(),
        };

        debug!(
            lots = lots.len(),
            history = history.len(),
            "Loaded portfolio state"
        );
        Ok(PortfolioState {
            lots,
            prices,
            history,
        })
    }

    /// Replaces everything stored with `state` in one batch.
    pub async fn save_state(&self, state: &PortfolioState) -> Result<()> {
        let mut ops = self.row_removals().await?;
        for lot in &state.lots {
            ops.push(WriteOp::put(lot_key(&lot.id), serde_json::to_vec(lot)?));
        }
        for entry in &state.history {
            ops.push(WriteOp::put(
                history_key(&entry.id),
                serde_json::to_vec(entry)?,
            ));
        }
        ops.push(WriteOp::put(PRICES_KEY, serde_json::to_vec(&state.prices)?));
        self.collection.apply(ops).await
    }

    pub async fn save_prices(&self, prices: &PriceTable) -> Result<()> {
        self.collection
            .put(PRICES_KEY, &serde_json::to_vec(prices)?)
            .await
    }

    /// Writes the rows touched by one mutation as a single unit.
    pub async fn apply(&self, change: &LedgerChange) -> Result<()> {
        let ops = match change {
            LedgerChange::Appended {
                lot,
                entry,
                dropped_history,
            } => {
                let mut ops = vec![
                    WriteOp::put(lot_key(&lot.id), serde_json::to_vec(lot)?),
                    WriteOp::put(history_key(&entry.id), serde_json::to_vec(entry)?),
                ];
                ops.extend(dropped_history.iter().map(|id| WriteOp::remove(history_key(id))));
                ops
            }
            LedgerChange::Reduced {
                removed_lots,
                updated_lots,
                entry,
                dropped_history,
            } => {
                let mut ops: Vec<WriteOp> = removed_lots
                    .iter()
                    .map(|id| WriteOp::remove(lot_key(id)))
                    .collect();
                for lot in updated_lots {
                    ops.push(WriteOp::put(lot_key(&lot.id), serde_json::to_vec(lot)?));
                }
                ops.push(WriteOp::put(
                    history_key(&entry.id),
                    serde_json::to_vec(entry)?,
                ));
                ops.extend(dropped_history.iter().map(|id| WriteOp::remove(history_key(id))));
                ops
            }
            LedgerChange::Reset => self.row_removals().await?,
        };
        debug!(ops = ops.len(), "Persisting ledger change");
        self.collection.apply(ops).await
    }

    /// Deletes for every lot and history row; the price row is left alone.
    async fn row_removals(&self) -> Result<Vec<WriteOp>> {
        let mut ops = Vec::new();
        for prefix in [LOT_PREFIX, HISTORY_PREFIX] {
            for (key, _) in self.collection.scan_prefix(prefix.as_bytes()).await? {
                ops.push(WriteOp::Remove { key });
            }
        }
        Ok(ops)
    }
}

fn decode_row<T: serde::de::DeserializeOwned>(key: &[u8], value: &[u8]) -> Option<T> {
    match serde_json::from_slice(value) {
        Ok(row) => Some(row),
        Err(e) => {
            warn!(
                "Skipping unreadable ledger row {}: {}",
                String::from_utf8_lossy(key),
                e
            );
            None
        }
    }
}
