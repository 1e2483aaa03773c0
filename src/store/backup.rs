//! Durable single-slot copy of the last accepted price snapshot.
//!
//! Reads are fail-closed: anything missing, malformed, out of range or older than
//! [`MAX_BACKUP_AGE_HOURS`] is rejected rather than repaired.

use crate::core::cache::{KeyValueCollection, Store};
use crate::core::error::PriceError;
use crate::core::price::{PriceChangeTable, PriceSnapshot, PriceTable};
use anyhow::{Result, anyhow};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const COLLECTION: &str = "price_backup";
const SLOT_KEY: &[u8] = b"latest";

pub const MAX_BACKUP_AGE_HOURS: i64 = 24;
/// Tolerated clock skew for timestamps in the future.
const MAX_FUTURE_SKEW_MINUTES: i64 = 5;

#[derive(Serialize)]
struct StoredSnapshotRef<'a> {
    sell: &'a PriceTable,
    buy: Option<&'a PriceTable>,
    changes: &'a PriceChangeTable,
    fetched_at: i64,
}

/// `buy` stays raw so a broken buy table only drops the buy prices.
#[derive(Deserialize)]
struct StoredSnapshot {
    sell: PriceTable,
    #[serde(default)]
    buy: Option<serde_json::Value>,
    changes: PriceChangeTable,
    fetched_at: i64,
}

pub struct PriceBackupStore {
    collection: Arc<dyn KeyValueCollection>,
}

impl PriceBackupStore {
    pub fn new(store: &dyn Store) -> Result<Self> {
        let collection = store
            .get_collection(COLLECTION, true, true)
            .ok_or_else(|| anyhow!("Failed to open collection: {COLLECTION}"))?;
        Ok(Self { collection })
    }

    pub fn with_collection(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    /// Overwrites the slot with one write. Failures are [`PriceError::Storage`].
    pub async fn save(&self, snapshot: &PriceSnapshot) -> Result<(), PriceError> {
        let stored = StoredSnapshotRef {
            sell: &snapshot.sell_prices,
            buy: snapshot.buy_prices.as_ref(),
            changes: &snapshot.changes,
            fetched_at: snapshot.fetched_at,
        };
        let bytes =
            serde_json::to_vec(&stored).map_err(|e| PriceError::Storage(e.to_string()))?;
        self.collection.put(SLOT_KEY, &bytes).await?;
        debug!(fetched_at = snapshot.fetched_at, "Saved price backup");
        Ok(())
    }

    /// The stored snapshot if it is present, valid and fresh.
    pub async fn load(&self) -> Option<PriceSnapshot> {
        match self.load_checked(Utc::now().timestamp_millis()).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!("Price backup not usable: {}", e);
                None
            }
        }
    }

    /// Like [`load`](Self::load) but says why a backup was rejected.
    pub async fn load_checked(&self, now_ms: i64) -> Result<PriceSnapshot, PriceError> {
        let bytes = self
            .collection
            .get(SLOT_KEY)
            .await
            .ok_or_else(|| PriceError::InvalidBackup("no backup stored".to_string()))?;
        decode(&bytes, now_ms)
    }

}

fn decode(bytes: &[u8], now_ms: i64) -> Result<PriceSnapshot, PriceError> {
    let stored: StoredSnapshot =
        serde_json::from_slice(bytes).map_err(|e| PriceError::InvalidBackup(e.to_string()))?;

    let age = now_ms
        .checked_sub(stored.fetched_at)
        .and_then(Duration::try_milliseconds)
        .ok_or_else(|| {
            PriceError::InvalidBackup(format!("fetched_at {} is out of range", stored.fetched_at))
        })?;
    if age > Duration::hours(MAX_BACKUP_AGE_HOURS) {
        return Err(PriceError::StaleBackup {
            age_hours: age.num_hours(),
        });
    }
    if age < -Duration::minutes(MAX_FUTURE_SKEW_MINUTES) {
        return Err(PriceError::InvalidBackup(format!(
            "fetched_at {} is in the future",
            stored.fetched_at
        )));
    }

    let buy_prices = match stored.buy {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => match serde_json::from_value::<PriceTable>(raw) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("Discarding invalid buy prices from backup: {}", e);
                None
            }
        },
    };

    Ok(PriceSnapshot {
        sell_prices: stored.sell,
        buy_prices,
        changes: stored.changes,
        fetched_at: stored.fetched_at,
        is_from_backup: true,
    })
}
