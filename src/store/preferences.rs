use crate::core::cache::{KeyValueCollection, Store};
use crate::core::price::PriceSourcePreference;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::warn;

pub const COLLECTION: &str = "preferences";
const PRICE_SOURCE_KEY: &[u8] = b"price_source";

/// Small persisted user settings.
pub struct Preferences {
    collection: Arc<dyn KeyValueCollection>,
}

impl Preferences {
    pub fn new(store: &dyn Store) -> Result<Self> {
        let collection = store
            .get_collection(COLLECTION, true, true)
            .ok_or_else(|| anyhow!("Failed to open collection: {COLLECTION}"))?;
        Ok(Self { collection })
    }

    pub fn with_collection(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    /// Unset or unrecognized values read as `Auto`.
    pub async fn price_source(&self) -> PriceSourcePreference {
        let Some(bytes) = self.collection.get(PRICE_SOURCE_KEY).await else {
            return PriceSourcePreference::Auto;
        };
        match String::from_utf8_lossy(&bytes).parse() {
            Ok(pref) => pref,
            Err(e) => {
                warn!("Ignoring stored price source: {}", e);
                PriceSourcePreference::Auto
            }
        }
    }

    pub async fn set_price_source(&self, pref: PriceSourcePreference) -> Result<()> {
        self.collection
            .put(PRICE_SOURCE_KEY, pref.to_string().as_bytes())
            .await
    }
}
