//! Core business logic abstractions

pub mod analytics;
pub mod asset;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod log;
pub mod notice;
pub mod numeric;
pub mod price;

// Re-export main types for cleaner imports
pub use asset::AssetType;
pub use error::{PriceError, ProviderFailures};
pub use ledger::{HistoryEntry, HistoryKind, Ledger, LedgerChange, Lot, Outcome, PortfolioState};
pub use notice::Notice;
pub use price::{
    PriceChangeTable, PriceProvider, PriceSnapshot, PriceSource, PriceSourcePreference,
    PriceTable,
};
