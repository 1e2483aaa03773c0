//! Pricing abstractions and core types

use crate::core::asset::AssetType;
use crate::core::error::PriceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

type RawTable = BTreeMap<String, Option<f64>>;

fn table_from_raw(raw: RawTable, allow_negative: bool) -> Result<[Option<f64>; AssetType::COUNT], String> {
    let mut values = [None; AssetType::COUNT];
    for asset in AssetType::ALL {
        let value = raw
            .get(asset.code())
            .ok_or_else(|| format!("missing key: {}", asset.code()))?;
        if let Some(v) = value {
            if !v.is_finite() || (!allow_negative && *v < 0.0) {
                return Err(format!("invalid value for {}: {}", asset.code(), v));
            }
        }
        values[asset.index()] = *value;
    }
    Ok(values)
}

fn table_to_raw(values: &[Option<f64>; AssetType::COUNT]) -> RawTable {
    AssetType::ALL
        .iter()
        .map(|asset| (asset.code().to_string(), values[asset.index()]))
        .collect()
}

/// Price of one unit of every asset, quoted in the base currency.
///
/// `None` means "currently unknown" and is never treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable", into = "RawTable")]
pub struct PriceTable {
    values: [Option<f64>; AssetType::COUNT],
}

impl PriceTable {
    /// All prices unknown except the base currency.
    pub fn new() -> Self {
        let mut values = [None; AssetType::COUNT];
        values[AssetType::BASE.index()] = Some(1.0);
        Self { values }
    }

    pub fn get(&self, asset: AssetType) -> Option<f64> {
        self.values[asset.index()]
    }

    /// Sets a price. Negative or non-finite values are stored as unknown and the
    /// base currency stays pinned at 1.
    pub fn set(&mut self, asset: AssetType, price: Option<f64>) {
        if asset.is_base() {
            return;
        }
        self.values[asset.index()] = price.filter(|p| p.is_finite() && *p >= 0.0);
    }

    /// Assets other than the base currency whose price is unknown.
    pub fn missing(&self) -> Vec<AssetType> {
        AssetType::ALL
            .into_iter()
            .filter(|a| !a.is_base() && self.get(*a).is_none())
            .collect()
    }

    pub fn known_count(&self) -> usize {
        AssetType::ALL
            .iter()
            .filter(|a| !a.is_base() && self.get(**a).is_some())
            .count()
    }

    /// Overwrites known entries from `other`, keeping the current value where
    /// `other` has none.
    pub fn merge_known(&mut self, other: &PriceTable) {
        for asset in AssetType::ALL {
            if let Some(price) = other.get(asset) {
                self.set(asset, Some(price));
            }
        }
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<RawTable> for PriceTable {
    type Error = String;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let values = table_from_raw(raw, false)?;
        if values[AssetType::BASE.index()] != Some(1.0) {
            return Err(format!("{} must be priced at exactly 1", AssetType::BASE));
        }
        Ok(Self { values })
    }
}

impl From<PriceTable> for RawTable {
    fn from(table: PriceTable) -> Self {
        table_to_raw(&table.values)
    }
}

/// Signed percentage change per asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable", into = "RawTable")]
pub struct PriceChangeTable {
    values: [Option<f64>; AssetType::COUNT],
}

impl PriceChangeTable {
    pub fn new() -> Self {
        let mut values = [None; AssetType::COUNT];
        values[AssetType::BASE.index()] = Some(0.0);
        Self { values }
    }

    pub fn get(&self, asset: AssetType) -> Option<f64> {
        self.values[asset.index()]
    }

    pub fn set(&mut self, asset: AssetType, change: Option<f64>) {
        if asset.is_base() {
            return;
        }
        self.values[asset.index()] = change.filter(|c| c.is_finite());
    }
}

impl Default for PriceChangeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<RawTable> for PriceChangeTable {
    type Error = String;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        Ok(Self {
            values: table_from_raw(raw, true)?,
        })
    }
}

impl From<PriceChangeTable> for RawTable {
    fn from(table: PriceChangeTable) -> Self {
        table_to_raw(&table.values)
    }
}

/// One market snapshot as produced by the acquisition pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub sell_prices: PriceTable,
    pub buy_prices: Option<PriceTable>,
    pub changes: PriceChangeTable,
    /// Epoch milliseconds.
    pub fetched_at: i64,
    pub is_from_backup: bool,
}

impl PriceSnapshot {
    pub fn age(&self, now_ms: i64) -> chrono::Duration {
        chrono::Duration::try_milliseconds(now_ms.saturating_sub(self.fetched_at))
            .unwrap_or(chrono::Duration::MIN)
    }
}

/// Which kind of upstream a provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Primary,
    Secondary,
}

/// User choice restricting the provider list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourcePreference {
    #[default]
    Auto,
    Primary,
    Secondary,
}

impl PriceSourcePreference {
    pub fn allows(&self, source: PriceSource) -> bool {
        match self {
            PriceSourcePreference::Auto => true,
            PriceSourcePreference::Primary => source == PriceSource::Primary,
            PriceSourcePreference::Secondary => source == PriceSource::Secondary,
        }
    }
}

impl Display for PriceSourcePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PriceSourcePreference::Auto => "auto",
                PriceSourcePreference::Primary => "primary",
                PriceSourcePreference::Secondary => "secondary",
            }
        )
    }
}

impl FromStr for PriceSourcePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(PriceSourcePreference::Auto),
            "primary" => Ok(PriceSourcePreference::Primary),
            "secondary" => Ok(PriceSourcePreference::Secondary),
            _ => Err(anyhow::anyhow!("Invalid price source: {}", s)),
        }
    }
}

/// Parses a number given in machine (`1234.5`) or localized (`1.234,5`) notation.
///
/// Returns `None` instead of failing so that one bad field does not sink a whole
/// snapshot.
pub fn parse_localized_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) if cleaned.matches(',').count() == 1 => cleaned.replace(',', "."),
        (None, Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads a JSON field that may hold a number or a (possibly localized) string.
pub fn parse_json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => parse_localized_number(s),
        _ => None,
    }
}

/// A live source of market snapshots.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Human-readable name used in logs and aggregate errors.
    fn name(&self) -> &str;

    fn source(&self) -> PriceSource;

    async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<PriceSnapshot, PriceError>;
}
