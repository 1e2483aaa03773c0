//! Asset kinds tracked by the ledger and priced by the providers.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// Local currency. Every price is quoted in it, so its own price is always 1.
    Try,
    Usd,
    Eur,
    GramGold,
    QuarterGold,
    HalfGold,
    FullGold,
    Silver,
}

impl AssetType {
    pub const COUNT: usize = 8;

    pub const ALL: [AssetType; AssetType::COUNT] = [
        AssetType::Try,
        AssetType::Usd,
        AssetType::Eur,
        AssetType::GramGold,
        AssetType::QuarterGold,
        AssetType::HalfGold,
        AssetType::FullGold,
        AssetType::Silver,
    ];

    pub const BASE: AssetType = AssetType::Try;

    pub fn is_base(&self) -> bool {
        *self == Self::BASE
    }

    /// Stable code used on the wire, in storage and on the command line.
    pub fn code(&self) -> &'static str {
        match self {
            AssetType::Try => "try",
            AssetType::Usd => "usd",
            AssetType::Eur => "eur",
            AssetType::GramGold => "gram_gold",
            AssetType::QuarterGold => "quarter_gold",
            AssetType::HalfGold => "half_gold",
            AssetType::FullGold => "full_gold",
            AssetType::Silver => "silver",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetType::Try => "Turkish Lira",
            AssetType::Usd => "US Dollar",
            AssetType::Eur => "Euro",
            AssetType::GramGold => "Gram Gold",
            AssetType::QuarterGold => "Quarter Gold",
            AssetType::HalfGold => "Half Gold",
            AssetType::FullGold => "Full Gold",
            AssetType::Silver => "Silver",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            AssetType::Try => 0,
            AssetType::Usd => 1,
            AssetType::Eur => 2,
            AssetType::GramGold => 3,
            AssetType::QuarterGold => 4,
            AssetType::HalfGold => 5,
            AssetType::FullGold => 6,
            AssetType::Silver => 7,
        }
    }
}

impl Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        AssetType::ALL
            .into_iter()
            .find(|asset| asset.code() == wanted)
            .ok_or_else(|| {
                let valid: Vec<&str> = AssetType::ALL.iter().map(|a| a.code()).collect();
                anyhow!("Invalid asset type: {} (expected one of {})", s, valid.join(", "))
            })
    }
}
