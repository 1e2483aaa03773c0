//! User-facing messages emitted by the price refresh flow.

use crate::core::asset::AssetType;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Live providers failed and a stored snapshot is being shown.
    BackupInUse { age_minutes: i64 },
    /// Some prices were missing from the fresh snapshot; their last known values stay.
    PartialUpdate { missing: Vec<AssetType> },
    FetchFailed { reason: String },
    NoNetwork,
}

impl Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::BackupInUse { age_minutes } => {
                let age = if *age_minutes >= 60 {
                    format!("{}h {}m", age_minutes / 60, age_minutes % 60)
                } else {
                    format!("{age_minutes}m")
                };
                write!(f, "Live prices unavailable, showing saved prices from {age} ago")
            }
            Notice::PartialUpdate { missing } => {
                let names: Vec<&str> = missing.iter().map(|a| a.label()).collect();
                write!(f, "Some prices could not be updated: {}", names.join(", "))
            }
            Notice::FetchFailed { reason } => write!(f, "Could not fetch prices: {reason}"),
            Notice::NoNetwork => write!(f, "No network connection detected, trying anyway"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            Notice::BackupInUse { age_minutes: 125 }.to_string(),
            "Live prices unavailable, showing saved prices from 2h 5m ago"
        );
        assert_eq!(
            Notice::PartialUpdate {
                missing: vec![AssetType::Silver, AssetType::Eur]
            }
            .to_string(),
            "Some prices could not be updated: Silver, Euro"
        );
    }
}
