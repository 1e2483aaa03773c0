use std::fmt::Display;
use thiserror::Error;

/// Failure reasons collected from every provider that was tried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderFailures(pub Vec<(String, String)>);

impl ProviderFailures {
    pub fn push(&mut self, provider: &str, reason: impl Display) {
        self.0.push((provider.to_string(), reason.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Display for ProviderFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no provider enabled");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(provider, reason)| format!("{provider}: {reason}"))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Errors raised while acquiring or restoring market prices.
#[derive(Debug, Error)]
pub enum PriceError {
    /// The response did not have the expected shape.
    #[error("Unrecognized response from {provider}: {message}")]
    Structural { provider: String, message: String },

    /// The response had the expected shape but no field could be parsed.
    #[error("No valid price in response from {provider}")]
    NoValidPrice { provider: String },

    #[error("Request to {provider} timed out after {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    /// Cooperative cancellation. Never shown to the user.
    #[error("Price request cancelled")]
    Cancelled,

    #[error("HTTP error from {provider}: {message}")]
    Http { provider: String, message: String },

    #[error("All price providers failed: {0}")]
    AllProvidersFailed(ProviderFailures),

    #[error("No live prices and no usable backup ({reason}): {failures}")]
    BackupUnavailable {
        failures: ProviderFailures,
        reason: String,
    },

    #[error("Price backup is stale ({age_hours}h old)")]
    StaleBackup { age_hours: i64 },

    #[error("Price backup is invalid: {0}")]
    InvalidBackup(String),

    #[error("A price fetch is already in progress")]
    FetchInProgress,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl PriceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PriceError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PriceError::Timeout { .. })
    }

    pub(crate) fn http(provider: &str, err: impl Display) -> Self {
        PriceError::Http {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn structural(provider: &str, message: impl Into<String>) -> Self {
        PriceError::Structural {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for PriceError {
    fn from(e: anyhow::Error) -> Self {
        PriceError::Storage(e.to_string())
    }
}
