use crate::core::config::ApiProviderConfig;
use crate::core::error::PriceError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const USER_AGENT: &str = concat!("goldfolio/", env!("CARGO_PKG_VERSION"));

pub(crate) fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

/// How a provider retries: attempts, per-attempt time box and backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub timeout: Duration,
    /// Delay before the second attempt; doubled for every attempt after that.
    pub backoff: Duration,
    /// Backoff multiplier once two attempts in a row time out.
    pub rate_limit_penalty: u32,
}

impl RetryPolicy {
    /// One time-boxed attempt, no retries.
    pub fn single(timeout: Duration) -> Self {
        Self {
            attempts: 1,
            timeout,
            backoff: Duration::ZERO,
            rate_limit_penalty: 1,
        }
    }

    fn delay_after(&self, attempt: u32, consecutive_timeouts: u32) -> Duration {
        let delay = self.backoff.saturating_mul(1u32 << attempt.min(16));
        if consecutive_timeouts >= 2 {
            delay.saturating_mul(self.rate_limit_penalty.max(1))
        } else {
            delay
        }
    }
}

impl From<&ApiProviderConfig> for RetryPolicy {
    fn from(config: &ApiProviderConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            backoff: Duration::from_millis(config.backoff_ms),
            rate_limit_penalty: config.rate_limit_penalty,
        }
    }
}

/// Runs `operation` under `policy`.
///
/// Each attempt is raced against its own timer and against `cancel`; the
/// transport's own timeout is not relied on. Cancellation seen before an
/// attempt, during one, or while backing off ends the call with
/// [`PriceError::Cancelled`]. Otherwise the last attempt's error is returned.
pub async fn with_retry<F, Fut, T>(
    provider: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, PriceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PriceError>>,
{
    let attempts = policy.attempts.max(1);
    let mut consecutive_timeouts = 0;
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(PriceError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PriceError::Cancelled),
            result = tokio::time::timeout(policy.timeout, operation()) => result,
        };

        let err = match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_cancelled() => return Err(e),
            Ok(Err(e)) => {
                consecutive_timeouts = 0;
                e
            }
            Err(_) => {
                consecutive_timeouts += 1;
                PriceError::Timeout {
                    provider: provider.to_string(),
                    after_ms: policy.timeout.as_millis() as u64,
                }
            }
        };

        if attempt + 1 >= attempts {
            return Err(err);
        }

        let delay = policy.delay_after(attempt, consecutive_timeouts);
        debug!(
            "{} attempt {}/{} failed: {}. Retrying in {:?}",
            provider,
            attempt + 1,
            attempts,
            err,
            delay
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PriceError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

/// Advisory reachability check. A negative answer never blocks a fetch.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Treats any HTTP response from `url`, whatever its status, as being online.
pub struct HttpConnectivity {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpConnectivity {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            url: url.to_string(),
            client: http_client()?,
            timeout: Duration::from_secs(3),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivity {
    async fn is_online(&self) -> bool {
        let request = self.client.head(&self.url).send();
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Connectivity check failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Connectivity check timed out");
                false
            }
        }
    }
}
