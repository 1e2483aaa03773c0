use crate::core::asset::AssetType;
use crate::core::config::ApiProviderConfig;
use crate::core::error::PriceError;
use crate::core::price::{PriceProvider, PriceSnapshot, PriceSource, parse_json_number};
use crate::providers::SnapshotBuilder;
use crate::providers::util::{RetryPolicy, http_client, with_retry};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

const NAME: &str = "market-api";

/// Primary source: a JSON quote endpoint with its own retry policy.
pub struct MarketApiProvider {
    base_url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl MarketApiProvider {
    pub fn new(config: &ApiProviderConfig) -> Result<Self> {
        Ok(MarketApiProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
            policy: RetryPolicy::from(config),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn fetch_body(&self, url: &str) -> Result<Value, PriceError> {
        debug!("Requesting prices from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PriceError::http(NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceError::http(NAME, format!("status {status}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| PriceError::http(NAME, e))?;
        serde_json::from_str(&text)
            .map_err(|e| PriceError::structural(NAME, format!("invalid JSON: {e}")))
    }
}

/// Reads `{"rates": {"<code>": {"buy", "sell", "change"}}}`.
fn parse_rates(body: &Value, fetched_at: i64) -> Result<PriceSnapshot, PriceError> {
    let rates = body
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| PriceError::structural(NAME, "missing `rates` object"))?;

    let mut builder = SnapshotBuilder::new();
    for asset in AssetType::ALL.into_iter().filter(|a| !a.is_base()) {
        let Some(quote) = rates.get(asset.code()).and_then(Value::as_object) else {
            debug!(%asset, "No usable quote in response");
            continue;
        };
        let field = |name: &str| quote.get(name).and_then(parse_json_number);
        builder.record(asset, field("buy"), field("sell"), field("change"));
    }
    builder.finish(NAME, fetched_at)
}

#[async_trait]
impl PriceProvider for MarketApiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn source(&self) -> PriceSource {
        PriceSource::Primary
    }

    #[instrument(name = "MarketApiFetch", skip(self, cancel))]
    async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<PriceSnapshot, PriceError> {
        let url = format!("{}/v1/prices", self.base_url);
        let url = url.as_str();
        let body = with_retry(NAME, &self.policy, cancel, || self.fetch_body(url)).await?;
        let snapshot = parse_rates(&body, Utc::now().timestamp_millis())?;
        info!(
            known = snapshot.sell_prices.known_count(),
            "Fetched prices from {}", NAME
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate, Times};

    async fn mock_server(template: ResponseTemplate, expected_calls: impl Into<Times>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/prices"))
            .respond_with(template)
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn provider(server: &MockServer, attempts: u32, timeout: Duration) -> MarketApiProvider {
        let config = ApiProviderConfig {
            base_url: server.uri(),
            ..Default::default()
        };
        MarketApiProvider::new(&config).unwrap().with_policy(RetryPolicy {
            attempts,
            timeout,
            backoff: Duration::from_millis(1),
            rate_limit_penalty: 2,
        })
    }

    #[tokio::test]
    async fn test_fetch_mixed_number_formats() {
        let body = serde_json::json!({
            "rates": {
                "usd": {"buy": "34,40", "sell": "34,52", "change": "-0,12"},
                "gram_gold": {"buy": 2440.5, "sell": 2451.25, "change": 0.8},
                "silver": {"buy": "n/a", "sell": null, "change": "1.2"},
                "try": {"buy": 9, "sell": 9, "change": 9}
            }
        });
        let server = mock_server(ResponseTemplate::new(200).set_body_json(body), 1).await;
        let provider = provider(&server, 3, Duration::from_secs(5));

        let snapshot = provider
            .fetch_snapshot(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(snapshot.sell_prices.get(AssetType::Usd), Some(34.52));
        assert_eq!(snapshot.sell_prices.get(AssetType::GramGold), Some(2451.25));
        assert_eq!(snapshot.sell_prices.get(AssetType::Silver), None);
        assert_eq!(snapshot.sell_prices.get(AssetType::Try), Some(1.0));
        assert_eq!(snapshot.changes.get(AssetType::Usd), Some(-0.12));
        assert_eq!(snapshot.changes.get(AssetType::Silver), Some(1.2));
        let buy = snapshot.buy_prices.unwrap();
        assert_eq!(buy.get(AssetType::Usd), Some(34.4));
        assert!(!snapshot.is_from_backup);
    }

    #[tokio::test]
    async fn test_unrecognized_shape_is_structural() {
        let body = serde_json::json!({"data": []});
        let server = mock_server(ResponseTemplate::new(200).set_body_json(body), 1).await;
        let result = provider(&server, 1, Duration::from_secs(5))
            .fetch_snapshot(&CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PriceError::Structural { .. })));
    }

    #[tokio::test]
    async fn test_no_parsable_field_fails() {
        let body = serde_json::json!({
            "rates": {"usd": {"sell": "--"}, "eur": {"sell": -2}}
        });
        let server = mock_server(ResponseTemplate::new(200).set_body_json(body), 1).await;
        let result = provider(&server, 1, Duration::from_secs(5))
            .fetch_snapshot(&CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PriceError::NoValidPrice { .. })));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = mock_server(ResponseTemplate::new(503), 3).await;
        let result = provider(&server, 3, Duration::from_secs(5))
            .fetch_snapshot(&CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PriceError::Http { .. })));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let template = ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"rates": {}}))
            .set_delay(Duration::from_millis(500));
        let server = mock_server(template, 1..).await;
        let result = provider(&server, 2, Duration::from_millis(50))
            .fetch_snapshot(&CancellationToken::new())
            .await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_request() {
        let server = mock_server(ResponseTemplate::new(200), 0).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = provider(&server, 3, Duration::from_secs(5))
            .fetch_snapshot(&cancel)
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
