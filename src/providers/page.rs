use crate::core::asset::AssetType;
use crate::core::config::PageProviderConfig;
use crate::core::error::PriceError;
use crate::core::price::{PriceProvider, PriceSnapshot, PriceSource, parse_localized_number};
use crate::providers::SnapshotBuilder;
use crate::providers::util::{RetryPolicy, http_client, with_retry};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

const NAME: &str = "market-page";

/// Secondary source: the public market page, one row per asset.
pub struct MarketPageProvider {
    url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl MarketPageProvider {
    pub fn new(config: &PageProviderConfig) -> Result<Self> {
        Ok(MarketPageProvider {
            url: config.base_url.clone(),
            client: http_client()?,
            policy: RetryPolicy::single(config.timeout()),
        })
    }

    async fn fetch_html(&self) -> Result<String, PriceError> {
        debug!("Requesting market page {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PriceError::http(NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceError::http(NAME, format!("status {status}")));
        }
        response.text().await.map_err(|e| PriceError::http(NAME, e))
    }
}

fn selector(css: &str) -> Result<Selector, PriceError> {
    Selector::parse(css).map_err(|e| PriceError::structural(NAME, format!("bad selector {css}: {e}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Reads `<tr data-code="..">` rows with name, buy, sell and change cells.
fn parse_page(html: &str, fetched_at: i64) -> Result<PriceSnapshot, PriceError> {
    let document = Html::parse_document(html);
    let row_selector = selector("tr[data-code]")?;
    let cell_selector = selector("td")?;

    let mut rows = 0;
    let mut builder = SnapshotBuilder::new();
    for row in document.select(&row_selector) {
        rows += 1;
        let code = row.value().attr("data-code").unwrap_or_default();
        let Ok(asset) = code.parse::<AssetType>() else {
            debug!(code, "Skipping row for unknown asset");
            continue;
        };
        if asset.is_base() {
            continue;
        }
        let cells: Vec<String> = row.select(&cell_selector).map(cell_text).collect();
        if cells.len() < 4 {
            debug!(%asset, cells = cells.len(), "Skipping incomplete row");
            continue;
        }
        builder.record(
            asset,
            parse_localized_number(&cells[1]),
            parse_localized_number(&cells[2]),
            parse_localized_number(&cells[3]),
        );
    }

    if rows == 0 {
        return Err(PriceError::structural(NAME, "no price rows on page"));
    }
    builder.finish(NAME, fetched_at)
}

#[async_trait]
impl PriceProvider for MarketPageProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn source(&self) -> PriceSource {
        PriceSource::Secondary
    }

    #[instrument(name = "MarketPageFetch", skip(self, cancel))]
    async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<PriceSnapshot, PriceError> {
        let html = with_retry(NAME, &self.policy, cancel, || self.fetch_html()).await?;
        let snapshot = parse_page(&html, Utc::now().timestamp_millis())?;
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
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <html><body>
          <table id="market">
            <tr><th>Name</th><th>Buy</th><th>Sell</th><th>Change</th></tr>
            <tr data-code="USD"><td>Dolar</td><td>34,40</td><td>34,52</td><td>%-0,12</td></tr>
            <tr data-code="gram-gold"><td>Gram Altın</td><td>2.440,50</td><td>2.451,25</td><td>%0,80</td></tr>
            <tr data-code="silver"><td>Gümüş</td><td>-</td><td>-</td><td>-</td></tr>
            <tr data-code="btc"><td>Bitcoin</td><td>1</td><td>1</td><td>1</td></tr>
            <tr data-code="eur"><td>Euro</td><td>37,10</td></tr>
          </table>
        </body></html>
    "#;

    async fn serve(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/market"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn provider(server: &MockServer, timeout_secs: u64) -> MarketPageProvider {
        MarketPageProvider::new(&PageProviderConfig {
            base_url: format!("{}/market", server.uri()),
            timeout_secs,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_page_rows() {
        let snapshot = parse_page(PAGE, 1).unwrap();
        assert_eq!(snapshot.sell_prices.get(AssetType::Usd), Some(34.52));
        assert_eq!(snapshot.sell_prices.get(AssetType::GramGold), Some(2451.25));
        assert_eq!(snapshot.sell_prices.get(AssetType::Silver), None);
        assert_eq!(snapshot.sell_prices.get(AssetType::Eur), None);
        assert_eq!(snapshot.changes.get(AssetType::Usd), Some(-0.12));
        assert_eq!(
            snapshot.buy_prices.unwrap().get(AssetType::GramGold),
            Some(2440.5)
        );
    }

    #[test]
    fn test_page_without_rows_is_structural() {
        let result = parse_page("<html><body><p>maintenance</p></body></html>", 1);
        assert!(matches!(result, Err(PriceError::Structural { .. })));
    }

    #[tokio::test]
    async fn test_fetch_from_server() {
        let server = serve(ResponseTemplate::new(200).set_body_string(PAGE)).await;
        let snapshot = provider(&server, 5)
            .fetch_snapshot(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(snapshot.sell_prices.known_count(), 2);
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let server = serve(ResponseTemplate::new(404)).await;
        let result = provider(&server, 5)
            .fetch_snapshot(&CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PriceError::Http { .. })));
    }

    #[tokio::test]
    async fn test_slow_page_times_out() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_string(PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .await;
        let result = provider(&server, 1)
            .fetch_snapshot(&CancellationToken::new())
            .await;
        assert!(result.unwrap_err().is_timeout());
    }
}
