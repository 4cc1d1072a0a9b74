use analysis_core::{FetchError, TickerDirectory, TickerMap};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub mod facts;
pub mod tickers;

pub use facts::{CompanyFacts, CompanyFactsDocument, ConceptFacts, RawFact};
pub use tickers::{parse_ticker_map, TickerEntry};

pub const DEFAULT_BASE_URL: &str = "https://data.sec.gov";
pub const DEFAULT_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
pub const DEFAULT_USER_AGENT: &str = "FinancialAnalysisApp researcher@example.com";

/// Fair-access policy allows 10 requests per second.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Spaces consecutive requests by a fixed minimum interval.
#[derive(Clone)]
struct RateLimiter {
    last_request: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Arc::new(Mutex::new(None)),
            min_interval,
        }
    }

    async fn wait_if_needed(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
pub struct SecClientConfig {
    /// Sent as `User-Agent`; the regulator rejects anonymous traffic.
    pub user_agent: String,
    pub base_url: String,
    pub tickers_url: String,
    pub timeout: Duration,
}

impl Default for SecClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            tickers_url: DEFAULT_TICKERS_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Client for the regulatory facts API and ticker reference dataset.
#[derive(Clone)]
pub struct SecClient {
    client: Client,
    config: SecClientConfig,
    rate_limiter: RateLimiter,
}

impl SecClient {
    pub fn new(config: SecClientConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            rate_limiter: RateLimiter::new(MIN_REQUEST_INTERVAL),
        })
    }

    pub fn config(&self) -> &SecClientConfig {
        &self.config
    }

    pub fn company_facts_url(&self, canonical_id: &str) -> String {
        format!(
            "{}/api/xbrl/companyfacts/CIK{}.json",
            self.config.base_url.trim_end_matches('/'),
            canonical_id
        )
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.rate_limiter.wait_if_needed().await;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.config.timeout)
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Regulator returned HTTP {} for {}", status.as_u16(), url);
            return Err(FetchError::status(status.as_u16(), url));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.config.timeout)
            } else {
                FetchError::Transport(format!("failed to read body: {}", e))
            }
        })
    }

    /// Fetch the full company facts bundle for a zero-padded identifier.
    pub async fn fetch_company_facts(&self, canonical_id: &str) -> Result<CompanyFacts, FetchError> {
        let url = self.company_facts_url(canonical_id);
        let body = self.get_text(&url).await?;
        CompanyFacts::from_json(&body)
            .map_err(|e| FetchError::Decode(format!("company facts for CIK{}: {}", canonical_id, e)))
    }

    pub async fn fetch_ticker_map(&self) -> Result<TickerMap, FetchError> {
        let body = self.get_text(&self.config.tickers_url).await?;
        let map = parse_ticker_map(&body)
            .map_err(|e| FetchError::Decode(format!("ticker reference dataset: {}", e)))?;
        tracing::info!("Loaded {} tickers from reference dataset", map.len());
        Ok(map)
    }
}

#[async_trait]
impl TickerDirectory for SecClient {
    async fn load_tickers(&self) -> Result<TickerMap, FetchError> {
        self.fetch_ticker_map().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::FactSource;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SecClient {
        SecClient::new(SecClientConfig {
            user_agent: "TestSuite tests@example.com".to_string(),
            base_url: server.uri(),
            tickers_url: format!("{}/files/company_tickers.json", server.uri()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_company_facts_sends_identifying_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/xbrl/companyfacts/CIK0000320193.json"))
            .and(header("user-agent", "TestSuite tests@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"cik": 320193, "entityName": "Apple Inc.", "facts": {"us-gaap": {"Assets": {"units": {"USD": [{"end": "2023-09-30", "val": 352583000000, "form": "10-K", "filed": "2023-11-03"}]}}}}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let facts = client_for(&server)
            .fetch_company_facts("0000320193")
            .await
            .unwrap();
        assert_eq!(facts.series("Assets").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_company_facts("0000000001")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/company_tickers.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).load_tickers().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
