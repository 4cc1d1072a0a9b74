use analysis_core::{FetchError, PricePoint};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub mod statements;

pub use statements::{FinancialStatements, StatementFacts, StatementFiling, StatementValue};

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

const MAX_ATTEMPTS: u32 = 3;
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(15);

/// Wait before retrying after a 429 on `attempt` (zero-based), or `None`
/// when no attempts remain.
fn backoff_after(attempt: u32) -> Option<Duration> {
    (attempt + 1 < MAX_ATTEMPTS).then_some(RATE_LIMIT_BACKOFF)
}

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).duration_since(now) + Duration::from_millis(50),
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for market-data slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolygonConfig {
    pub api_key: String,
    pub base_url: String,
    /// Requests per minute. The free tier allows 5.
    pub rate_limit: usize,
    pub timeout: Duration,
}

impl PolygonConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            rate_limit: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Market-data provider client: prices and statement snapshots by ticker.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(config: PolygonConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            client,
            rate_limiter: RateLimiter::new(config.rate_limit, Duration::from_secs(60)),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(e.to_string())
        }
    }

    /// Send a request with rate limiting and automatic 429 back-off, then
    /// decode a successful body.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let request = self
            .client
            .get(url)
            .query(query)
            .query(&[("apiKey", self.api_key.as_str())])
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        for attempt in 0..MAX_ATTEMPTS {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| FetchError::Transport("cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            if status.as_u16() == 429 {
                let Some(wait) = backoff_after(attempt) else {
                    break;
                };
                tracing::warn!(
                    "Market-data 429 rate limited, waiting {}s before retry {}/{}",
                    wait.as_secs(),
                    attempt + 1,
                    MAX_ATTEMPTS - 1
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                tracing::warn!("Market-data provider returned HTTP {} for {}", status.as_u16(), url);
                return Err(FetchError::status(status.as_u16(), url));
            }

            let body = response.text().await.map_err(|e| self.transport_error(e))?;
            return serde_json::from_str(&body)
                .map_err(|e| FetchError::Decode(format!("{}: {}", url, e)));
        }

        tracing::warn!("Market-data 429 persisted after {} attempts for {}", MAX_ATTEMPTS, url);
        Err(FetchError::status(429, url))
    }

    /// Trailing daily closes, oldest first.
    pub async fn get_daily_prices(&self, symbol: &str, days_back: i64) -> Result<Vec<PricePoint>, FetchError> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(days_back.max(1));
        self.get_aggregates(symbol, from, to).await
    }

    pub async fn get_aggregates(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, FetchError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let agg: AggregateResponse = self
            .get_json(&url, &[("adjusted", "true".to_string()), ("sort", "asc".to_string())])
            .await?;

        Ok(agg
            .results
            .into_iter()
            .filter_map(|r| {
                let date = DateTime::from_timestamp_millis(r.t)?.date_naive();
                Some(PricePoint {
                    date,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect())
    }

    /// Last trade, falling back to today's and then the previous session's close.
    pub async fn get_current_price(&self, symbol: &str) -> Result<Option<f64>, FetchError> {
        let snapshot = self.get_snapshot(symbol).await?;
        Ok(snapshot.price())
    }

    pub async fn get_snapshot(&self, symbol: &str) -> Result<SnapshotTicker, FetchError> {
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}",
            self.base_url, symbol
        );
        let snap: SnapshotResponse = self.get_json(&url, &[]).await?;
        Ok(snap.ticker)
    }

    /// Statement snapshots for all recent filings (annual and quarterly).
    pub async fn get_financials(&self, symbol: &str) -> Result<StatementFacts, FetchError> {
        let url = format!("{}/vX/reference/financials", self.base_url);
        let fin: FinancialsResponse = self
            .get_json(
                &url,
                &[
                    ("ticker", symbol.to_string()),
                    ("limit", "40".to_string()),
                    ("order", "asc".to_string()),
                ],
            )
            .await?;
        tracing::debug!("Loaded {} statement filings for {}", fin.results.len(), symbol);
        Ok(StatementFacts::new(fin.results))
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp
    c: f64, // close
    #[serde(default)]
    v: f64, // volume
}

#[derive(Debug, Deserialize)]
struct FinancialsResponse {
    #[serde(default)]
    results: Vec<StatementFiling>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    ticker: SnapshotTicker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTicker {
    pub day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade")]
    pub last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay")]
    pub prev_day: Option<SnapshotDay>,
}

impl SnapshotTicker {
    pub fn price(&self) -> Option<f64> {
        let positive = |v: Option<f64>| v.filter(|p| *p > 0.0);
        positive(self.last_trade.as_ref().and_then(|t| t.p))
            .or_else(|| positive(self.day.as_ref().and_then(|d| d.c)))
            .or_else(|| positive(self.prev_day.as_ref().and_then(|d| d.c)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDay {
    pub c: Option<f64>,
    pub v: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotLastTrade {
    pub p: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::FactSource;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PolygonClient {
        PolygonClient::new(PolygonConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            rate_limit: 100,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_no_backoff_after_final_attempt() {
        assert_eq!(backoff_after(0), Some(RATE_LIMIT_BACKOFF));
        assert_eq!(backoff_after(1), Some(RATE_LIMIT_BACKOFF));
        assert_eq!(backoff_after(MAX_ATTEMPTS - 1), None);
    }

    #[test]
    fn test_snapshot_price_fallbacks() {
        let snap: SnapshotTicker = serde_json::from_str(
            r#"{"day": {"c": 0.0, "v": 0.0}, "lastTrade": null, "prevDay": {"c": 189.5, "v": 1000.0}}"#,
        )
        .unwrap();
        assert_eq!(snap.price(), Some(189.5));
    }

    #[tokio::test]
    async fn test_get_current_price_uses_last_trade() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/snapshot/locale/us/markets/stocks/tickers/AAPL"))
            .and(query_param("apiKey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"ticker": {"day": {"c": 190.0}, "lastTrade": {"p": 191.25}, "prevDay": {"c": 188.0}}}"#,
            ))
            .mount(&server)
            .await;

        let price = client_for(&server).get_current_price("AAPL").await.unwrap();
        assert_eq!(price, Some(191.25));
    }

    #[tokio::test]
    async fn test_get_financials_builds_statement_facts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vX/reference/financials"))
            .and(query_param("ticker", "AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results": [{"fiscal_period": "FY", "fiscal_year": "2023", "start_date": "2022-10-01", "end_date": "2023-09-30", "filing_date": "2023-11-03", "financials": {"income_statement": {"revenues": {"value": 383285000000}}}}]}"#,
            ))
            .mount(&server)
            .await;

        let facts = client_for(&server).get_financials("AAPL").await.unwrap();
        assert_eq!(facts.series("revenues").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server).get_financials("AAPL").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_daily_prices_parse_timestamps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"results": [{"t": 1696219200000, "o": 1.0, "h": 1.0, "l": 1.0, "c": 173.75, "v": 52164500}]}"#,
            ))
            .mount(&server)
            .await;

        let prices = client_for(&server).get_daily_prices("AAPL", 30).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].date, NaiveDate::from_ymd_opt(2023, 10, 2).unwrap());
        assert_eq!(prices[0].close, 173.75);
    }
}
