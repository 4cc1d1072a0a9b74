use anyhow::{Context, Result};
use polygon_client::PolygonConfig;
use sec_client::SecClientConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sec: SecClientConfig,
    /// `None` disables market data: no quotes, no price history, no
    /// statement fallback.
    pub polygon: Option<PolygonConfig>,
    pub facts_ttl: Duration,
    pub market_ttl: Duration,
    /// Upper bound on every cached upstream load, including time queued on
    /// the market-data rate limiter and 429 back-off.
    pub load_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sec: SecClientConfig::default(),
            polygon: None,
            facts_ttl: Duration::from_secs(3600),
            market_ttl: Duration::from_secs(300),
            load_timeout: load_timeout_for(Duration::from_secs(30)),
        }
    }
}

/// Default load bound: a full rate-limiter window, the 429 back-off and
/// three HTTP attempts.
fn load_timeout_for(http_timeout: Duration) -> Duration {
    Duration::from_secs(60 + 2 * 15) + http_timeout.saturating_mul(3)
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", name, raw)),
        _ => Ok(default),
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let timeout = Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 30u64)?);

        let sec = SecClientConfig {
            user_agent: lookup("SEC_USER_AGENT").unwrap_or(defaults.sec.user_agent),
            base_url: lookup("SEC_BASE_URL").unwrap_or(defaults.sec.base_url),
            tickers_url: lookup("SEC_TICKERS_URL").unwrap_or(defaults.sec.tickers_url),
            timeout,
        };
        if !sec.user_agent.contains('@') {
            anyhow::bail!("SEC_USER_AGENT must include a contact e-mail address");
        }

        let polygon = match lookup("POLYGON_API_KEY").filter(|key| !key.trim().is_empty()) {
            Some(api_key) => {
                let mut config = PolygonConfig::new(api_key);
                if let Some(base_url) = lookup("POLYGON_BASE_URL") {
                    config.base_url = base_url;
                }
                config.rate_limit = parse_or(&lookup, "POLYGON_RATE_LIMIT", config.rate_limit)?;
                config.timeout = timeout;
                Some(config)
            }
            None => None,
        };

        Ok(Self {
            sec,
            polygon,
            facts_ttl: Duration::from_secs(parse_or(&lookup, "FACTS_CACHE_TTL_SECS", 3600u64)?),
            market_ttl: Duration::from_secs(parse_or(&lookup, "MARKET_CACHE_TTL_SECS", 300u64)?),
            load_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CACHE_LOAD_TIMEOUT_SECS",
                load_timeout_for(timeout).as_secs(),
            )?),
        })
    }
}
