use analysis_core::{AnalysisError, Provider, Security, TickerDirectory, TickerMap};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheKey, FetchCache, UNBOUNDED_TTL};

/// Ticker to canonical identifier lookup over the reference dataset. The
/// dataset is loaded once and kept for the life of the process.
#[derive(Clone)]
pub struct IdentifierResolver {
    directory: Arc<dyn TickerDirectory>,
    cache: FetchCache<CacheKey, TickerMap>,
}

impl IdentifierResolver {
    pub fn new(directory: Arc<dyn TickerDirectory>, load_timeout: Duration) -> Self {
        Self {
            directory,
            cache: FetchCache::new(load_timeout),
        }
    }

    fn dataset_key() -> CacheKey {
        CacheKey::new(Provider::Sec, "reference", "company_tickers")
    }

    /// Case-insensitive. Unknown tickers are `NotFound`; a failed dataset
    /// load is a fetch error.
    pub async fn resolve(&self, ticker: &str) -> Result<Security, AnalysisError> {
        let normalized = ticker.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(AnalysisError::NotFound("empty ticker".to_string()));
        }

        let directory = Arc::clone(&self.directory);
        let map = self
            .cache
            .fetch(Self::dataset_key(), UNBOUNDED_TTL, move || async move {
                directory.load_tickers().await
            })
            .await?;

        match map.get(&normalized) {
            Some(security) => {
                tracing::info!("Resolved {} to CIK{}", security.ticker, security.canonical_id);
                Ok(security.clone())
            }
            None => Err(AnalysisError::NotFound(format!("ticker '{}'", normalized))),
        }
    }
}
