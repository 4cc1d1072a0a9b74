use async_trait::async_trait;
use crate::{FactPoint, FetchError, Provider, TickerMap};

/// Typed view over one upstream's fact bundle.
///
/// Each provider schema gets its own adapter so schema drift stays inside a
/// single translation layer.
pub trait FactSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Raw points disclosed under `tag`, in upstream order, or `None` when the
    /// bundle does not carry the tag at all.
    fn series(&self, tag: &str) -> Option<Vec<FactPoint>>;

    fn has_tag(&self, tag: &str) -> bool {
        self.series(tag).is_some()
    }
}

/// Source of the ticker -> canonical identifier reference dataset.
#[async_trait]
pub trait TickerDirectory: Send + Sync {
    async fn load_tickers(&self) -> Result<TickerMap, FetchError>;
}
