//! The ticker reference dataset (`company_tickers.json`).

use analysis_core::{Security, TickerMap};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct TickerEntry {
    pub cik_str: u64,
    pub ticker: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// The dataset is an object keyed by row index: `{"0": {...}, "1": {...}}`.
pub fn parse_ticker_map(body: &str) -> Result<TickerMap, serde_json::Error> {
    let rows: HashMap<String, TickerEntry> = serde_json::from_str(body)?;
    let mut map = TickerMap::with_capacity(rows.len());
    for entry in rows.into_values() {
        let security = Security::new(&entry.ticker, entry.cik_str, entry.title);
        if security.ticker.is_empty() {
            continue;
        }
        // Share classes occasionally repeat a ticker; the lowest CIK is kept
        // so the result does not depend on map iteration order.
        match map.get(&security.ticker) {
            Some(existing) if existing.canonical_id <= security.canonical_id => {}
            _ => {
                map.insert(security.ticker.clone(), security);
            }
        }
    }
    Ok(map)
}
