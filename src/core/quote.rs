//! Market data types and the upstream provider abstraction

use crate::core::context::RequestContext;
use crate::core::error::{MarketError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Point-in-time price snapshot for a symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    #[serde(rename = "changePercent")]
    pub change_pct: f64,
    pub volume: u64,
    pub high: f64,
    pub low: f64,
}

/// One bar of a price history, closing price only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: u64,
}

/// Result row of a symbol search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    pub price: f64,
}

/// Trims and upper-cases a ticker. Idempotent.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Normalizes `symbol`, rejecting it when nothing is left.
pub fn require_symbol(symbol: &str) -> Result<String> {
    let normalized = normalize_symbol(symbol);
    if normalized.is_empty() {
        return Err(MarketError::InvalidInput("symbol is required".to_string()));
    }
    Ok(normalized)
}

/// Percentage move from `base` to `value`, defined as 0 for a non-positive base.
pub fn percent_change(value: f64, base: f64) -> f64 {
    if base > 0.0 {
        ((value - base) / base) * 100.0
    } else {
        0.0
    }
}

pub fn quote_cache_key(symbol: &str) -> String {
    format!("quote:{symbol}")
}

pub fn history_cache_key(symbol: &str, range: &str, interval: &str) -> String {
    format!("history:{symbol}:{range}:{interval}")
}

/// Outbound access to a market-data provider.
///
/// Every call is bound to `ctx`; exceeding its deadline or cancelling it
/// surfaces as [`MarketError::TransientUpstream`] and is never retried here.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_quote(&self, ctx: &RequestContext, symbol: &str) -> Result<Quote>;

    /// Fetches several quotes at once. Symbols that cannot be resolved are
    /// left out of the result rather than failing the whole call.
    async fn fetch_quotes(&self, ctx: &RequestContext, symbols: &[String]) -> Result<Vec<Quote>>;

    /// Returns the bars for `symbol` in ascending date order.
    async fn fetch_history(
        &self,
        ctx: &RequestContext,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<Vec<HistoryPoint>>;

    async fn search_symbols(
        &self,
        ctx: &RequestContext,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SymbolMatch>>;
}
