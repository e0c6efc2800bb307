//! Cache-aside access to quotes, history and symbol search.

use crate::core::cache::TtlCache;
use crate::core::config::{CacheConfig, TimeoutConfig};
use crate::core::context::RequestContext;
use crate::core::error::{MarketError, Result};
use crate::core::portfolio::{QuoteBook, QuoteResolution};
use crate::core::quote::{
    HistoryPoint, MarketDataProvider, Quote, SymbolMatch, history_cache_key, normalize_symbol,
    quote_cache_key, require_symbol,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DEFAULT_RANGE: &str = "1mo";
pub const DEFAULT_INTERVAL: &str = "1d";
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 20;

/// Clamps a requested search size into `1..=20`, using 10 for anything else.
pub fn clamp_search_limit(limit: Option<usize>) -> usize {
    match limit {
        Some(n) if (1..=MAX_SEARCH_LIMIT).contains(&n) => n,
        _ => DEFAULT_SEARCH_LIMIT,
    }
}

/// Single entry point for market data. Owns the caches; dropping the service
/// stops their sweep tasks.
pub struct QuoteService {
    provider: Arc<dyn MarketDataProvider>,
    quotes: TtlCache<Quote>,
    histories: TtlCache<Vec<HistoryPoint>>,
    timeouts: TimeoutConfig,
}

impl QuoteService {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        cache: &CacheConfig,
        timeouts: &TimeoutConfig,
    ) -> Self {
        QuoteService {
            provider,
            quotes: TtlCache::new(cache.ttl(), cache.sweep_interval()),
            histories: TtlCache::new(cache.ttl(), cache.sweep_interval()),
            timeouts: timeouts.clone(),
        }
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_quote(&self, ctx: &RequestContext, symbol: &str) -> Result<Quote> {
        let symbol = require_symbol(symbol)?;
        let key = quote_cache_key(&symbol);
        if let Some(cached) = self.quotes.get(&key).await {
            return Ok(cached);
        }

        let ctx = ctx.with_timeout(self.timeouts.quote());
        let quote = self.provider.fetch_quote(&ctx, &symbol).await?;
        self.quotes.set(key, quote.clone()).await;
        Ok(quote)
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_history(
        &self,
        ctx: &RequestContext,
        symbol: &str,
        range: Option<&str>,
        interval: Option<&str>,
    ) -> Result<Vec<HistoryPoint>> {
        let symbol = require_symbol(symbol)?;
        let range = non_blank(range).unwrap_or(DEFAULT_RANGE);
        let interval = non_blank(interval).unwrap_or(DEFAULT_INTERVAL);

        let key = history_cache_key(&symbol, range, interval);
        if let Some(cached) = self.histories.get(&key).await {
            return Ok(cached);
        }

        let ctx = ctx.with_timeout(self.timeouts.history());
        let history = self
            .provider
            .fetch_history(&ctx, &symbol, range, interval)
            .await?;
        self.histories.set(key, history.clone()).await;
        Ok(history)
    }

    /// Quotes for `symbols` in the caller's order. Symbols nobody could
    /// resolve are left out; only a failure of the whole upstream batch is
    /// reported as an error.
    #[instrument(skip(self, ctx))]
    pub async fn get_quotes(&self, ctx: &RequestContext, symbols: &[String]) -> Result<Vec<Quote>> {
        let requested: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        let (book, failure) = self.lookup(ctx, &requested).await;
        if let Some(e) = failure {
            return Err(e);
        }

        Ok(requested
            .iter()
            .filter_map(|s| book.quote(s).cloned())
            .collect())
    }

    /// Like [`QuoteService::get_quotes`] but never fails: each symbol carries
    /// its own outcome, and a batch failure only affects the cache misses.
    pub async fn resolve_quotes(&self, ctx: &RequestContext, symbols: &[String]) -> QuoteBook {
        let requested: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        self.lookup(ctx, &requested).await.0
    }

    async fn lookup(
        &self,
        ctx: &RequestContext,
        symbols: &[String],
    ) -> (QuoteBook, Option<MarketError>) {
        let mut book = QuoteBook::new();
        let mut misses: Vec<String> = Vec::new();

        for symbol in symbols.iter().filter(|s| !s.is_empty()) {
            if book.get(symbol).is_some() || misses.contains(symbol) {
                continue;
            }
            match self.quotes.get(&quote_cache_key(symbol)).await {
                Some(quote) => book.insert(symbol, QuoteResolution::Resolved(quote)),
                None => misses.push(symbol.clone()),
            }
        }

        if misses.is_empty() {
            return (book, None);
        }

        debug!(hits = book.len(), misses = misses.len(), "Fetching uncached quotes");
        let ctx = ctx.with_timeout(self.timeouts.batch());
        match self.provider.fetch_quotes(&ctx, &misses).await {
            Ok(quotes) => {
                for quote in quotes {
                    let symbol = normalize_symbol(&quote.symbol);
                    self.quotes
                        .set(quote_cache_key(&symbol), quote.clone())
                        .await;
                    book.insert(&symbol, QuoteResolution::Resolved(quote));
                }
                for symbol in &misses {
                    if book.get(symbol).is_none() {
                        debug!(%symbol, "Symbol not resolved by upstream");
                        book.insert(symbol, QuoteResolution::NotFound);
                    }
                }
                (book, None)
            }
            Err(e) => {
                warn!(error = %e, "Batch quote fetch failed");
                for symbol in &misses {
                    book.insert(symbol, QuoteResolution::FetchFailed(e.to_string()));
                }
                (book, Some(e))
            }
        }
    }

    #[instrument(skip(self, ctx))]
    pub async fn search_symbols(
        &self,
        ctx: &RequestContext,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SymbolMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MarketError::InvalidInput("query is required".to_string()));
        }
        let limit = clamp_search_limit(limit);

        let ctx = ctx.with_timeout(self.timeouts.search());
        self.provider.search_symbols(&ctx, query, limit).await
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Provider double that serves canned quotes and records every call.
    #[derive(Default)]
    pub(crate) struct MockProvider {
        pub prices: HashMap<String, f64>,
        pub fail_batches: bool,
        pub calls: Mutex<Vec<String>>,
        /// Holds batch fetches until this many are in flight.
        pub batch_gate: Option<tokio::sync::Barrier>,
    }

    impl MockProvider {
        pub fn with_prices(prices: &[(&str, f64)]) -> Self {
            MockProvider {
                prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            MockProvider {
                fail_batches: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn quote(&self, symbol: &str) -> Option<Quote> {
            self.prices.get(symbol).map(|price| Quote {
                symbol: symbol.to_string(),
                name: format!("{symbol} Inc."),
                price: *price,
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl MarketDataProvider for MockProvider {
        async fn fetch_quote(&self, _ctx: &RequestContext, symbol: &str) -> Result<Quote> {
            self.record(format!("quote:{symbol}"));
            if self.fail_batches {
                return Err(MarketError::TransientUpstream("upstream down".into()));
            }
            self.quote(symbol)
                .ok_or_else(|| MarketError::NotFound(format!("symbol not found: {symbol}")))
        }

        async fn fetch_quotes(
            &self,
            _ctx: &RequestContext,
            symbols: &[String],
        ) -> Result<Vec<Quote>> {
            self.record(format!("quotes:{}", symbols.join(",")));
            if let Some(gate) = &self.batch_gate {
                gate.wait().await;
            }
            if self.fail_batches {
                return Err(MarketError::TransientUpstream("upstream down".into()));
            }
            Ok(symbols.iter().filter_map(|s| self.quote(s)).collect())
        }

        async fn fetch_history(
            &self,
            _ctx: &RequestContext,
            symbol: &str,
            range: &str,
            interval: &str,
        ) -> Result<Vec<HistoryPoint>> {
            self.record(format!("history:{symbol}:{range}:{interval}"));
            let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
            Ok(vec![HistoryPoint {
                date,
                close: self.prices.get(symbol).copied().unwrap_or_default(),
                volume: 10,
            }])
        }

        async fn search_symbols(
            &self,
            _ctx: &RequestContext,
            query: &str,
            limit: usize,
        ) -> Result<Vec<SymbolMatch>> {
            self.record(format!("search:{query}:{limit}"));
            Ok(Vec::new())
        }
    }

    pub(crate) fn service(provider: Arc<MockProvider>) -> QuoteService {
        QuoteService::new(provider, &CacheConfig::default(), &TimeoutConfig::default())
    }

    fn strings(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_quote_normalizes_and_caches() {
        let provider = Arc::new(MockProvider::with_prices(&[("AAPL", 150.0)]));
        let service = service(provider.clone());
        let ctx = RequestContext::new();

        let first = service.get_quote(&ctx, " aapl ").await.unwrap();
        let second = service.get_quote(&ctx, "AAPL").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.price, 150.0);
        assert_eq!(provider.calls(), vec!["quote:AAPL"]);
    }

    #[tokio::test]
    async fn test_get_quote_rejects_blank_symbol() {
        let provider = Arc::new(MockProvider::default());
        let service = service(provider.clone());

        let err = service
            .get_quote(&RequestContext::new(), "   ")
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_quote_failure_is_returned_and_not_cached() {
        let provider = Arc::new(MockProvider::with_prices(&[]));
        let service = service(provider.clone());
        let ctx = RequestContext::new();

        let err = service.get_quote(&ctx, "NOPE").await.unwrap_err();
        assert_eq!(err, MarketError::NotFound("symbol not found: NOPE".into()));
        let _ = service.get_quote(&ctx, "NOPE").await;
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_get_quote_expires_after_ttl() {
        let provider = Arc::new(MockProvider::with_prices(&[("AAPL", 150.0)]));
        let cache = CacheConfig {
            ttl_secs: 0,
            sweep_interval_secs: 60,
        };
        let service = QuoteService::new(provider.clone(), &cache, &TimeoutConfig::default());
        let ctx = RequestContext::new();

        service.get_quote(&ctx, "AAPL").await.unwrap();
        service.get_quote(&ctx, "AAPL").await.unwrap();
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_get_history_defaults_and_cache_key() {
        let provider = Arc::new(MockProvider::with_prices(&[("AAPL", 150.0)]));
        let service = service(provider.clone());
        let ctx = RequestContext::new();

        let history = service.get_history(&ctx, "aapl", None, Some(" ")).await.unwrap();
        assert_eq!(history.len(), 1);
        service
            .get_history(&ctx, "AAPL", Some("1mo"), Some("1d"))
            .await
            .unwrap();
        service
            .get_history(&ctx, "AAPL", Some("1y"), None)
            .await
            .unwrap();

        assert_eq!(
            provider.calls(),
            vec!["history:AAPL:1mo:1d", "history:AAPL:1y:1d"]
        );
    }

    #[tokio::test]
    async fn test_get_quotes_empty_input_makes_no_call() {
        let provider = Arc::new(MockProvider::default());
        let service = service(provider.clone());

        let quotes = service.get_quotes(&RequestContext::new(), &[]).await.unwrap();
        assert!(quotes.is_empty());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_quotes_fetches_only_misses_in_one_call() {
        let provider = Arc::new(MockProvider::with_prices(&[("AAPL", 150.0), ("MSFT", 300.0)]));
        let service = service(provider.clone());
        let ctx = RequestContext::new();

        service.get_quote(&ctx, "AAPL").await.unwrap();
        let quotes = service
            .get_quotes(&ctx, &strings(&["aapl", "MSFT"]))
            .await
            .unwrap();

        let symbols: Vec<_> = quotes.iter().map(|q| q.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(provider.calls(), vec!["quote:AAPL", "quotes:MSFT"]);

        // Both are cached now
        service
            .get_quotes(&ctx, &strings(&["MSFT", "AAPL"]))
            .await
            .unwrap();
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_get_quotes_keeps_order_and_omits_unresolved() {
        let provider = Arc::new(MockProvider::with_prices(&[("AAPL", 150.0), ("TSLA", 200.0)]));
        let service = service(provider.clone());

        let quotes = service
            .get_quotes(
                &RequestContext::new(),
                &strings(&["TSLA", "NOPE", "AAPL", "tsla"]),
            )
            .await
            .unwrap();

        let symbols: Vec<_> = quotes.iter().map(|q| q.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["TSLA", "AAPL", "TSLA"]);
        // Duplicates are fetched once
        assert_eq!(provider.calls(), vec!["quotes:TSLA,NOPE,AAPL"]);
    }

    #[tokio::test]
    async fn test_get_quotes_propagates_batch_failure() {
        let provider = Arc::new(MockProvider::failing());
        let service = service(provider.clone());

        let err = service
            .get_quotes(&RequestContext::new(), &strings(&["AAPL"]))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_resolve_quotes_distinguishes_outcomes() {
        let provider = Arc::new(MockProvider::with_prices(&[("AAPL", 150.0)]));
        let service = service(provider.clone());

        let book = service
            .resolve_quotes(&RequestContext::new(), &strings(&["AAPL", "NOPE", ""]))
            .await;
        assert!(matches!(book.get("AAPL"), Some(QuoteResolution::Resolved(_))));
        assert_eq!(book.get("NOPE"), Some(&QuoteResolution::NotFound));
        assert_eq!(book.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_quotes_marks_misses_failed_on_outage() {
        let provider = Arc::new(MockProvider::failing());
        let service = service(provider.clone());

        let book = service
            .resolve_quotes(&RequestContext::new(), &strings(&["AAPL"]))
            .await;
        assert!(matches!(
            book.get("AAPL"),
            Some(QuoteResolution::FetchFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_misses_are_not_coalesced() {
        // Two callers racing on the same uncached symbol both go upstream.
        let provider = Arc::new(MockProvider {
            batch_gate: Some(tokio::sync::Barrier::new(2)),
            ..MockProvider::with_prices(&[("AAPL", 150.0)])
        });
        let service = service(provider.clone());
        let ctx = RequestContext::new();
        let first = strings(&["AAPL"]);
        let second = strings(&["AAPL"]);

        // Each lookup parks upstream until the other has also missed the cache
        let (a, b) = tokio::time::timeout(
            Duration::from_secs(5),
            async {
                tokio::join!(
                    service.get_quotes(&ctx, &first),
                    service.get_quotes(&ctx, &second)
                )
            },
        )
        .await
        .expect("both lookups should reach the provider");
        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(provider.calls(), vec!["quotes:AAPL", "quotes:AAPL"]);
    }

    #[tokio::test]
    async fn test_search_validates_and_clamps() {
        let provider = Arc::new(MockProvider::default());
        let service = service(provider.clone());
        let ctx = RequestContext::new();

        let err = service.search_symbols(&ctx, "  ", Some(5)).await.unwrap_err();
        assert!(err.is_invalid_input());

        service.search_symbols(&ctx, " apple ", Some(50)).await.unwrap();
        service.search_symbols(&ctx, "apple", Some(5)).await.unwrap();
        service.search_symbols(&ctx, "apple", None).await.unwrap();
        assert_eq!(
            provider.calls(),
            vec!["search:apple:10", "search:apple:5", "search:apple:10"]
        );
    }

    #[test]
    fn test_clamp_search_limit() {
        assert_eq!(clamp_search_limit(Some(50)), 10);
        assert_eq!(clamp_search_limit(Some(5)), 5);
        assert_eq!(clamp_search_limit(Some(0)), 10);
        assert_eq!(clamp_search_limit(Some(1)), 1);
        assert_eq!(clamp_search_limit(Some(20)), 20);
        assert_eq!(clamp_search_limit(Some(21)), 10);
        assert_eq!(clamp_search_limit(None), 10);
    }

    #[tokio::test]
    async fn test_cancelled_context_reaches_provider() {
        struct SlowProvider;

        #[async_trait]
        impl MarketDataProvider for SlowProvider {
            async fn fetch_quote(&self, ctx: &RequestContext, _symbol: &str) -> Result<Quote> {
                ctx.run(std::future::pending()).await
            }
            async fn fetch_quotes(
                &self,
                ctx: &RequestContext,
                _symbols: &[String],
            ) -> Result<Vec<Quote>> {
                ctx.run(std::future::pending()).await
            }
            async fn fetch_history(
                &self,
                ctx: &RequestContext,
                _symbol: &str,
                _range: &str,
                _interval: &str,
            ) -> Result<Vec<HistoryPoint>> {
                ctx.run(std::future::pending()).await
            }
            async fn search_symbols(
                &self,
                ctx: &RequestContext,
                _query: &str,
                _limit: usize,
            ) -> Result<Vec<SymbolMatch>> {
                ctx.run(std::future::pending()).await
            }
        }

        let service = QuoteService::new(
            Arc::new(SlowProvider),
            &CacheConfig::default(),
            &TimeoutConfig::default(),
        );
        let ctx = RequestContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = service.get_quote(&ctx, "AAPL").await.unwrap_err();
        assert_eq!(
            err,
            MarketError::TransientUpstream("request cancelled".into())
        );
    }
}
