use crate::core::context::RequestContext;
use crate::core::error::{MarketError, Result};
use crate::core::quote::{normalize_symbol, require_symbol};
use crate::core::repository::WatchlistRepository;
use crate::core::watchlist::{WatchlistItem, WatchlistView};
use crate::services::market::QuoteService;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct WatchlistService {
    repo: Arc<dyn WatchlistRepository>,
    market: Arc<QuoteService>,
}

impl WatchlistService {
    pub fn new(repo: Arc<dyn WatchlistRepository>, market: Arc<QuoteService>) -> Self {
        WatchlistService { repo, market }
    }

    /// The owner's watchlist with quotes. A failed quote fetch degrades to a
    /// view without quotes instead of an error.
    #[instrument(skip(self, ctx))]
    pub async fn list(&self, ctx: &RequestContext, owner: &str) -> Result<WatchlistView> {
        let items = self.repo.list_watchlist(owner).await?;
        if items.is_empty() {
            return Ok(WatchlistView {
                items,
                quotes: Some(Vec::new()),
            });
        }

        let symbols: Vec<String> = items.iter().map(|w| w.symbol.clone()).collect();
        let quotes = match self.market.get_quotes(ctx, &symbols).await {
            Ok(quotes) => Some(quotes),
            Err(e) => {
                warn!(error = %e, "Returning watchlist without quotes");
                None
            }
        };

        Ok(WatchlistView { items, quotes })
    }

    /// Adds `symbol` once it is known to resolve. A symbol already on the
    /// list is reported as `MarketError::Conflict`.
    #[instrument(skip(self, ctx))]
    pub async fn add(&self, ctx: &RequestContext, owner: &str, symbol: &str) -> Result<WatchlistItem> {
        let symbol = require_symbol(symbol)?;
        self.market.get_quote(ctx, &symbol).await?;

        match self.repo.add_watchlist(owner, &symbol).await {
            Ok(item) => {
                info!(%symbol, "Added to watchlist");
                Ok(item)
            }
            Err(MarketError::Conflict(_)) => Err(MarketError::Conflict(format!(
                "{symbol} is already in the watchlist"
            ))),
            Err(e) => Err(e),
        }
    }

    pub async fn remove(&self, owner: &str, symbol: &str) -> Result<()> {
        let symbol = normalize_symbol(symbol);
        self.repo.remove_watchlist(owner, &symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CacheConfig, TimeoutConfig};
    use crate::services::market::tests::MockProvider;
    use crate::store::memory::MemoryRepository;

    fn setup(provider: MockProvider) -> (WatchlistService, Arc<MemoryRepository>, Arc<MockProvider>) {
        let provider = Arc::new(provider);
        let market = Arc::new(QuoteService::new(
            provider.clone(),
            &CacheConfig::default(),
            &TimeoutConfig::default(),
        ));
        let repo = Arc::new(MemoryRepository::new());
        (WatchlistService::new(repo.clone(), market), repo, provider)
    }

    #[tokio::test]
    async fn test_empty_watchlist_requests_no_quotes() {
        let (service, _, provider) = setup(MockProvider::with_prices(&[("AAPL", 1.0)]));

        let view = service.list(&RequestContext::new(), "u1").await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(view.quotes, Some(Vec::new()));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_pairs_quotes_in_one_batch() {
        let (service, repo, provider) =
            setup(MockProvider::with_prices(&[("AAPL", 150.0), ("MSFT", 300.0)]));
        repo.add_watchlist("u1", "AAPL").await.unwrap();
        repo.add_watchlist("u1", "GONE").await.unwrap();
        repo.add_watchlist("u1", "MSFT").await.unwrap();

        let view = service.list(&RequestContext::new(), "u1").await.unwrap();
        assert_eq!(view.items.len(), 3);
        assert_eq!(view.quotes.as_ref().unwrap().len(), 2);
        assert_eq!(view.quote_for("MSFT").unwrap().price, 300.0);
        assert!(view.quote_for("GONE").is_none());
        assert_eq!(provider.calls(), vec!["quotes:AAPL,GONE,MSFT"]);
    }

    #[tokio::test]
    async fn test_list_degrades_on_upstream_failure() {
        let (service, repo, _) = setup(MockProvider::failing());
        repo.add_watchlist("u1", "AAPL").await.unwrap();

        let view = service.list(&RequestContext::new(), "u1").await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert!(view.is_degraded());
    }

    #[tokio::test]
    async fn test_add_rejects_symbol_failing_validation() {
        let (service, repo, _) = setup(MockProvider::with_prices(&[]));

        let err = service
            .add(&RequestContext::new(), "u1", "TYPO")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.list_watchlist("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_blank_symbol() {
        let (service, _, provider) = setup(MockProvider::default());

        let err = service
            .add(&RequestContext::new(), "u1", "  ")
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_duplicate_is_conflict() {
        let (service, _, _) = setup(MockProvider::with_prices(&[("AAPL", 150.0)]));
        let ctx = RequestContext::new();

        let item = service.add(&ctx, "u1", "aapl").await.unwrap();
        assert_eq!(item.symbol, "AAPL");

        let err = service.add(&ctx, "u1", " AAPL ").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "Already exists: AAPL is already in the watchlist");
    }

    #[tokio::test]
    async fn test_remove_normalizes_and_tolerates_absent() {
        let (service, repo, _) = setup(MockProvider::with_prices(&[("AAPL", 150.0)]));
        repo.add_watchlist("u1", "AAPL").await.unwrap();

        service.remove("u1", " aapl").await.unwrap();
        assert!(repo.list_watchlist("u1").await.unwrap().is_empty());

        service.remove("u1", "AAPL").await.unwrap();
    }
}
