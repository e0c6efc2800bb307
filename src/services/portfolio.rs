use crate::core::context::RequestContext;
use crate::core::error::{MarketError, Result};
use crate::core::portfolio::{Holding, PortfolioSummary, compute_summary};
use crate::core::quote::require_symbol;
use crate::core::repository::HoldingRepository;
use crate::services::market::QuoteService;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Holdings management and real-time P&L for an owner's portfolio.
pub struct PortfolioService {
    repo: Arc<dyn HoldingRepository>,
    market: Arc<QuoteService>,
}

impl PortfolioService {
    pub fn new(repo: Arc<dyn HoldingRepository>, market: Arc<QuoteService>) -> Self {
        PortfolioService { repo, market }
    }

    /// Values the owner's holdings. Missing quotes never fail the summary;
    /// those holdings are valued at their buy price.
    #[instrument(skip(self, ctx))]
    pub async fn summary(&self, ctx: &RequestContext, owner: &str) -> Result<PortfolioSummary> {
        let holdings = self.repo.list_holdings(owner).await?;
        if holdings.is_empty() {
            return Ok(PortfolioSummary::default());
        }

        let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
        let quotes = self.market.resolve_quotes(ctx, &symbols).await;
        for (symbol, resolution) in quotes.unresolved() {
            warn!(%symbol, ?resolution, "Quote unavailable for holding");
        }

        Ok(compute_summary(&holdings, &quotes))
    }

    /// Records a new position after checking that the symbol resolves to a
    /// real quote.
    #[instrument(skip(self, ctx))]
    pub async fn add_holding(
        &self,
        ctx: &RequestContext,
        owner: &str,
        symbol: &str,
        quantity: f64,
        buy_price: f64,
    ) -> Result<Holding> {
        let symbol = require_symbol(symbol)?;
        if !(quantity > 0.0 && quantity.is_finite()) {
            return Err(MarketError::InvalidInput(
                "quantity must be greater than zero".to_string(),
            ));
        }
        if !(buy_price > 0.0 && buy_price.is_finite()) {
            return Err(MarketError::InvalidInput(
                "buy price must be greater than zero".to_string(),
            ));
        }

        self.market.get_quote(ctx, &symbol).await?;

        let holding = self
            .repo
            .add_holding(owner, &symbol, quantity, buy_price)
            .await?;
        info!(id = holding.id, %symbol, "Added holding");
        Ok(holding)
    }

    pub async fn remove_holding(&self, owner: &str, id: i64) -> Result<()> {
        self.repo.remove_holding(owner, id).await
    }
}
