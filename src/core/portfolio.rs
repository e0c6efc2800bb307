//! Profit and loss calculations for a set of holdings.
use crate::core::quote::{Quote, normalize_symbol, percent_change};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A persisted position. Quantity and buy price are strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: i64,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub owner: String,
    pub symbol: String,
    pub quantity: f64,
    pub buy_price: f64,
}

/// A holding valued at its current price.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingWithQuote {
    #[serde(flatten)]
    pub holding: Holding,
    pub current_price: f64,
    pub market_value: f64,
    pub cost_basis: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub holdings: Vec<HoldingWithQuote>,
    pub total_value: f64,
    pub total_cost: f64,
    #[serde(rename = "totalPnL")]
    pub total_pnl: f64,
    pub return_pct: f64,
}

/// Outcome of resolving a single symbol during a batch lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteResolution {
    Resolved(Quote),
    NotFound,
    FetchFailed(String),
}

/// Per-symbol results of a batch quote lookup, keyed by normalized symbol.
#[derive(Debug, Clone, Default)]
pub struct QuoteBook {
    entries: HashMap<String, QuoteResolution>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, resolution: QuoteResolution) {
        self.entries.insert(normalize_symbol(symbol), resolution);
    }

    pub fn get(&self, symbol: &str) -> Option<&QuoteResolution> {
        self.entries.get(&normalize_symbol(symbol))
    }

    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        match self.get(symbol) {
            Some(QuoteResolution::Resolved(quote)) => Some(quote),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Symbols that did not resolve, with the reason.
    pub fn unresolved(&self) -> impl Iterator<Item = (&str, &QuoteResolution)> {
        self.entries
            .iter()
            .filter(|(_, r)| !matches!(r, QuoteResolution::Resolved(_)))
            .map(|(s, r)| (s.as_str(), r))
    }
}

/// Source of current prices for [`compute_summary`].
pub trait QuoteLookup {
    fn price_of(&self, symbol: &str) -> Option<f64>;
}

impl QuoteLookup for QuoteBook {
    fn price_of(&self, symbol: &str) -> Option<f64> {
        self.quote(symbol).map(|q| q.price)
    }
}

impl QuoteLookup for HashMap<String, f64> {
    fn price_of(&self, symbol: &str) -> Option<f64> {
        self.get(&normalize_symbol(symbol)).copied()
    }
}

impl HoldingWithQuote {
    pub fn new(holding: Holding, current_price: f64) -> Self {
        let market_value = holding.quantity * current_price;
        let cost_basis = holding.quantity * holding.buy_price;
        let pnl = market_value - cost_basis;
        HoldingWithQuote {
            holding,
            current_price,
            market_value,
            cost_basis,
            pnl,
            pnl_percent: percent_change(market_value, cost_basis),
        }
    }
}

/// Values every holding at its current price and totals the portfolio.
///
/// A holding whose price is missing (or not positive) is valued at its buy
/// price, so it contributes zero P&L instead of failing the whole summary.
pub fn compute_summary(holdings: &[Holding], quotes: &dyn QuoteLookup) -> PortfolioSummary {
    let mut summary = PortfolioSummary::default();

    for holding in holdings {
        let current_price = match quotes.price_of(&holding.symbol) {
            Some(price) if price > 0.0 => price,
            _ => {
                warn!(
                    symbol = %holding.symbol,
                    "No current price, valuing holding at buy price"
                );
                holding.buy_price
            }
        };

        let valued = HoldingWithQuote::new(holding.clone(), current_price);
        summary.total_value += valued.market_value;
        summary.total_cost += valued.cost_basis;
        summary.holdings.push(valued);
    }

    summary.total_pnl = summary.total_value - summary.total_cost;
    summary.return_pct = percent_change(summary.total_value, summary.total_cost);
    debug!(
        holdings = summary.holdings.len(),
        total_value = summary.total_value,
        "Computed portfolio summary"
    );
    summary
}
