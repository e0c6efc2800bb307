use crate::core::quote::{Quote, normalize_symbol};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub id: i64,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub owner: String,
    pub symbol: String,
}

/// A watchlist together with whatever quotes could be fetched for it.
///
/// `quotes` is `None` when the quote fetch failed as a whole; the items are
/// still returned so the caller can show a stale list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WatchlistView {
    pub items: Vec<WatchlistItem>,
    pub quotes: Option<Vec<Quote>>,
}

impl WatchlistView {
    /// Quote for `symbol`, matched by symbol rather than position.
    pub fn quote_for(&self, symbol: &str) -> Option<&Quote> {
        let symbol = normalize_symbol(symbol);
        self.quotes
            .as_ref()?
            .iter()
            .find(|q| normalize_symbol(&q.symbol) == symbol)
    }

    /// Items paired with their quote, in watchlist order.
    pub fn pairs(&self) -> impl Iterator<Item = (&WatchlistItem, Option<&Quote>)> {
        self.items
            .iter()
            .map(move |item| (item, self.quote_for(&item.symbol)))
    }

    pub fn is_degraded(&self) -> bool {
        self.quotes.is_none()
    }
}
