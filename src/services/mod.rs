//! Orchestration over the provider, caches and repositories

pub mod market;
pub mod portfolio;
pub mod watchlist;

pub use market::QuoteService;
pub use portfolio::PortfolioService;
pub use watchlist::WatchlistService;
