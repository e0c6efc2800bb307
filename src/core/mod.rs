//! Core types, contracts and pure logic

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod log;
pub mod portfolio;
pub mod quote;
pub mod repository;
pub mod watchlist;

// Re-export main types for cleaner imports
pub use context::RequestContext;
pub use error::MarketError;
pub use portfolio::{Holding, HoldingWithQuote, PortfolioSummary, QuoteBook, QuoteResolution};
pub use quote::{HistoryPoint, MarketDataProvider, Quote, SymbolMatch, normalize_symbol};
pub use repository::{HoldingRepository, User, UserRepository, WatchlistRepository};
pub use watchlist::{WatchlistItem, WatchlistView};
