//! Persistence contracts consumed by the services.
//!
//! Implementations live in `crate::store`. Every call is assumed to be
//! transactional on its own; symbols arrive already normalized.

use crate::core::error::Result;
use crate::core::portfolio::Holding;
use crate::core::watchlist::WatchlistItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

#[async_trait]
pub trait HoldingRepository: Send + Sync {
    async fn list_holdings(&self, owner: &str) -> Result<Vec<Holding>>;

    async fn add_holding(
        &self,
        owner: &str,
        symbol: &str,
        quantity: f64,
        buy_price: f64,
    ) -> Result<Holding>;

    /// Removing an id the owner does not have is not an error.
    async fn remove_holding(&self, owner: &str, id: i64) -> Result<()>;
}

#[async_trait]
pub trait WatchlistRepository: Send + Sync {
    async fn list_watchlist(&self, owner: &str) -> Result<Vec<WatchlistItem>>;

    /// Fails with `MarketError::Conflict` when the owner already watches `symbol`.
    async fn add_watchlist(&self, owner: &str, symbol: &str) -> Result<WatchlistItem>;

    async fn remove_watchlist(&self, owner: &str, symbol: &str) -> Result<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `MarketError::Conflict` when the email is taken.
    async fn create_user(&self, email: &str) -> Result<User>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn user_by_id(&self, id: &str) -> Result<Option<User>>;
}
