use crate::core::error::{MarketError, Result};
use crate::core::portfolio::Holding;
use crate::core::repository::{HoldingRepository, User, UserRepository, WatchlistRepository};
use crate::core::watchlist::WatchlistItem;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// In-process repository. Nothing survives the process.
#[derive(Default)]
pub struct MemoryRepository {
    holdings: RwLock<Vec<Holding>>,
    watchlist: RwLock<Vec<WatchlistItem>>,
    users: RwLock<Vec<User>>,
    next_id: AtomicI64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl HoldingRepository for MemoryRepository {
    async fn list_holdings(&self, owner: &str) -> Result<Vec<Holding>> {
        let holdings = self.holdings.read().await;
        Ok(holdings.iter().filter(|h| h.owner == owner).cloned().collect())
    }

    async fn add_holding(
        &self,
        owner: &str,
        symbol: &str,
        quantity: f64,
        buy_price: f64,
    ) -> Result<Holding> {
        let holding = Holding {
            id: self.next_id(),
            owner: owner.to_string(),
            symbol: symbol.to_string(),
            quantity,
            buy_price,
        };
        self.holdings.write().await.push(holding.clone());
        debug!(id = holding.id, "Stored holding");
        Ok(holding)
    }

    async fn remove_holding(&self, owner: &str, id: i64) -> Result<()> {
        let mut holdings = self.holdings.write().await;
        holdings.retain(|h| !(h.owner == owner && h.id == id));
        Ok(())
    }
}

#[async_trait]
impl WatchlistRepository for MemoryRepository {
    async fn list_watchlist(&self, owner: &str) -> Result<Vec<WatchlistItem>> {
        let watchlist = self.watchlist.read().await;
        Ok(watchlist.iter().filter(|w| w.owner == owner).cloned().collect())
    }

    async fn add_watchlist(&self, owner: &str, symbol: &str) -> Result<WatchlistItem> {
        let mut watchlist = self.watchlist.write().await;
        if watchlist.iter().any(|w| w.owner == owner && w.symbol == symbol) {
            return Err(MarketError::Conflict(format!("{owner}/{symbol}")));
        }
        let item = WatchlistItem {
            id: self.next_id(),
            owner: owner.to_string(),
            symbol: symbol.to_string(),
        };
        watchlist.push(item.clone());
        Ok(item)
    }

    async fn remove_watchlist(&self, owner: &str, symbol: &str) -> Result<()> {
        let mut watchlist = self.watchlist.write().await;
        watchlist.retain(|w| !(w.owner == owner && w.symbol == symbol));
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn create_user(&self, email: &str) -> Result<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == email) {
            return Err(MarketError::Conflict(format!("user {email}")));
        }
        let user = User {
            id: self.next_id().to_string(),
            email: email.to_string(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }
}
