use crate::core::error::{MarketError, Result};
use crate::core::portfolio::Holding;
use crate::core::repository::{HoldingRepository, User, UserRepository, WatchlistRepository};
use crate::core::watchlist::WatchlistItem;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

const NEXT_ID_KEY: &[u8] = b"next_id";

/// Repository persisted in a fjall keyspace.
///
/// Rows are JSON encoded and keyed `<owner>\0<...>`, so an owner's rows are a
/// single prefix scan. Writes that read before writing (id allocation, the
/// watchlist uniqueness check) are serialized through `write_lock`.
pub struct DiskRepository {
    keyspace: Keyspace,
    holdings: PartitionHandle,
    watchlist: PartitionHandle,
    users: PartitionHandle,
    meta: PartitionHandle,
    write_lock: Mutex<()>,
}

fn owner_prefix(owner: &str) -> Vec<u8> {
    format!("{owner}\0").into_bytes()
}

fn holding_key(owner: &str, id: i64) -> Vec<u8> {
    format!("{owner}\0{id:020}").into_bytes()
}

fn watchlist_key(owner: &str, symbol: &str) -> Vec<u8> {
    format!("{owner}\0{symbol}").into_bytes()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| MarketError::Persistence(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| MarketError::Persistence(e.to_string()))
}

impl DiskRepository {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            MarketError::Persistence(format!("cannot create {}: {e}", path.display()))
        })?;
        let keyspace = fjall::Config::new(path).open()?;
        let open = |name: &str| keyspace.open_partition(name, PartitionCreateOptions::default());

        let holdings = open("holdings")?;
        let watchlist = open("watchlist")?;
        let users = open("users")?;
        let meta = open("meta")?;
        debug!("Opened store at {}", path.display());

        Ok(Self {
            keyspace,
            holdings,
            watchlist,
            users,
            meta,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| MarketError::Persistence("store lock poisoned".to_string()))
    }

    /// Allocates the next row id. Callers must hold `write_lock`.
    fn allocate_id(&self) -> Result<i64> {
        let current = match self.meta.get(NEXT_ID_KEY)? {
            Some(bytes) => {
                let raw = <[u8; 8]>::try_from(&*bytes).map_err(|_| {
                    MarketError::Persistence("corrupt id counter".to_string())
                })?;
                i64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current + 1;
        self.meta.insert(NEXT_ID_KEY, next.to_be_bytes().to_vec())?;
        Ok(next)
    }

    fn persist(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, partition: &PartitionHandle, owner: &str) -> Result<Vec<T>> {
        partition
            .prefix(owner_prefix(owner))
            .map(|kv| {
                let (_, value) = kv?;
                decode(&value)
            })
            .collect()
    }
}

#[async_trait]
impl HoldingRepository for DiskRepository {
    async fn list_holdings(&self, owner: &str) -> Result<Vec<Holding>> {
        let mut holdings: Vec<Holding> = self.scan(&self.holdings, owner)?;
        for holding in &mut holdings {
            holding.owner = owner.to_string();
        }
        Ok(holdings)
    }

    async fn add_holding(
        &self,
        owner: &str,
        symbol: &str,
        quantity: f64,
        buy_price: f64,
    ) -> Result<Holding> {
        let _guard = self.lock()?;
        let holding = Holding {
            id: self.allocate_id()?,
            owner: owner.to_string(),
            symbol: symbol.to_string(),
            quantity,
            buy_price,
        };
        self.holdings
            .insert(holding_key(owner, holding.id), encode(&holding)?)?;
        self.persist()?;
        debug!(id = holding.id, "Stored holding");
        Ok(holding)
    }

    async fn remove_holding(&self, owner: &str, id: i64) -> Result<()> {
        self.holdings.remove(holding_key(owner, id))?;
        self.persist()
    }
}

#[async_trait]
impl WatchlistRepository for DiskRepository {
    async fn list_watchlist(&self, owner: &str) -> Result<Vec<WatchlistItem>> {
        let mut items: Vec<WatchlistItem> = self.scan(&self.watchlist, owner)?;
        items.sort_by_key(|item| item.id);
        for item in &mut items {
            item.owner = owner.to_string();
        }
        Ok(items)
    }

    async fn add_watchlist(&self, owner: &str, symbol: &str) -> Result<WatchlistItem> {
        let _guard = self.lock()?;
        let key = watchlist_key(owner, symbol);
        if self.watchlist.contains_key(&key)? {
            return Err(MarketError::Conflict(format!("{owner}/{symbol}")));
        }
        let item = WatchlistItem {
            id: self.allocate_id()?,
            owner: owner.to_string(),
            symbol: symbol.to_string(),
        };
        self.watchlist.insert(key, encode(&item)?)?;
        self.persist()?;
        Ok(item)
    }

    async fn remove_watchlist(&self, owner: &str, symbol: &str) -> Result<()> {
        self.watchlist.remove(watchlist_key(owner, symbol))?;
        self.persist()
    }
}

#[async_trait]
impl UserRepository for DiskRepository {
    async fn create_user(&self, email: &str) -> Result<User> {
        let _guard = self.lock()?;
        let email_key = format!("email:{email}").into_bytes();
        if self.users.contains_key(&email_key)? {
            return Err(MarketError::Conflict(format!("user {email}")));
        }
        let user = User {
            id: self.allocate_id()?.to_string(),
            email: email.to_string(),
        };
        self.users
            .insert(format!("id:{}", user.id).into_bytes(), encode(&user)?)?;
        self.users.insert(email_key, user.id.clone().into_bytes())?;
        self.persist()?;
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.users.get(format!("email:{email}"))? {
            Some(id) => {
                let id = String::from_utf8_lossy(&id).into_owned();
                self.user_by_id(&id).await
            }
            None => Ok(None),
        }
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.users
            .get(format!("id:{id}"))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
}
