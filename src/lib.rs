pub mod cli;
pub mod core;
pub mod providers;
pub mod services;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::context::RequestContext;
use crate::core::repository::UserRepository;
use crate::providers::yahoo_finance::YahooFinanceProvider;
use crate::services::{PortfolioService, QuoteService, WatchlistService};
use crate::store::DiskRepository;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub enum AppCommand {
    Quote {
        symbol: String,
    },
    History {
        symbol: String,
        range: Option<String>,
        interval: Option<String>,
    },
    Search {
        query: String,
        limit: Option<usize>,
    },
    Portfolio(PortfolioCommand),
    Watchlist(WatchlistCommand),
}

pub enum PortfolioCommand {
    Show,
    Add {
        symbol: String,
        quantity: f64,
        buy_price: f64,
    },
    Remove {
        id: i64,
    },
}

pub enum WatchlistCommand {
    Show,
    Add { symbol: String },
    Remove { symbol: String },
}

/// Services wired from a loaded configuration.
pub struct App {
    pub market: Arc<QuoteService>,
    pub portfolio: PortfolioService,
    pub watchlist: WatchlistService,
    /// Id of the configured account; scopes every repository call
    pub owner: String,
}

impl App {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let provider = YahooFinanceProvider::new(config.yahoo_base_url())?;
        let market = Arc::new(QuoteService::new(
            Arc::new(provider),
            &config.cache,
            &config.timeouts,
        ));

        let data_path = config.default_data_path()?;
        let repo = Arc::new(
            DiskRepository::open(&data_path)
                .with_context(|| format!("Failed to open store at {}", data_path.display()))?,
        );
        let owner = resolve_owner(repo.as_ref(), &config.owner_email).await?;

        Ok(App {
            portfolio: PortfolioService::new(repo.clone(), Arc::clone(&market)),
            watchlist: WatchlistService::new(repo, Arc::clone(&market)),
            market,
            owner,
        })
    }
}

async fn resolve_owner(users: &dyn UserRepository, email: &str) -> Result<String> {
    if let Some(user) = users.user_by_email(email).await? {
        debug!(id = %user.id, "Using existing account");
        return Ok(user.id);
    }
    let user = users.create_user(email).await?;
    info!(id = %user.id, %email, "Created account");
    Ok(user.id)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Tickerbook starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let app = App::from_config(&config).await?;

    let ctx = RequestContext::new();
    let interrupt = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling in-flight requests");
                ctx.cancel();
            }
        })
    };

    let result = dispatch(&app, &ctx, command).await;
    interrupt.abort();
    result
}

async fn dispatch(app: &App, ctx: &RequestContext, command: AppCommand) -> Result<()> {
    let owner = app.owner.as_str();
    match command {
        AppCommand::Quote { symbol } => cli::market::run_quote(ctx, &app.market, &symbol).await,
        AppCommand::History {
            symbol,
            range,
            interval,
        } => {
            cli::market::run_history(
                ctx,
                &app.market,
                &symbol,
                range.as_deref(),
                interval.as_deref(),
            )
            .await
        }
        AppCommand::Search { query, limit } => {
            cli::market::run_search(ctx, &app.market, &query, limit).await
        }
        AppCommand::Portfolio(PortfolioCommand::Show) => {
            cli::portfolio::run_summary(ctx, &app.portfolio, owner).await
        }
        AppCommand::Portfolio(PortfolioCommand::Add {
            symbol,
            quantity,
            buy_price,
        }) => {
            cli::portfolio::run_add(ctx, &app.portfolio, owner, &symbol, quantity, buy_price).await
        }
        AppCommand::Portfolio(PortfolioCommand::Remove { id }) => {
            cli::portfolio::run_remove(&app.portfolio, owner, id).await
        }
        AppCommand::Watchlist(WatchlistCommand::Show) => {
            cli::watchlist::run_list(ctx, &app.watchlist, owner).await
        }
        AppCommand::Watchlist(WatchlistCommand::Add { symbol }) => {
            cli::watchlist::run_add(ctx, &app.watchlist, owner, &symbol).await
        }
        AppCommand::Watchlist(WatchlistCommand::Remove { symbol }) => {
            cli::watchlist::run_remove(&app.watchlist, owner, &symbol).await
        }
    }
}
