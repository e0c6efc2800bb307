use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tickerbook::core::log::init_logging;
use tickerbook::{AppCommand, PortfolioCommand, WatchlistCommand};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show the latest quote for a symbol
    Quote { symbol: String },
    /// Show daily closes for a symbol
    History {
        symbol: String,
        /// Period to cover, e.g. 5d, 1mo, 1y
        #[arg(short, long)]
        range: Option<String>,
        /// Bar size, e.g. 1d, 1wk
        #[arg(short, long)]
        interval: Option<String>,
    },
    /// Search for symbols by name or ticker
    Search {
        query: String,
        /// Maximum number of results (1-20)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show or edit holdings
    Portfolio {
        #[command(subcommand)]
        action: Option<PortfolioAction>,
    },
    /// Show or edit the watchlist
    Watchlist {
        #[command(subcommand)]
        action: Option<WatchlistAction>,
    },
}

#[derive(Subcommand)]
enum PortfolioAction {
    /// Record a position
    Add {
        symbol: String,
        quantity: f64,
        buy_price: f64,
    },
    /// Delete a position by id
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum WatchlistAction {
    /// Start watching a symbol
    Add { symbol: String },
    /// Stop watching a symbol
    Remove { symbol: String },
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::Quote { symbol } => AppCommand::Quote { symbol },
            Commands::History {
                symbol,
                range,
                interval,
            } => AppCommand::History {
                symbol,
                range,
                interval,
            },
            Commands::Search { query, limit } => AppCommand::Search { query, limit },
            Commands::Portfolio { action } => AppCommand::Portfolio(match action {
                None => PortfolioCommand::Show,
                Some(PortfolioAction::Add {
                    symbol,
                    quantity,
                    buy_price,
                }) => PortfolioCommand::Add {
                    symbol,
                    quantity,
                    buy_price,
                },
                Some(PortfolioAction::Remove { id }) => PortfolioCommand::Remove { id },
            }),
            Commands::Watchlist { action } => AppCommand::Watchlist(match action {
                None => WatchlistCommand::Show,
                Some(WatchlistAction::Add { symbol }) => WatchlistCommand::Add { symbol },
                Some(WatchlistAction::Remove { symbol }) => WatchlistCommand::Remove { symbol },
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => tickerbook::cli::setup::setup_at_path(path),
            None => tickerbook::cli::setup::setup(),
        },
        Some(cmd) => tickerbook::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
