mod analytics;
mod api;
mod config;
mod error;
mod model;
mod provider;
mod service;
mod storage;

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use model::Period;
use provider::MarketDataProvider;
use provider::yahoo::YahooProvider;
use service::PriceService;
use service::prices::FetchRequest;
use storage::Storage;
use storage::sqlite::SqliteStorage;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("market data provider error")]
    Provider,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "stock-tracker", about = "Stock price tracker with trend analytics")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Prefetch configured symbols and serve the HTTP API (default)
    Serve,
    /// Fetch daily history for one symbol and store it
    Fetch {
        symbol: String,
        /// Lookback keyword (1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max)
        #[arg(short, long, default_value = "1mo")]
        period: String,
        /// First day to fetch (YYYY-MM-DD); requires --end
        #[arg(long, requires = "end")]
        start: Option<NaiveDate>,
        /// Last day to fetch (YYYY-MM-DD); requires --start
        #[arg(long, requires = "start")]
        end: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Storage ───────────────────────────────────────────────────────────────
    let data_dir = &config.general.data_dir;
    std::fs::create_dir_all(data_dir)
        .change_context(AppError::Storage)
        .attach_with(|| format!("data_dir: {data_dir}"))?;

    let db_path = format!("{data_dir}/stock-tracker.db");
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::open(Path::new(&db_path))
            .await
            .change_context(AppError::Storage)?,
    );

    // ── Provider ──────────────────────────────────────────────────────────────
    let provider: Arc<dyn MarketDataProvider> = Arc::new(
        YahooProvider::new(
            &config.provider.base_url,
            config.provider.requests_per_second,
        )
        .change_context(AppError::Provider)?,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, storage, provider).await,
        Command::Fetch {
            symbol,
            period,
            start,
            end,
        } => {
            let period = Period::from_str(&period).ok_or_else(|| {
                Report::new(AppError::Config).attach(format!("unknown period \"{period}\""))
            })?;
            let prices = PriceService::new(
                storage,
                provider,
                config.analytics.display_precision,
            );
            let summary = prices
                .fetch_and_store(FetchRequest {
                    symbol,
                    start,
                    end,
                    period,
                })
                .await
                .change_context(AppError::Provider)?;
            println!(
                "{}: fetched {} prices, {} new (stock_id {})",
                summary.symbol, summary.total_fetched, summary.new_records, summary.stock_id
            );
            Ok(())
        }
    }
}

async fn serve(
    config: &AppConfig,
    storage: Arc<dyn Storage>,
    provider: Arc<dyn MarketDataProvider>,
) -> Result<(), Report<AppError>> {
    // ── Startup prefetch ──────────────────────────────────────────────────────
    // The provider rate limits internally, so all symbols are spawned at once.
    let prices = PriceService::new(
        Arc::clone(&storage),
        Arc::clone(&provider),
        config.analytics.display_precision,
    );
    let mut prefetch_handles = Vec::new();
    for entry in &config.symbols {
        let prices = prices.clone();
        let request = FetchRequest {
            symbol: entry.symbol.clone(),
            period: entry.period(),
            ..Default::default()
        };
        prefetch_handles.push(tokio::spawn(async move {
            let symbol = request.symbol.clone();
            match prices.fetch_and_store(request).await {
                Ok(summary) => info!(
                    symbol = %summary.symbol,
                    new_records = summary.new_records,
                    "prefetch complete"
                ),
                Err(e) => tracing::warn!(symbol = %symbol, error = ?e, "prefetch failed (continuing)"),
            }
        }));
    }
    for handle in prefetch_handles {
        handle.await.change_context(AppError::Runtime)?;
    }

    // ── HTTP server ───────────────────────────────────────────────────────────
    let state = api::AppState::new(storage, provider, config.analytics.settings());
    let app = api::router(state, config.server.cors_header_values());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .change_context(AppError::Runtime)
        .attach_with(|| format!("bind address: {addr}"))?;
    info!(%addr, "HTTP server listening");

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl+c received, shutting down");
        }
        signal_cancel.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .change_context(AppError::Runtime)?;

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
