use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chain_crawler::api::{self, AppState};
use chain_crawler::config::{AppCfg, LogCfg, LogFormat};
use chain_crawler::contracts::ContractRegistry;
use chain_crawler::{Crawler, PgStore, RangeScheduler, RpcChainSource, Store};

fn init_tracing(cfg: &LogCfg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    match cfg.format {
        LogFormat::Compact => tracing_subscriber::fmt().with_env_filter(filter).compact().init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cfg_path = std::env::args().nth(1).unwrap_or_else(|| "./config.yaml".to_string());
    let cfg = AppCfg::load(&cfg_path).with_context(|| format!("Failed to load config {}", cfg_path))?;

    init_tracing(&cfg.log);
    info!("Configuration loaded from {}", cfg_path);

    let contracts = match &cfg.contracts_config {
        Some(path) => ContractRegistry::from_file(path)
            .with_context(|| format!("Invalid contract configuration {}", path))?,
        None => ContractRegistry::empty(),
    };

    let scheduler = RangeScheduler::new(
        cfg.indexing.start_block,
        cfg.indexing.end_block,
        cfg.indexing.batch_size,
        cfg.batch_delay(),
    )?;

    // deps
    let chain = RpcChainSource::connect(&cfg.chain)
        .await
        .context("RPC endpoint is unreachable")?;
    let store = Arc::new(PgStore::connect(&cfg.postgres.dsn).await.context("Failed to initialize PostgreSQL")?);
    store.test_connection().await?;

    let api_handle = cfg.api.clone().map(|api_cfg| {
        let state = AppState {
            store: Arc::clone(&store),
            defaults: cfg.report.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = api::serve(&api_cfg, state).await {
                error!("Stats API stopped: {}", e);
            }
        })
    });

    let crawler = Crawler::new(chain, Arc::clone(&store), Arc::new(contracts));
    let summary = crawler.run(&scheduler).await;

    let totals = summary.totals();
    info!(
        "Crawl finished: {} batches completed, blocks {:?}, transactions {:?} ({} skipped), transfers {:?}, events {:?} ({} decode failures)",
        summary.completed_batches().count(),
        totals.blocks,
        totals.transactions,
        totals.skipped_transactions,
        totals.token_transfers,
        totals.contract_events,
        totals.event_decode_failures,
    );
    for (batch, reason) in summary.failed_ranges() {
        warn!("Blocks {} were not ingested: {}", batch, reason);
    }

    match store
        .top_tokens_by_volume(cfg.report.top_tokens_limit, cfg.report.window_days)
        .await
    {
        Ok(tokens) => {
            info!(
                "Top {} tokens by volume over the last {} days:",
                cfg.report.top_tokens_limit, cfg.report.window_days
            );
            for (rank, token) in tokens.iter().enumerate() {
                info!(
                    "{}. {} volume={} transfers={} senders={} receivers={}",
                    rank + 1,
                    token.token_address,
                    token.total_volume,
                    token.transfer_count,
                    token.unique_senders,
                    token.unique_receivers
                );
            }
        }
        Err(e) => error!("Top tokens query failed: {}", e),
    }

    if let Some(handle) = api_handle {
        info!("Crawl done, stats API still serving. Press Ctrl-C to exit");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutting down"),
            _ = handle => warn!("Stats API task exited"),
        }
    }

    Ok(())
}
