use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use swap_exchange_core::config::ExchangeConfig;
use swap_exchange_core::proto::v1::exchange_service_server::ExchangeServiceServer;
use swap_exchange_core::rates::PairInfo;
use swap_exchange_core::rates::engine::RateEngine;
use swap_exchange_core::rates::fees::{EstimatingFeeSource, StaticFeeEstimator};
use swap_exchange_core::rates::price::StaticPriceSource;
use swap_exchange_core::service::ExchangeServiceImpl;
use swap_exchange_core::status::distributor::StatusDistributor;
use swap_exchange_core::status::lookup::EsploraTransactionLookup;
use swap_exchange_core::status::reconciler::StatusReconciler;
use swap_exchange_core::swap::store::SqliteSwapStore;
use tonic::transport::Server;

#[derive(Debug, clap::Parser)]
struct Args {
    /// Exchange configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    #[arg(long, default_value = "127.0.0.1:50051")]
    listen_addr: String,

    #[arg(long, default_value = "data/exchange.sqlite")]
    store_path: PathBuf,

    /// Esplora base URL for a currency, as SYMBOL=URL. Repeatable.
    #[arg(long = "esplora-url", value_parser = parse_endpoint)]
    esplora_urls: Vec<(String, String)>,

    #[arg(long)]
    log_json: bool,

    /// Compute every pair once, print them as JSON and exit.
    #[arg(long)]
    print_pairs: bool,
}

fn parse_endpoint(raw: &str) -> Result<(String, String), String> {
    let (symbol, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SYMBOL=URL, got {raw}"))?;
    if symbol.is_empty() || url.is_empty() {
        return Err(format!("expected SYMBOL=URL, got {raw}"));
    }
    Ok((symbol.to_string(), url.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    swap_exchange_core::logging::init_with(args.log_json).ok();

    let cfg = ExchangeConfig::load(&args.config)?;

    let prices = Arc::new(StaticPriceSource::new(cfg.prices.clone()));
    let estimator = Arc::new(StaticFeeEstimator::new(cfg.fee_rates()));
    let fees = Arc::new(EstimatingFeeSource::new(
        estimator,
        cfg.currencies.iter().map(|c| c.symbol.clone()).collect(),
        cfg.percentage_fees(),
    ));

    let mut engine = RateEngine::new(cfg.currencies(), prices, fees)
        .with_reference_asset(&cfg.reference_asset)
        .with_refresh_timeout(cfg.refresh_timeout());
    let report = engine
        .initialize(cfg.pair_ids())
        .await
        .context("initialize rate engine")?;
    if !report.failed.is_empty() || !report.not_tradable.is_empty() {
        tracing::warn!(
            failed = report.failed.len(),
            not_tradable = report.not_tradable.len(),
            "some pairs are not tradable after startup"
        );
    }

    if args.print_pairs {
        let infos = engine.get_pairs();
        let pairs: Vec<&PairInfo> = infos.iter().map(Arc::as_ref).collect();
        println!("{}", serde_json::to_string_pretty(&pairs)?);
        return Ok(());
    }

    let listen_addr: SocketAddr = args.listen_addr.parse().context("parse listen_addr")?;

    let store = Arc::new(SqliteSwapStore::open(args.store_path).context("open sqlite store")?);
    let lookup = Arc::new(EsploraTransactionLookup::new(args.esplora_urls));
    let table = StatusReconciler::new(store, lookup)
        .reconcile()
        .await
        .context("reconcile swap statuses")?;

    let statuses = Arc::new(StatusDistributor::with_table(table));
    tracing::info!(swaps = statuses.len(), "swap status table ready");

    let rates = Arc::new(engine);
    rates.clone().spawn_refresh_loop(cfg.rate_refresh_interval());

    let svc = ExchangeServiceImpl::new(rates, statuses);

    tracing::info!(%listen_addr, "starting exchange gRPC server");

    Server::builder()
        .add_service(ExchangeServiceServer::new(svc))
        .serve(listen_addr)
        .await
        .context("serve gRPC")?;

    Ok(())
}
