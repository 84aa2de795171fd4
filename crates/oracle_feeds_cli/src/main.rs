//! oracle-feeds CLI: gas price at a timestamp, nearest block, Kraken historical price.

use clap::{Args, Parser, Subcommand};
use oracle_feeds::chain::{parse_timestamp, BlockCache, BlockDataProvider, RpcProvider};
use oracle_feeds::compute::resolve_nearest_block;
use oracle_feeds::config::{ChainEndpoint, EndpointsConfig};
use oracle_feeds::feeds::{gas_price_oracle_feed, kraken_historical_feed};
use oracle_feeds::sources::{DataSource, OptionalDataPoint};
use oracle_feeds::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::GasPrice(args) => run_gas_price(args),
        Command::NearestBlock(args) => run_nearest_block(args),
        Command::KrakenPrice(args) => run_kraken_price(args),
    }
}

#[derive(Parser)]
#[command(name = "oracle-feeds")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Timestamped values for oracle reporters (gas price, historical prices)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Median gas price (gwei) of the block nearest to a timestamp.
    GasPrice(ChainArgs),
    /// Block closest to, but not after, a timestamp.
    NearestBlock(ChainArgs),
    /// Kraken trade price at a timestamp.
    KrakenPrice(KrakenArgs),
}

#[derive(Args)]
struct ChainArgs {
    #[arg(long)]
    chain_id: u64,
    /// Unix seconds or RFC3339.
    #[arg(long)]
    timestamp: String,
    /// Overrides the endpoint configured for the chain.
    #[arg(long)]
    rpc_url: Option<String>,
    /// Endpoints file; defaults to the usual search locations.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    #[arg(long)]
    offline: bool,
    /// Start with extended (proof-of-authority) header decoding.
    #[arg(long)]
    poa: bool,
}

#[derive(Args)]
struct KrakenArgs {
    #[arg(long, default_value = "ETH")]
    asset: String,
    #[arg(long, default_value = "USD")]
    currency: String,
    /// Unix seconds or RFC3339.
    #[arg(long)]
    since: String,
}

fn cache_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("blocks.sqlite")
}

fn load_endpoints(args: &ChainArgs) -> Result<EndpointsConfig, Box<dyn std::error::Error>> {
    let mut endpoints = match &args.config {
        Some(path) => EndpointsConfig::load_from_path(path)?,
        None => EndpointsConfig::load(),
    };
    if let Some(url) = &args.rpc_url {
        let existing = endpoints.endpoint(args.chain_id).cloned().unwrap_or_default();
        endpoints = endpoints.with_endpoint(ChainEndpoint {
            chain_id: args.chain_id,
            url: url.clone(),
            ..existing
        });
    }
    if args.poa {
        if let Some(existing) = endpoints.endpoint(args.chain_id).cloned() {
            endpoints = endpoints.with_endpoint(ChainEndpoint {
                proof_of_authority: true,
                ..existing
            });
        }
    }
    Ok(endpoints)
}

fn open_cache(args: &ChainArgs) -> Result<Option<Arc<BlockCache>>, Box<dyn std::error::Error>> {
    Ok(match &args.cache_dir {
        Some(dir) => Some(Arc::new(BlockCache::open(cache_path(dir))?)),
        None => None,
    })
}

fn connect(args: &ChainArgs) -> Result<Arc<RpcProvider>, Box<dyn std::error::Error>> {
    let endpoints = load_endpoints(args)?;
    let mut config = endpoints.rpc_config(args.chain_id)?;
    config.offline = args.offline;
    Ok(Arc::new(RpcProvider::new(config, open_cache(args)?)?))
}

fn datapoint_json(
    dp: &OptionalDataPoint<Decimal>,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let observed_at = dp.observed_at.map(|t| t.format(&Rfc3339)).transpose()?;
    Ok(serde_json::json!({
        "value": dp.value.map(|v| v.to_string()),
        "observed_at": observed_at,
    }))
}

fn run_gas_price(args: ChainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let timestamp = parse_timestamp(&args.timestamp)?;
    let provider = connect(&args)?;
    let feed = gas_price_oracle_feed(
        Some(args.chain_id),
        Some(timestamp),
        EndpointsConfig::default(),
    );
    let query_type = feed.query_type();
    let source = feed.source.with_provider(provider.clone());
    let rt = tokio::runtime::Runtime::new()?;
    let dp = rt.block_on(async { source.fetch_new_datapoint().await })?;
    info!(
        query_type,
        chain_id = args.chain_id,
        requests = provider.request_count(),
        "gas price complete"
    );
    println!("{}", datapoint_json(&dp)?);
    Ok(())
}

fn run_nearest_block(args: ChainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let timestamp = parse_timestamp(&args.timestamp)?;
    let provider = connect(&args)?;
    let rt = tokio::runtime::Runtime::new()?;
    let block = rt.block_on(async {
        let latest = provider.current_block_number().await?;
        Ok::<_, oracle_feeds::ProviderError>(
            resolve_nearest_block(provider.as_ref(), timestamp, 0, latest).await,
        )
    })?;
    info!(requests = provider.request_count(), "nearest block complete");
    let out = match block {
        Some(b) => serde_json::json!({
            "number": b.number,
            "timestamp": b.timestamp,
            "target": timestamp,
        }),
        None => serde_json::json!({ "number": null, "target": timestamp }),
    };
    println!("{}", out);
    Ok(())
}

fn run_kraken_price(args: KrakenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let since = parse_timestamp(&args.since)?;
    let feed = kraken_historical_feed(&args.asset, &args.currency, Some(since))?;
    let rt = tokio::runtime::Runtime::new()?;
    let dp = rt.block_on(async { feed.fetch().await })?;
    info!(query_type = feed.query_type(), "kraken price complete");
    println!("{}", datapoint_json(&dp)?);
    Ok(())
}
