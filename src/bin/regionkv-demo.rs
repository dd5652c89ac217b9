//! regionkv Demo Binary
//!
//! Writes and reads back a test record through whichever region is
//! currently primary, round after round.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use regionkv::client::Connector;
use regionkv::{
    AttributeValue, ConnectionManager, Item, LocalCluster, LocalConnector, ManagerConfig,
    RegionAccess, RegionEndpoint, RegionalConnection, RemoteConnector,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Multi-region failover demo
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Region endpoint, as id=host:port (repeatable, in preference order)
    #[arg(short, long = "region")]
    regions: Vec<RegionEndpoint>,

    /// Use an in-process cluster instead of network endpoints
    #[arg(long, conflicts_with = "regions")]
    local: bool,

    /// In local mode, switch the writable region after this many rounds
    #[arg(long)]
    flip_after: Option<u32>,

    /// Number of put/get rounds
    #[arg(short = 'n', long, default_value_t = 10)]
    rounds: u32,

    /// Pause between rounds in milliseconds
    #[arg(long, default_value_t = 1000)]
    round_delay_ms: u64,

    /// Background poll interval in milliseconds
    #[arg(long, default_value_t = 5000)]
    poll_interval_ms: u64,

    /// Per-call timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// How long to wait for a primary before giving up, in seconds
    #[arg(long, default_value_t = 30)]
    wait_secs: u64,

    /// Table used for the test record
    #[arg(long, default_value = "Person")]
    table: String,

    /// List and describe tables after the last round
    #[arg(long)]
    describe: bool,
}

const LOCAL_REGIONS: [&str; 2] = ["us-east-2", "us-west-2"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("regionkv=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = ManagerConfig::default()
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
        .with_request_timeout(Duration::from_millis(args.timeout_ms));

    let cluster = if args.local {
        let cluster = LocalCluster::with_regions(&LOCAL_REGIONS);
        cluster.create_table(&args.table, "last-name", Some("first-name"));
        cluster.set_access(LOCAL_REGIONS[0], RegionAccess::Denied);
        config = config.with_regions(
            LOCAL_REGIONS
                .iter()
                .map(|region| RegionEndpoint::new(*region, "local")),
        );
        Some(cluster)
    } else {
        if args.regions.is_empty() {
            anyhow::bail!("give at least one --region id=host:port, or --local");
        }
        config = config.with_regions(args.regions.clone());
        None
    };

    let connector: Arc<dyn Connector> = match &cluster {
        Some(cluster) => Arc::new(LocalConnector::new(cluster.clone())),
        None => Arc::new(RemoteConnector::new()),
    };

    let manager = ConnectionManager::start(config, connector)
        .await
        .context("starting connection manager")?;
    info!(status = %manager.status().await, "Manager ready");

    let wait = Duration::from_secs(args.wait_secs);
    for round in 1..=args.rounds {
        if let (Some(cluster), Some(flip)) = (&cluster, args.flip_after) {
            if round == flip + 1 {
                info!("Switching writable region to {}", LOCAL_REGIONS[0]);
                cluster.set_access(LOCAL_REGIONS[0], RegionAccess::Allowed);
                cluster.set_access(LOCAL_REGIONS[1], RegionAccess::Denied);
            }
        }

        let primary = wait_for_primary(&manager, wait).await?;
        if let Err(e) = run_round(&primary, &args.table, round).await {
            warn!(round, region = %primary.region(), error = %e, "Round failed");
        }

        tokio::time::sleep(Duration::from_millis(args.round_delay_ms)).await;
    }

    if args.describe {
        let primary = wait_for_primary(&manager, wait).await?;
        let tables = primary.list_tables().await?;
        info!(region = %primary.region(), tables = ?tables, "Tables");
        for table in &tables {
            info!("{}", primary.describe_table(table).await?);
        }
    }

    info!(status = %manager.status().await, "Final status");
    info!("{}", manager.metrics().summary());
    manager.shutdown().await;
    Ok(())
}

/// Poll for a primary with exponential backoff until `wait` runs out
async fn wait_for_primary(
    manager: &ConnectionManager,
    wait: Duration,
) -> anyhow::Result<Arc<RegionalConnection>> {
    let deadline = Instant::now() + wait;
    let mut backoff = Duration::from_millis(100);

    loop {
        if let Some(primary) = manager.get_primary_connection() {
            return Ok(primary);
        }
        if Instant::now() + backoff > deadline {
            anyhow::bail!("no primary region after {:?}", wait);
        }
        info!(backoff = ?backoff, "No primary region yet, waiting");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(Duration::from_secs(2));
    }
}

async fn run_round(primary: &RegionalConnection, table: &str, round: u32) -> regionkv::Result<()> {
    let mut key = Item::new();
    key.insert("last-name".into(), AttributeValue::s("Scriffiny"));
    key.insert("first-name".into(), AttributeValue::s("Patty"));

    let mut item = key.clone();
    item.insert("timestamp".into(), AttributeValue::s(Utc::now().to_rfc3339()));
    item.insert("round".into(), AttributeValue::n(round));

    primary.put(table, item).await?;
    let found = primary.get(table, &key).await?;

    let timestamp = found
        .as_ref()
        .and_then(|item| item.get("timestamp"))
        .map(|value| value.to_string())
        .unwrap_or_else(|| "<missing>".to_string());
    info!(round, region = %primary.region(), timestamp = %timestamp, "Record written and read back");
    Ok(())
}
