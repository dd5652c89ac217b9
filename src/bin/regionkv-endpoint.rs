//! regionkv Endpoint Binary
//!
//! Serves the regions of one in-process cluster, each on its own port.

use clap::Parser;
use regionkv::server::{EndpointConfig, EndpointServer};
use regionkv::{LocalCluster, RegionAccess};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Local multi-region store endpoints
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Region and port to serve, as id=port (repeatable)
    #[arg(short, long = "region", value_parser = parse_region, required = true)]
    regions: Vec<(String, u16)>,

    /// Regions that start out denying access (repeatable)
    #[arg(long)]
    deny: Vec<String>,

    /// Table created at startup
    #[arg(long, default_value = "Person")]
    table: String,

    /// Partition key attribute of the table
    #[arg(long, default_value = "last-name")]
    partition_key: String,

    /// Sort key attribute of the table
    #[arg(long, default_value = "first-name")]
    sort_key: String,
}

fn parse_region(s: &str) -> Result<(String, u16), String> {
    let (region, port) = s
        .split_once('=')
        .ok_or_else(|| format!("expected id=port, got '{}'", s))?;
    let port = port
        .parse()
        .map_err(|e| format!("invalid port '{}': {}", port, e))?;
    Ok((region.to_string(), port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("regionkv=info".parse()?))
        .init();

    let args = Args::parse();

    let cluster = LocalCluster::new();
    cluster.create_table(&args.table, &args.partition_key, Some(&args.sort_key));
    for (region, _) in &args.regions {
        cluster.add_region(region);
    }
    for region in &args.deny {
        if cluster.access(region).is_none() {
            anyhow::bail!("--deny names unknown region {}", region);
        }
        cluster.set_access(region, RegionAccess::Denied);
    }

    let mut tasks = Vec::with_capacity(args.regions.len());
    for (region, port) in &args.regions {
        let config = EndpointConfig::default()
            .with_bind(&args.bind)
            .with_port(*port)
            .with_region(region);
        let server = EndpointServer::from_config(cluster.clone(), &config).await?;
        info!(region = %region, addr = %server.local_addr()?, "Starting region endpoint");

        let region = region.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(region = %region, error = %e, "Region endpoint failed");
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down region endpoints");
    for task in tasks {
        task.abort();
    }

    Ok(())
}
