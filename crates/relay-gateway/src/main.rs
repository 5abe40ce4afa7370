//! `relayd` - the Relay AI request gateway daemon.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use relay_gateway::Gateway;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "relayd", version, about = "Multi-tenant AI request gateway")]
struct Args {
    /// Path to the gateway config file (TOML). Defaults apply when absent.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address from the config file.
    #[arg(short, long, env = "RELAY_LISTEN")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = relay_config::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    let gateway = Arc::new(Gateway::from_config(config));
    relay_gateway::server::serve(gateway, CancellationToken::new()).await
}
