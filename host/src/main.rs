use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rehost_lib::{Host, HostArgs, HostConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = HostArgs::parse();
    let config = HostConfig::from_args(args)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(config));
    // A console read still parked on stdin must not hold the process open.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(config: HostConfig) -> anyhow::Result<()> {
    let host = Host::new(config);

    let cancel = host.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            cancel.cancel();
        }
    });

    let exit = host
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;
    info!("Console ended: {:?}", exit);
    Ok(())
}
