//! linx-relay - standalone signaling relay

use std::net::SocketAddr;

use clap::Parser;
use tracing::{info, warn};

use linx_relay::{RelayConfig, RelayServer};
use linx_runtime::{logging, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "linx-relay", version, about = "LINX signaling relay")]
struct Args {
    /// Address to accept peer connections on
    #[arg(long, env = "LINX_RELAY_LISTEN", default_value = "0.0.0.0:9988")]
    listen: SocketAddr,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    logging::init(args.log_format)?;

    let config = RelayConfig::default().with_listen(args.listen);
    let server = RelayServer::bind(&config).await?;

    server
        .serve(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received"),
                Err(e) => {
                    warn!(error = %e, "cannot listen for interrupts");
                    std::future::pending::<()>().await
                }
            }
        })
        .await?;
    Ok(())
}
