//! `hive serve`

use std::net::SocketAddr;

use hive_net::{RelayConfig, RelayServer};
use tracing::info;

use crate::error::Result;

/// Run a relay until Ctrl-C
pub async fn serve(bind: SocketAddr, password: &str) -> Result<()> {
    let server = RelayServer::start(RelayConfig::with_password(bind, password)?).await?;
    println!("Relay listening on {}", server.base_url());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    server.shutdown();

    Ok(())
}
