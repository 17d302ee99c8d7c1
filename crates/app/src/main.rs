//! Hive - real-time chat client and relay
//!
//! `hive connect` joins a relay from the terminal; `hive serve` runs one.

use clap::Parser;
use hive_core::ClientConfig;
use hive_net::ChatClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod error;
mod relay;
mod terminal;

use cli::{Cli, Command};
use error::Result;

fn main() {
    // Logs go to stderr so they never interleave with the conversation
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting Hive");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        tracing::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Connect {
            name,
            secret,
            server,
        } => {
            let config = load_config(cli.config.as_deref(), server)?;
            let client = ChatClient::new(config)?;

            let mut lines = terminal::stdin_lines();
            let secret = match secret {
                Some(secret) => secret,
                None => terminal::prompt_secret(&mut lines).await?,
            };

            terminal::run(client, lines, name, secret).await
        }
        Command::Serve { bind, password } => relay::serve(bind, &password).await,
    }
}

/// Resolve the client config, applying a command line server override
fn load_config(path: Option<&std::path::Path>, server: Option<String>) -> Result<ClientConfig> {
    let mut config = match path {
        Some(path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };

    if let Some(server) = server {
        config.server_url = server;
        config.validate()?;
    }

    tracing::debug!(server = %config.server_url, policy = ?config.send_policy, "Config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::SendPolicy;

    #[test]
    fn test_load_config_with_server_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(&path, "send_policy = \"concurrent\"\n").unwrap();

        let config = load_config(Some(&path), Some("https://chat.example.com".into())).unwrap();
        assert_eq!(config.server_url, "https://chat.example.com");
        assert_eq!(config.send_policy, SendPolicy::Concurrent);
    }

    #[test]
    fn test_load_config_rejects_bad_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        assert!(load_config(Some(&path), Some("ftp://nope".into())).is_err());
    }
}
