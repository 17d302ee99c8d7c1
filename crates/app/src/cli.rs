//! Command line interface

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hive_core::DEFAULT_PORT;

#[derive(Debug, Parser)]
#[command(name = "hive", version, about = "Real-time chat client and relay")]
pub struct Cli {
    /// Config file, instead of hive.toml in the platform config directory
    #[arg(long, global = true, env = "HIVE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join a chat relay
    Connect {
        /// Name shown on your messages
        #[arg(long)]
        name: String,

        /// Connection password; prompted for when omitted
        #[arg(long, env = "HIVE_SECRET", hide_env_values = true)]
        secret: Option<String>,

        /// Server URL, overriding the config file
        #[arg(long)]
        server: Option<String>,
    },

    /// Run a chat relay
    Serve {
        #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
        bind: SocketAddr,

        /// Password clients must present
        #[arg(long, env = "HIVE_PASSWORD", hide_env_values = true)]
        password: String,
    },
}
