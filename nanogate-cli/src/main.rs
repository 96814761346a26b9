//! nanogate-cli - Command-line interface for the node IPC link
//!
//! Sends payloads straight to the node, checks pool connectivity and runs a
//! local echo peer for trying the gateway without a node.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use nanogate_ipc::pool::DEFAULT_NODE_ADDRESS;
use nanogate_ipc::{EchoPeer, SessionConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nanogate-cli")]
#[command(about = "Command-line interface for the nanogate node IPC link")]
#[command(version)]
struct Cli {
    /// Node address (tcp://host:port or local:///path)
    #[arg(short, long, env = "NANOGATE_NODE", default_value = DEFAULT_NODE_ADDRESS)]
    node: String,

    /// Connect timeout in seconds (0 uses the default)
    #[arg(long, default_value = "15")]
    connect_timeout: u64,

    /// Read/write timeout in seconds (0 uses the default)
    #[arg(long, default_value = "30")]
    rw_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_read_write_timeout(Duration::from_secs(self.rw_timeout))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Send one payload to the node and print the response
    Request {
        /// Payload JSON (or @file.json to read from file, - for stdin)
        payload: String,

        /// Send the payload without JSON validation and print the response as is
        #[arg(long)]
        raw: bool,
    },

    /// Fill a session pool and report how many sessions connected
    Check {
        /// Number of sessions to open
        #[arg(short, long, default_value = "1")]
        pool_size: usize,
    },

    /// Run an echo peer that answers every request with its own payload
    EchoPeer {
        /// Address to listen on
        #[arg(short, long, default_value = "tcp://127.0.0.1:7077")]
        listen: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let session_config = cli.session_config();

    match cli.command {
        Commands::EchoPeer { listen } => {
            // Serves until Ctrl+C
            let peer = match EchoPeer::bind(&listen).await {
                Ok(peer) => Arc::new(peer),
                Err(e) => {
                    eprintln!("{}: {}", "Bind failed".red(), e);
                    std::process::exit(1);
                }
            };

            eprintln!("{} on {}", "Echo peer listening".green(), peer.address().cyan());
            eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

            let handle = peer.spawn();
            tokio::signal::ctrl_c().await.ok();
            eprintln!("\n{}", "Stopping echo peer...".dimmed());
            peer.shutdown();
            let _ = handle.await;

            eprintln!(
                "Served {} request(s) on {} connection(s)",
                peer.requests_served(),
                peer.connections_accepted()
            );
        }
        cmd => match commands::execute(&cli.node, session_config, cmd).await {
            Ok(output) => {
                println!("{}", output);
            }
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
