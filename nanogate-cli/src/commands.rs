//! Command execution.

use crate::Commands;
use bytes::Bytes;
use colored::Colorize;
use nanogate_ipc::{PoolConfig, Session, SessionConfig, SessionPool};
use serde_json::Value;
use std::io::Read;

/// Executes a command and returns the formatted output.
pub(crate) async fn execute(
    node: &str,
    session_config: SessionConfig,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Request { payload, raw } => {
            let body = read_payload(&payload)?;
            if !raw {
                serde_json::from_slice::<Value>(&body)?;
            }

            let session = Session::new(session_config);
            session.connect(node).await?;
            let result = session.request(&body).await;
            if let Err(e) = session.close().await {
                tracing::debug!("Close failed: {}", e);
            }
            let response = result?;

            if raw {
                Ok(String::from_utf8_lossy(&response).into_owned())
            } else {
                Ok(format_response(&response))
            }
        }

        Commands::Check { pool_size } => {
            let config = PoolConfig::new(node, pool_size).with_session_config(session_config);
            let pool = SessionPool::new(config);
            let result = pool.fill().await;
            let connected = pool.len();
            pool.close_all().await;

            match result {
                Ok(()) => Ok(format!(
                    "{} {}/{} session(s) to {}",
                    "Connected".green(),
                    connected,
                    pool_size,
                    node.cyan()
                )),
                Err(e) => Ok(format!(
                    "{} {}/{} session(s) to {}\n  {}",
                    "Incomplete".yellow(),
                    connected,
                    pool_size,
                    node.cyan(),
                    e
                )),
            }
        }

        // Runs until interrupted, see main.rs
        Commands::EchoPeer { .. } => {
            Err("echo-peer runs in the foreground and produces no output to return".into())
        }
    }
}

/// Reads a payload argument: inline text, `@file` or `-` for stdin.
fn read_payload(arg: &str) -> Result<Bytes, Box<dyn std::error::Error>> {
    if arg == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    } else if let Some(path) = arg.strip_prefix('@') {
        Ok(Bytes::from(std::fs::read(path)?))
    } else {
        Ok(Bytes::copy_from_slice(arg.as_bytes()))
    }
}

/// Pretty-prints JSON responses; anything else is shown as text.
fn format_response(response: &[u8]) -> String {
    match serde_json::from_slice::<Value>(response) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
        Err(_) => String::from_utf8_lossy(response).into_owned(),
    }
}
