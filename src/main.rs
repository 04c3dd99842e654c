//! # trakt-mcp
//!
//! MCP (Model Context Protocol) server for Trakt.tv. Runs as a stdio
//! JSON-RPC server, designed to be launched by an AI agent host (e.g.
//! Claude Code): protocol frames on stdin/stdout, structured logs on
//! stderr.
//!
//! ## Architecture
//!
//! ```text
//! main.rs      - entry point, logging init, signal handling
//! config.rs    - environment-variable configuration
//! types.rs     - Trakt API data records
//! client.rs    - HTTP gateway to the Trakt API
//! protocol.rs  - JSON-RPC 2.0 / MCP wire types
//! server.rs    - stdio dispatch loop and tool registry
//! tools.rs     - tool definitions and handlers
//! ```
//!
//! ## Tools
//!
//! - `authenticate` - OAuth device flow (verification URL + user code)
//! - `search_show` - search shows and movies by title
//! - `get_history` - recent watch history
//! - `log_watch` - resolve a title and mark an episode or movie watched
//!
//! ## Configuration
//!
//! Environment only: `TRAKT_CLIENT_ID`, `TRAKT_CLIENT_SECRET`,
//! `TRAKT_ACCESS_TOKEN`, `TRAKT_REFRESH_TOKEN`, `LOG_LEVEL`.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use trakt_mcp::server::ServeError;
use trakt_mcp::{config, tools, Config, Server, TraktClient};

/// MCP server exposing Trakt.tv search, history, and watch logging.
#[derive(Parser)]
#[command(name = "trakt-mcp", version, about = "MCP server for Trakt.tv")]
struct Cli {}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for protocol frames.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(config::log_filter())
        .init();

    let client = Arc::new(TraktClient::new(Config::from_env()));
    if !client.is_configured() {
        warn!("TRAKT_CLIENT_ID not set - some tools will not work");
    }

    let server = Server::new();
    tools::register_tools(&server, client).await;

    // SIGINT/SIGTERM cancel the dispatch loop at the next line boundary
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutting down");
        signal_token.cancel();
    });

    match server.run(shutdown).await {
        Ok(()) => {}                     // clean end-of-input
        Err(ServeError::Cancelled) => {} // graceful signal shutdown
        Err(e) => {
            error!("server error: {e}");
            std::process::exit(1);
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT");
    }
}
