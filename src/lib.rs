//! trakt-mcp library. The building blocks of the MCP server:
//!
//! - `config` - environment-variable configuration
//! - `types` - Trakt API data records
//! - `client` - HTTP gateway to the Trakt API
//! - `protocol` - JSON-RPC 2.0 / MCP wire types
//! - `server` - stdio dispatch loop and tool registry
//! - `tools` - the tool definitions and handlers

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use client::TraktClient;
pub use config::Config;
pub use server::Server;
