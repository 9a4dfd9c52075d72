//! Game server side of the relay: keeps one authenticated connection to the bot server alive and
//! forwards chat messages and embeds produced by the game server over it.
//!
//! - `client_socket`: the protocol role plugged into the shared socket loop.
//! - `client_socket_mgr`: connection ownership, bounded reconnect, keepalive pings and the
//!   `RelayClient` handle producers use.

pub mod client_socket;
pub mod client_socket_mgr;
pub mod config;
pub mod console_input;

pub mod prelude {
    pub use anyhow::{anyhow, bail, Result};
    pub use tracing::{debug, error, info, trace, warn};
}
