//! Bot side of the relay: accepts relay connections from game servers, authenticates them against
//! the account database and forwards what they send to the chat bot.

pub mod bot;
pub mod config;
pub mod connection;
pub mod connections;
pub mod console_input;
pub mod handlers;
pub mod network_threads;
pub mod opcode_table;
pub mod session;
pub mod session_manager;
pub mod world;

pub mod prelude {
    pub use super::handlers;
    pub use anyhow::{anyhow, bail, Result};
    pub use tracing::{debug, error, info, trace, warn};
}
