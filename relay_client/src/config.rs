use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use herald_shared::config::env_or;
use herald_shared::header::{FrameConfig, FrameFormat, DEFAULT_MAX_PAYLOAD_SIZE};

use crate::prelude::*;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Game server side of the relay")]
pub struct Args {
    /// Configuration file to load instead of `.env`
    #[clap(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub account_name: String,
    /// Connection attempts per (re)connect before giving up.
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
    pub socket_update_interval: Duration,
    pub frame: FrameConfig,
    pub default_channel_id: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".into(),
            port: 8090,
            account_name: String::new(),
            reconnect_attempts: 10,
            reconnect_delay: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            socket_update_interval: Duration::from_millis(10),
            frame: FrameConfig::default(),
            default_channel_id: 0,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            enabled: env_or("DISCORD_SERVER_ENABLE", true)?,
            host: env_or("DISCORD_SERVER_HOST", defaults.host)?,
            port: env_or("DISCORD_SERVER_PORT", defaults.port)?,
            account_name: env_or("DISCORD_SERVER_ACCOUNT_NAME", defaults.account_name)?,
            reconnect_attempts: env_or("RECONNECT_ATTEMPTS", defaults.reconnect_attempts)?,
            reconnect_delay: Duration::from_secs(env_or("RECONNECT_DELAY_SECONDS", defaults.reconnect_delay.as_secs())?),
            ping_interval: Duration::from_secs(env_or("PING_INTERVAL_SECONDS", defaults.ping_interval.as_secs())?),
            socket_update_interval: Duration::from_millis(env_or("SOCKET_UPDATE_INTERVAL_MS", 10)?),
            frame: FrameConfig {
                format: env_or("FRAME_FORMAT", FrameFormat::Sized)?,
                max_payload_size: env_or("MAX_PAYLOAD_SIZE", DEFAULT_MAX_PAYLOAD_SIZE)?,
                send_buffer_size: env_or("NETWORK_OUT_UBUFF", defaults.frame.send_buffer_size)?,
            },
            default_channel_id: env_or("DEFAULT_CHANNEL_ID", 0)?,
        };

        if config.enabled && config.account_name.trim().is_empty() {
            bail!("DISCORD_SERVER_ACCOUNT_NAME must be set when the relay is enabled");
        }
        Ok(config)
    }
}
