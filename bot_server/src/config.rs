use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use herald_shared::config::{env_or, env_required};
use herald_shared::header::{FrameConfig, FrameFormat, DEFAULT_MAX_PAYLOAD_SIZE};

use crate::prelude::*;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Bot side of the game server relay")]
pub struct Args {
    /// Configuration file to load instead of `.env`
    #[clap(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub enabled: bool,
    pub token: String,
}

/// Everything the bot server reads from its environment, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_connect_timeout: Duration,
    pub bind_address: String,
    pub network_threads: usize,
    pub tcp_nodelay: bool,
    pub frame: FrameConfig,
    pub socket_update_interval: Duration,
    pub max_packets_per_update: usize,
    pub min_update_diff: Duration,
    pub record_update_time_interval: Duration,
    pub min_record_update_time: Duration,
    pub db_keepalive_interval: Duration,
    pub bot: BotConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_ip: String = env_or("BIND_IP", "0.0.0.0".to_string())?;
        let bind_port: u16 = env_or("BIND_PORT", 8090)?;
        let format: FrameFormat = env_or("FRAME_FORMAT", FrameFormat::Sized)?;

        let network_threads: usize = env_or("NETWORK_THREADS", 1)?;
        if network_threads == 0 {
            bail!("NETWORK_THREADS must be at least 1");
        }

        let max_packets_per_update: usize = env_or("SESSION_MAX_PACKETS_PER_UPDATE", 150)?;
        if max_packets_per_update == 0 {
            bail!("SESSION_MAX_PACKETS_PER_UPDATE must be at least 1");
        }

        Ok(Self {
            database_url: env_required("DISCORD_DATABASE_URL")?,
            db_connect_timeout: Duration::from_secs(env_or("DB_CONNECT_TIMEOUT_SECONDS", 10)?),
            bind_address: format!("{bind_ip}:{bind_port}"),
            network_threads,
            tcp_nodelay: env_or("NETWORK_TCP_NODELAY", true)?,
            frame: FrameConfig {
                format,
                max_payload_size: env_or("MAX_PAYLOAD_SIZE", DEFAULT_MAX_PAYLOAD_SIZE)?,
                send_buffer_size: env_or("NETWORK_OUT_UBUFF", 4096)?,
            },
            socket_update_interval: Duration::from_millis(env_or("SOCKET_UPDATE_INTERVAL_MS", 10)?),
            max_packets_per_update,
            min_update_diff: Duration::from_millis(env_or("MIN_UPDATE_DIFF_MS", 1)?),
            record_update_time_interval: Duration::from_millis(env_or("RECORD_UPDATE_TIME_DIFF_INTERVAL_MS", 60_000)?),
            min_record_update_time: Duration::from_millis(env_or("MIN_RECORD_UPDATE_TIME_DIFF_MS", 100)?),
            db_keepalive_interval: Duration::from_secs(60 * env_or::<u64>("DB_KEEPALIVE_INTERVAL_MINUTES", 30)?),
            bot: BotConfig {
                enabled: env_or("DISCORD_BOT_ENABLE", false)?,
                token: env_or("DISCORD_BOT_TOKEN", String::new())?,
            },
        })
    }
}
