//! Boundary to the chat platform.
//!
//! Sessions forward relayed messages through `ChatBot`. The bot shipped here writes them to the
//! `herald::discord` log target; a real Discord client plugs in behind the same trait.

use chrono::DateTime;

use crate::config::BotConfig;
use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub color: u32,
    pub title: String,
    pub description: String,
    /// Unix seconds.
    pub timestamp: i64,
}

pub trait ChatBot: Send + Sync {
    fn send_default_message(&self, channel_id: i64, message: &str);

    fn send_embed_message(&self, channel_id: i64, embed: &Embed);
}

pub struct DiscordBot {
    enabled: bool,
}

impl DiscordBot {
    pub fn start(config: &BotConfig) -> Self {
        if !config.enabled {
            info!("Discord bot is disabled, relayed messages are dropped");
            return Self { enabled: false };
        }
        if config.token.trim().is_empty() {
            error!("DISCORD_BOT_TOKEN is empty, Discord bot disabled");
            return Self { enabled: false };
        }

        info!("Discord bot started");
        Self { enabled: true }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl ChatBot for DiscordBot {
    fn send_default_message(&self, channel_id: i64, message: &str) {
        if !self.enabled {
            return;
        }
        info!(target: "herald::discord", "[{}] {}", channel_id, message);
    }

    fn send_embed_message(&self, channel_id: i64, embed: &Embed) {
        if !self.enabled {
            return;
        }
        let timestamp = DateTime::from_timestamp(embed.timestamp, 0)
            .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| embed.timestamp.to_string());
        info!(
            target: "herald::discord",
            "[{}] embed #{:06x} '{}' at {}: {}",
            channel_id, embed.color, embed.title, timestamp, embed.description
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_disables_bot() {
        let bot = DiscordBot::start(&BotConfig {
            enabled: true,
            token: "  ".into(),
        });
        assert!(!bot.is_enabled());

        let bot = DiscordBot::start(&BotConfig {
            enabled: true,
            token: "abc".into(),
        });
        assert!(bot.is_enabled());
    }
}
