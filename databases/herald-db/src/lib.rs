use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

mod account;
mod callback;
mod ip_banned;

pub use account::DBAccountInfo;
pub use callback::QueryCallbackProcessor;
pub use ip_banned::DBIpBanInfo;

pub struct DiscordDatabase {
    connection_pool: sqlx::MySqlPool,
}

impl DiscordDatabase {
    pub async fn new(conn_string: &str, timeout: Duration) -> Result<Self> {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(timeout)
            .connect(conn_string)
            .await?;

        Ok(Self { connection_pool: pool })
    }

    pub async fn keep_alive(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.connection_pool).await?;
        Ok(())
    }
}

/// The queries the relay needs, behind a trait so the network code can run against something
/// other than MySQL.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account_by_name(&self, account_name: &str) -> Result<Option<DBAccountInfo>>;

    async fn get_ip_bans(&self, ip: &str) -> Result<Vec<DBIpBanInfo>>;

    async fn keep_alive(&self) -> Result<()>;

    /// True when any ban row for this address is still active.
    async fn is_ip_banned(&self, ip: &str) -> Result<bool> {
        Ok(self.get_ip_bans(ip).await?.iter().any(|ban| ban.is_active()))
    }
}

#[async_trait]
impl AccountStore for DiscordDatabase {
    async fn get_account_by_name(&self, account_name: &str) -> Result<Option<DBAccountInfo>> {
        DiscordDatabase::get_account_by_name(self, account_name).await
    }

    async fn get_ip_bans(&self, ip: &str) -> Result<Vec<DBIpBanInfo>> {
        DiscordDatabase::get_ip_bans(self, ip).await
    }

    async fn keep_alive(&self) -> Result<()> {
        DiscordDatabase::keep_alive(self).await
    }
}
