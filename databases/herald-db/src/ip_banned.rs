use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DBIpBanInfo {
    pub banned: i64,
}

impl DBIpBanInfo {
    pub fn is_active(&self) -> bool {
        self.banned != 0
    }
}

impl super::DiscordDatabase {
    /// A permanent ban has `unbandate = bandate`.
    pub async fn get_ip_bans(&self, ip: &str) -> Result<Vec<DBIpBanInfo>> {
        let res = sqlx::query_as::<_, DBIpBanInfo>(
            "SELECT CAST(unbandate > UNIX_TIMESTAMP() OR unbandate = bandate AS SIGNED) AS banned FROM ip_banned WHERE ip = ?",
        )
        .bind(ip)
        .fetch_all(&self.connection_pool)
        .await?;

        Ok(res)
    }
}
