use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DBAccountInfo {
    pub id: u32,
}

impl super::DiscordDatabase {
    pub async fn get_account_by_name(&self, account_name: &str) -> Result<Option<DBAccountInfo>> {
        let res = sqlx::query_as::<_, DBAccountInfo>("SELECT `ID` AS id FROM `account` WHERE `Name` = ? LIMIT 1")
            .bind(account_name)
            .fetch_optional(&self.connection_pool)
            .await?;

        Ok(res)
    }
}
