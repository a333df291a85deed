use chrono::Utc;
use sqlx::Row;

use super::{KeyValueStore, RepositoryError};
use crate::DbPool;

pub struct SqlKeyValueStore {
    pool: DbPool,
}

impl SqlKeyValueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqlKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM kv_entry WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(r.try_get::<String, _>("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO kv_entry (key, value, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM kv_entry WHERE key = ?").bind(key).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SqlKeyValueStore;
    use crate::repositories::KeyValueStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlKeyValueStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlKeyValueStore::new(pool)
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let store = setup().await;
        store.set("tenders", "[1]".to_owned()).await.expect("first set");
        store.set("tenders", "[2]".to_owned()).await.expect("second set");

        assert_eq!(store.get("tenders").await.expect("get").as_deref(), Some("[2]"));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_entry")
            .fetch_one(store.pool())
            .await
            .expect("count");
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn remove_missing_key_is_a_no_op() {
        let store = setup().await;
        store.remove("tender_chat_nope").await.expect("remove");
        assert_eq!(store.get("tender_chat_nope").await.expect("get"), None);
    }
}
