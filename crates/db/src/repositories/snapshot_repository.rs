use async_trait::async_trait;
use blueprint_core::{SnapshotStore, StoreResult};
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::DbError;

/// Last observed snapshot per trigger, kept across restarts so change
/// detection resumes where it left off.
#[derive(Clone)]
pub struct SnapshotRepository {
    pool: SqlitePool,
}

impl SnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, trigger_id: &str) -> Result<Option<Value>, DbError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT snapshot FROM trigger_snapshots WHERE trigger_id = ?")
                .bind(trigger_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((snapshot,)) => Ok(Some(serde_json::from_str(&snapshot).map_err(|source| {
                DbError::CorruptDocument {
                    id: trigger_id.to_string(),
                    source,
                }
            })?)),
            None => Ok(None),
        }
    }

    pub async fn upsert(&self, trigger_id: &str, snapshot: &Value) -> Result<(), DbError> {
        let body = serde_json::to_string(snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO trigger_snapshots (trigger_id, snapshot, observed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(trigger_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                observed_at = excluded.observed_at
            "#,
        )
        .bind(trigger_id)
        .bind(&body)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, trigger_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM trigger_snapshots WHERE trigger_id = ?")
            .bind(trigger_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SnapshotStore for SnapshotRepository {
    async fn load(&self, trigger_id: &str) -> StoreResult<Option<Value>> {
        Ok(self.find(trigger_id).await?)
    }

    async fn save(&self, trigger_id: &str, snapshot: &Value) -> StoreResult<()> {
        Ok(self.upsert(trigger_id, snapshot).await?)
    }

    async fn delete(&self, trigger_id: &str) -> StoreResult<bool> {
        Ok(SnapshotRepository::delete(self, trigger_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_roundtrip_and_overwrite() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let repo = SnapshotRepository::new(pool);

        assert!(repo.load("trg_1").await.unwrap().is_none());

        repo.save("trg_1", &json!({"status": "Open"})).await.unwrap();
        repo.save("trg_1", &json!({"status": "In Progress"})).await.unwrap();

        let loaded = repo.load("trg_1").await.unwrap().unwrap();
        assert_eq!(loaded["status"], "In Progress");

        assert!(SnapshotStore::delete(&repo, "trg_1").await.unwrap());
        assert!(repo.load("trg_1").await.unwrap().is_none());
        assert!(!SnapshotStore::delete(&repo, "trg_1").await.unwrap());
    }
}
