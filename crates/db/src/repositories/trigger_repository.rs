use async_trait::async_trait;
use blueprint_core::{StoreResult, TriggerIndexEntry, TriggerStatus, TriggerStore, WorkspaceTrigger};
use sqlx::SqlitePool;

use crate::error::DbError;
use crate::models::{TriggerIndexRow, TriggerRow};

#[derive(Clone)]
pub struct TriggerRepository {
    pool: SqlitePool,
}

impl TriggerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, trigger: &WorkspaceTrigger) -> Result<(), DbError> {
        let row = TriggerRow::try_from(trigger)?;

        sqlx::query(
            r#"
            INSERT INTO triggers (id, name, template_id, status, document, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                template_id = excluded.template_id,
                status = excluded.status,
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.template_id)
        .bind(&row.status)
        .bind(&row.document)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<WorkspaceTrigger>, DbError> {
        let row: Option<TriggerRow> = sqlx::query_as(
            r#"
            SELECT id, name, template_id, status, document, created_at, updated_at
            FROM triggers
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<WorkspaceTrigger>, DbError> {
        let rows: Vec<TriggerRow> = sqlx::query_as(
            r#"
            SELECT id, name, template_id, status, document, created_at, updated_at
            FROM triggers
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    pub async fn find_by_status(
        &self,
        status: TriggerStatus,
    ) -> Result<Vec<WorkspaceTrigger>, DbError> {
        let rows: Vec<TriggerRow> = sqlx::query_as(
            r#"
            SELECT id, name, template_id, status, document, created_at, updated_at
            FROM triggers
            WHERE status = ?
            ORDER BY name ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    pub async fn find_by_template(
        &self,
        template_id: &str,
    ) -> Result<Vec<WorkspaceTrigger>, DbError> {
        let rows: Vec<TriggerRow> = sqlx::query_as(
            r#"
            SELECT id, name, template_id, status, document, created_at, updated_at
            FROM triggers
            WHERE template_id = ?
            ORDER BY name ASC
            "#,
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    pub async fn find_index(&self) -> Result<Vec<TriggerIndexEntry>, DbError> {
        let rows: Vec<TriggerIndexRow> = sqlx::query_as(
            r#"
            SELECT id, name, template_id, status, updated_at
            FROM triggers
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM triggers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TriggerStore for TriggerRepository {
    async fn get(&self, id: &str) -> StoreResult<Option<WorkspaceTrigger>> {
        Ok(self.find_by_id(id).await?)
    }

    async fn list(&self) -> StoreResult<Vec<WorkspaceTrigger>> {
        Ok(self.find_all().await?)
    }

    async fn put(&self, trigger: &WorkspaceTrigger) -> StoreResult<()> {
        Ok(self.upsert(trigger).await?)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(TriggerRepository::delete(self, id).await?)
    }

    async fn index(&self) -> StoreResult<Vec<TriggerIndexEntry>> {
        Ok(self.find_index().await?)
    }

    async fn list_active(&self) -> StoreResult<Vec<WorkspaceTrigger>> {
        Ok(self.find_by_status(TriggerStatus::Active).await?)
    }
}
