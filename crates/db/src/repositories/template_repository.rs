use async_trait::async_trait;
use blueprint_core::{StoreResult, TemplateIndexEntry, TemplateStore, WorkspaceTemplate};
use sqlx::SqlitePool;

use crate::error::DbError;
use crate::models::{TemplateIndexRow, TemplateRow};

#[derive(Clone)]
pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, template: &WorkspaceTemplate) -> Result<(), DbError> {
        let row = TemplateRow::try_from(template)?;

        sqlx::query(
            r#"
            INSERT INTO templates (id, name, category, document, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.category)
        .bind(&row.document)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<WorkspaceTemplate>, DbError> {
        let row: Option<TemplateRow> = sqlx::query_as(
            r#"
            SELECT id, name, category, document, created_at, updated_at
            FROM templates
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<WorkspaceTemplate>, DbError> {
        let rows: Vec<TemplateRow> = sqlx::query_as(
            r#"
            SELECT id, name, category, document, created_at, updated_at
            FROM templates
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    pub async fn find_index(&self) -> Result<Vec<TemplateIndexEntry>, DbError> {
        let rows: Vec<TemplateIndexRow> = sqlx::query_as(
            r#"
            SELECT id, name, category, updated_at
            FROM templates
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TemplateStore for TemplateRepository {
    async fn get(&self, id: &str) -> StoreResult<Option<WorkspaceTemplate>> {
        Ok(self.find_by_id(id).await?)
    }

    async fn list(&self) -> StoreResult<Vec<WorkspaceTemplate>> {
        Ok(self.find_all().await?)
    }

    async fn put(&self, template: &WorkspaceTemplate) -> StoreResult<()> {
        Ok(self.upsert(template).await?)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(TemplateRepository::delete(self, id).await?)
    }

    async fn index(&self) -> StoreResult<Vec<TemplateIndexEntry>> {
        Ok(self.find_index().await?)
    }
}
