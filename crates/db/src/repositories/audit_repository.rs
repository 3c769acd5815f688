use sqlx::SqlitePool;

use crate::error::DbError;
use crate::models::{datetime_to_millis, AuditRecord, AuditRow, NewAuditRecord};

/// Append-only audit trail.
#[derive(Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, record: &NewAuditRecord) -> Result<(), DbError> {
        let data = record.data.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, template_id, trigger_id, workspace_id, category, level, message, data, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.template_id)
        .bind(&record.trigger_id)
        .bind(&record.workspace_id)
        .bind(&record.category)
        .bind(&record.level)
        .bind(&record.message)
        .bind(&data)
        .bind(datetime_to_millis(record.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_recent(&self, limit: i64) -> Result<Vec<AuditRecord>, DbError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, template_id, trigger_id, workspace_id, category, level, message, data,
                   created_at
            FROM audit_log
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Newest first.
    pub async fn find_by_template(
        &self,
        template_id: &str,
    ) -> Result<Vec<AuditRecord>, DbError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, template_id, trigger_id, workspace_id, category, level, message, data,
                   created_at
            FROM audit_log
            WHERE template_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Newest first.
    pub async fn find_by_trigger(&self, trigger_id: &str) -> Result<Vec<AuditRecord>, DbError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, template_id, trigger_id, workspace_id, category, level, message, data,
                   created_at
            FROM audit_log
            WHERE trigger_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(trigger_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}
