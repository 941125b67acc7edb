use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::AuditEntry;

pub struct AuditLog;

impl AuditLog {
    /// Appends one audit row on the caller's connection, inside its transaction.
    pub async fn record(executor: &mut PgConnection, entry: &AuditEntry) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, entity_id, entity_type, action, old_val, new_val, actor)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.entity_id)
        .bind(entry.entity_type)
        .bind(entry.action)
        .bind(&entry.old_val)
        .bind(&entry.new_val)
        .bind(&entry.actor)
        .execute(executor)
        .await?;

        Ok(())
    }
}
