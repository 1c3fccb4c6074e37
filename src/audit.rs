//! Durable, append-only audit trail of who did what, per organization.

use crate::db::models::AuditLogEntry;
use crate::error::Result;
use crate::sql_constants::SELECT_AUDIT;
use chrono::Utc;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;

pub const MAX_RECENT_LOGS: i64 = 10_000;

/// An audit record before it is stored
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub org_id: i64,
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<i64>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(org_id: i64, action: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            org_id,
            user_id: None,
            session_id: None,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            details: Value::Object(Default::default()),
        }
    }

    pub fn by(mut self, user_id: i64, session_id: Option<String>) -> Self {
        self.user_id = Some(user_id);
        self.session_id = session_id;
        self
    }

    pub fn resource(mut self, id: i64) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

pub struct AuditLog<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditLog<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, event: AuditEvent) -> Result<AuditLogEntry> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (org_id, user_id, session_id, action, resource_type, resource_id, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.org_id)
        .bind(event.user_id)
        .bind(&event.session_id)
        .bind(&event.action)
        .bind(&event.resource_type)
        .bind(event.resource_id)
        .bind(Json(&event.details))
        .bind(now)
        .execute(self.pool)
        .await?;

        tracing::debug!(
            org_id = event.org_id,
            action = %event.action,
            resource_type = %event.resource_type,
            "Audit entry recorded"
        );

        Ok(AuditLogEntry {
            id: result.last_insert_rowid(),
            org_id: event.org_id,
            user_id: event.user_id,
            session_id: event.session_id,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            details: Json(event.details),
            created_at: now,
        })
    }

    /// The newest `n` entries of an organization; `n` is clamped to 1..=10000
    pub async fn get_recent_logs(&self, org_id: i64, n: i64) -> Result<Vec<AuditLogEntry>> {
        let n = n.clamp(1, MAX_RECENT_LOGS);
        let entries = sqlx::query_as::<_, AuditLogEntry>(&format!(
            "{} WHERE org_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            SELECT_AUDIT
        ))
        .bind(org_id)
        .bind(n)
        .fetch_all(self.pool)
        .await?;
        Ok(entries)
    }

    /// Everything one session did, oldest first
    pub async fn get_session_logs(&self, org_id: i64, session_id: &str) -> Result<Vec<AuditLogEntry>> {
        let entries = sqlx::query_as::<_, AuditLogEntry>(&format!(
            "{} WHERE org_id = ? AND session_id = ? ORDER BY created_at ASC, id ASC",
            SELECT_AUDIT
        ))
        .bind(org_id)
        .bind(session_id)
        .fetch_all(self.pool)
        .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;
    use crate::test_utils::test_helpers::TestContext;
    use serde_json::json;

    #[tokio::test]
    async fn test_recent_logs_newest_first_and_clamped() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;
        let audit = AuditLog::new(ctx.pool());

        for i in 1..=3 {
            audit
                .record(
                    AuditEvent::new(org, "task.create", "task")
                        .by(alice.user_id, None)
                        .resource(i),
                )
                .await
                .unwrap();
        }

        let recent = audit.get_recent_logs(org, 2).await.unwrap();
        let ids: Vec<Option<i64>> = recent.iter().map(|e| e.resource_id).collect();
        assert_eq!(ids, vec![Some(3), Some(2)]);

        assert_eq!(audit.get_recent_logs(org, 0).await.unwrap().len(), 1);
        assert_eq!(audit.get_recent_logs(org, i64::MAX).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_session_logs_scoped_and_ordered() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let other = ctx.org("Other LLP").await;
        let audit = AuditLog::new(ctx.pool());

        let session = Some("sess-1".to_string());
        audit
            .record(AuditEvent::new(org, "task.claim", "task").by(1, session.clone()))
            .await
            .unwrap();
        audit
            .record(
                AuditEvent::new(org, "task.release", "task")
                    .by(1, session.clone())
                    .details(json!({"reason": "handoff"})),
            )
            .await
            .unwrap();
        audit
            .record(AuditEvent::new(org, "task.claim", "task").by(2, Some("sess-2".to_string())))
            .await
            .unwrap();
        audit
            .record(AuditEvent::new(other, "task.claim", "task").by(9, session.clone()))
            .await
            .unwrap();

        let logs = audit.get_session_logs(org, "sess-1").await.unwrap();
        let actions: Vec<&str> = logs.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["task.claim", "task.release"]);
        assert_eq!(logs[1].details.0["reason"], "handoff");
    }

    #[tokio::test]
    async fn test_audit_rows_are_immutable() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let entry = AuditLog::new(ctx.pool())
            .record(AuditEvent::new(org, "org.create", "organization"))
            .await
            .unwrap();

        let result = sqlx::query("UPDATE audit_logs SET action = 'tampered' WHERE id = ?")
            .bind(entry.id)
            .execute(ctx.pool())
            .await;
        assert!(result.is_err());
    }
}
