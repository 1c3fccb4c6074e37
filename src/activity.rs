use crate::db::models::{ActivityDetails, ActivityEntry, Viewer};
use crate::error::{FirmError, Result};
use crate::privacy::PrivacyFilter;
use crate::sql_constants::{CHECK_TASK_EXISTS, SELECT_ACTIVITY};
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};

/// Default and maximum page size for activity feeds
const DEFAULT_FEED_LIMIT: i64 = 50;
const MAX_FEED_LIMIT: i64 = 500;

/// Append one activity row on an open connection or transaction.
///
/// Managers call this with the same transaction that performs the task
/// mutation, so a state change and its audit row commit together.
pub async fn record(
    conn: &mut SqliteConnection,
    org_id: i64,
    task_id: i64,
    user_id: i64,
    details: ActivityDetails,
) -> Result<ActivityEntry> {
    let now = Utc::now();
    let action = details.action();
    let (old_value, new_value) = details.change();

    let result = sqlx::query(
        r#"
        INSERT INTO task_activity (task_id, org_id, user_id, action, old_value, new_value, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(task_id)
    .bind(org_id)
    .bind(user_id)
    .bind(action)
    .bind(&old_value)
    .bind(&new_value)
    .bind(Json(&details))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(ActivityEntry {
        id: result.last_insert_rowid(),
        task_id,
        org_id,
        user_id,
        action,
        old_value,
        new_value,
        details: Json(details),
        created_at: now,
    })
}

pub struct ActivityManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ActivityManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a comment to a task
    pub async fn add_comment(&self, viewer: &Viewer, task_id: i64, body: &str) -> Result<ActivityEntry> {
        let body = body.trim();
        if body.is_empty() {
            return Err(FirmError::Validation("Comment body cannot be empty".to_string()));
        }

        let mut conn = self.pool.acquire().await?;
        self.check_task_exists(&mut *conn, viewer.org_id, task_id).await?;

        let entry = record(
            &mut *conn,
            viewer.org_id,
            task_id,
            viewer.user_id,
            ActivityDetails::Comment {
                body: body.to_string(),
            },
        )
        .await?;

        crate::log_task_operation!("comment", task_id);
        Ok(entry)
    }

    /// Activity for one task, newest first, filtered by the actors' privacy settings
    pub async fn list_for_task(&self, viewer: &Viewer, task_id: i64) -> Result<Vec<ActivityEntry>> {
        let mut conn = self.pool.acquire().await?;
        self.check_task_exists(&mut *conn, viewer.org_id, task_id).await?;
        drop(conn);

        let entries = sqlx::query_as::<_, ActivityEntry>(&format!(
            "{} WHERE task_id = ? AND org_id = ? ORDER BY created_at DESC, id DESC",
            SELECT_ACTIVITY
        ))
        .bind(task_id)
        .bind(viewer.org_id)
        .fetch_all(self.pool)
        .await?;

        PrivacyFilter::new(self.pool)
            .filter_activity_by_privacy(entries, viewer)
            .await
    }

    /// Org-wide activity feed, newest first, optionally for one actor
    pub async fn list_recent(
        &self,
        viewer: &Viewer,
        limit: Option<i64>,
        user_id: Option<i64>,
    ) -> Result<Vec<ActivityEntry>> {
        let limit = limit.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, MAX_FEED_LIMIT);

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new(format!("{} WHERE org_id = ", SELECT_ACTIVITY));
        builder.push_bind(viewer.org_id);
        if let Some(uid) = user_id {
            builder.push(" AND user_id = ").push_bind(uid);
        }
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit);

        let entries = builder
            .build_query_as::<ActivityEntry>()
            .fetch_all(self.pool)
            .await?;

        let privacy = PrivacyFilter::new(self.pool);
        let entries = privacy.filter_activity_by_privacy(entries, viewer).await?;
        privacy.filter_activity_by_task_privacy(entries, viewer).await
    }

    async fn check_task_exists(
        &self,
        conn: &mut SqliteConnection,
        org_id: i64,
        task_id: i64,
    ) -> Result<()> {
        let exists: bool = sqlx::query_scalar(CHECK_TASK_EXISTS)
            .bind(task_id)
            .bind(org_id)
            .fetch_one(&mut *conn)
            .await?;

        if !exists {
            return Err(FirmError::task_not_found(task_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ActivityAction, NewTask, PrivacySettingsUpdate, Role};
    use crate::privacy::PrivacyFilter;
    use crate::tasks::TaskManager;
    use crate::test_utils::test_helpers::TestContext;

    #[tokio::test]
    async fn test_add_comment_and_list() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;

        let task = TaskManager::new(ctx.pool())
            .add_task(
                &alice,
                NewTask {
                    title: "Quarterly estimates".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let activity = ActivityManager::new(ctx.pool());
        let entry = activity
            .add_comment(&alice, task.id, "  Called the client  ")
            .await
            .unwrap();
        assert_eq!(entry.action, ActivityAction::Comment);
        assert_eq!(
            entry.details.0,
            ActivityDetails::Comment {
                body: "Called the client".to_string()
            }
        );

        let entries = activity.list_for_task(&alice, task.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ActivityAction::Comment);
        assert_eq!(entries[1].action, ActivityAction::Created);
    }

    #[tokio::test]
    async fn test_empty_comment_rejected() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;
        let task = ctx.task(&alice, "File 1099s").await;

        let result = ActivityManager::new(ctx.pool())
            .add_comment(&alice, task.id, "   ")
            .await;
        assert!(matches!(result, Err(FirmError::Validation(_))));
    }

    #[tokio::test]
    async fn test_comment_on_other_org_task_is_not_found() {
        let ctx = TestContext::new().await;
        let org_a = ctx.org("Acme CPA").await;
        let org_b = ctx.org("Other LLP").await;
        let alice = ctx.user(org_a, "Alice", Role::Staff).await;
        let mallory = ctx.user(org_b, "Mallory", Role::Owner).await;
        let task = ctx.task(&alice, "Payroll").await;

        let result = ActivityManager::new(ctx.pool())
            .add_comment(&mallory, task.id, "hi")
            .await;
        assert!(matches!(result, Err(FirmError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_recent_feed_hides_private_actors_from_peers() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;
        let bob = ctx.user(org, "Bob", Role::Staff).await;
        let owner = ctx.user(org, "Olivia", Role::Owner).await;

        ctx.task(&alice, "Alice's task").await;
        ctx.task(&bob, "Bob's task").await;

        PrivacyFilter::new(ctx.pool())
            .upsert_settings(
                &alice,
                PrivacySettingsUpdate {
                    hide_activity_from_peers: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let activity = ActivityManager::new(ctx.pool());

        let bob_view = activity.list_recent(&bob, None, None).await.unwrap();
        assert!(bob_view.iter().all(|e| e.user_id != alice.user_id));
        assert!(bob_view.iter().any(|e| e.user_id == bob.user_id));

        let alice_view = activity.list_recent(&alice, None, None).await.unwrap();
        assert!(alice_view.iter().any(|e| e.user_id == alice.user_id));

        let owner_view = activity.list_recent(&owner, None, None).await.unwrap();
        assert_eq!(owner_view.len(), 2);

        let only_bob = activity
            .list_recent(&owner, Some(10), Some(bob.user_id))
            .await
            .unwrap();
        assert_eq!(only_bob.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_feed_drops_entries_on_hidden_tasks() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;
        let bob = ctx.user(org, "Bob", Role::Staff).await;
        let carol = ctx.user(org, "Carol", Role::Staff).await;
        let owner = ctx.user(org, "Olivia", Role::Owner).await;

        let tasks = TaskManager::new(ctx.pool());
        let hidden = tasks
            .add_task(
                &carol,
                NewTask {
                    title: "Alice's audit prep".to_string(),
                    assigned_to: Some(alice.user_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let open = ctx.task(&carol, "Pool work").await;

        PrivacyFilter::new(ctx.pool())
            .upsert_settings(
                &alice,
                PrivacySettingsUpdate {
                    hide_tasks_from_peers: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let activity = ActivityManager::new(ctx.pool());

        let bob_view = activity.list_recent(&bob, None, None).await.unwrap();
        assert!(bob_view.iter().all(|e| e.task_id != hidden.id));
        assert!(bob_view.iter().any(|e| e.task_id == open.id));

        let alice_view = activity.list_recent(&alice, None, None).await.unwrap();
        assert!(alice_view.iter().any(|e| e.task_id == hidden.id));

        let owner_view = activity.list_recent(&owner, None, None).await.unwrap();
        assert!(owner_view.iter().any(|e| e.task_id == hidden.id));
    }
}
