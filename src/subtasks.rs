use crate::activity;
use crate::db::begin_write;
use crate::db::models::{ActivityDetails, Subtask, Viewer};
use crate::error::{FirmError, Result};
use crate::sql_constants::{CHECK_TASK_EXISTS, SELECT_SUBTASK};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeSet;

/// A subtask together with the organization of its parent task
const SELECT_SUBTASK_IN_ORG: &str = "SELECT s.id, s.task_id, s.title, s.position, s.is_completed, \
     s.completed_at, s.completed_by, s.created_at \
     FROM subtasks s JOIN tasks t ON t.id = s.task_id \
     WHERE s.id = ? AND t.org_id = ?";

async fn ensure_task(conn: &mut SqliteConnection, org_id: i64, task_id: i64) -> Result<()> {
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

async fn fetch_subtask(conn: &mut SqliteConnection, org_id: i64, id: i64) -> Result<Subtask> {
    sqlx::query_as::<_, Subtask>(SELECT_SUBTASK_IN_ORG)
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(FirmError::NotFound {
            resource: "Subtask",
            id,
        })
}

async fn fetch_for_task(conn: &mut SqliteConnection, task_id: i64) -> Result<Vec<Subtask>> {
    let subtasks = sqlx::query_as::<_, Subtask>(&format!(
        "{} WHERE task_id = ? ORDER BY position ASC, id ASC",
        SELECT_SUBTASK
    ))
    .bind(task_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(subtasks)
}

pub struct SubtaskManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SubtaskManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a checklist item at the end of the task's list
    pub async fn add_subtask(&self, viewer: &Viewer, task_id: i64, title: &str) -> Result<Subtask> {
        let title = title.trim();
        if title.is_empty() {
            return Err(FirmError::Validation("Subtask title cannot be empty".to_string()));
        }

        let mut tx = begin_write(self.pool).await?;
        ensure_task(&mut tx, viewer.org_id, task_id).await?;

        let position: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) + 1 FROM subtasks WHERE task_id = ?")
                .bind(task_id)
                .fetch_one(&mut *tx)
                .await?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO subtasks (task_id, title, position, is_completed, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(task_id)
        .bind(title)
        .bind(position)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let subtask = Subtask {
            id: result.last_insert_rowid(),
            task_id,
            title: title.to_string(),
            position,
            is_completed: false,
            completed_at: None,
            completed_by: None,
            created_at: now,
        };

        activity::record(
            &mut tx,
            viewer.org_id,
            task_id,
            viewer.user_id,
            ActivityDetails::SubtaskAdded {
                subtask_id: subtask.id,
                title: subtask.title.clone(),
            },
        )
        .await?;
        tx.commit().await?;

        crate::log_task_operation!("subtask_add", task_id);
        Ok(subtask)
    }

    pub async fn list_subtasks(&self, viewer: &Viewer, task_id: i64) -> Result<Vec<Subtask>> {
        let mut conn = self.pool.acquire().await?;
        ensure_task(&mut conn, viewer.org_id, task_id).await?;
        fetch_for_task(&mut conn, task_id).await
    }

    /// The task a subtask belongs to, for access checks before a mutation
    pub async fn parent_task_id(&self, viewer: &Viewer, subtask_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let subtask = fetch_subtask(&mut conn, viewer.org_id, subtask_id).await?;
        Ok(subtask.task_id)
    }

    /// Tick or untick a subtask. Setting the current state again is a no-op.
    pub async fn set_subtask_completed(
        &self,
        viewer: &Viewer,
        subtask_id: i64,
        completed: bool,
    ) -> Result<Subtask> {
        let mut tx = begin_write(self.pool).await?;
        let subtask = fetch_subtask(&mut tx, viewer.org_id, subtask_id).await?;
        if subtask.is_completed == completed {
            return Ok(subtask);
        }

        let (completed_at, completed_by) = if completed {
            (Some(Utc::now()), Some(viewer.user_id))
        } else {
            (None, None)
        };

        sqlx::query(
            "UPDATE subtasks SET is_completed = ?, completed_at = ?, completed_by = ? WHERE id = ?",
        )
        .bind(completed)
        .bind(completed_at)
        .bind(completed_by)
        .bind(subtask_id)
        .execute(&mut *tx)
        .await?;

        let details = if completed {
            ActivityDetails::SubtaskCompleted {
                subtask_id,
                title: subtask.title.clone(),
            }
        } else {
            ActivityDetails::SubtaskUncompleted {
                subtask_id,
                title: subtask.title.clone(),
            }
        };
        activity::record(&mut tx, viewer.org_id, subtask.task_id, viewer.user_id, details).await?;
        tx.commit().await?;

        Ok(Subtask {
            is_completed: completed,
            completed_at,
            completed_by,
            ..subtask
        })
    }

    pub async fn delete_subtask(&self, viewer: &Viewer, subtask_id: i64) -> Result<()> {
        let mut tx = begin_write(self.pool).await?;
        let subtask = fetch_subtask(&mut tx, viewer.org_id, subtask_id).await?;

        sqlx::query("DELETE FROM subtasks WHERE id = ?")
            .bind(subtask_id)
            .execute(&mut *tx)
            .await?;

        activity::record(
            &mut tx,
            viewer.org_id,
            subtask.task_id,
            viewer.user_id,
            ActivityDetails::SubtaskDeleted {
                subtask_id,
                title: subtask.title,
            },
        )
        .await?;
        tx.commit().await?;

        crate::log_task_operation!("subtask_delete", subtask.task_id);
        Ok(())
    }

    /// Rewrite positions as 1..=n in the given order.
    ///
    /// `ordered_ids` must name every subtask of the task exactly once.
    pub async fn reorder_subtasks(
        &self,
        viewer: &Viewer,
        task_id: i64,
        ordered_ids: &[i64],
    ) -> Result<Vec<Subtask>> {
        let mut tx = begin_write(self.pool).await?;
        ensure_task(&mut tx, viewer.org_id, task_id).await?;

        let current = fetch_for_task(&mut tx, task_id).await?;
        let existing: BTreeSet<i64> = current.iter().map(|s| s.id).collect();
        let requested: BTreeSet<i64> = ordered_ids.iter().copied().collect();
        if requested.len() != ordered_ids.len() || requested != existing {
            return Err(FirmError::Validation(format!(
                "Subtask order must list each of the task's {} subtasks exactly once",
                existing.len()
            )));
        }

        let old_order: Vec<i64> = current.iter().map(|s| s.id).collect();
        if old_order == ordered_ids {
            return Ok(current);
        }

        for (index, id) in ordered_ids.iter().enumerate() {
            sqlx::query("UPDATE subtasks SET position = ? WHERE id = ?")
                .bind(index as i64 + 1)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let join = |ids: &[i64]| {
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        activity::record(
            &mut tx,
            viewer.org_id,
            task_id,
            viewer.user_id,
            ActivityDetails::Updated {
                field: "subtask_order".to_string(),
                old_value: Some(join(&old_order)),
                new_value: Some(join(ordered_ids)),
            },
        )
        .await?;

        let reordered = fetch_for_task(&mut tx, task_id).await?;
        tx.commit().await?;
        Ok(reordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityManager;
    use crate::db::models::{ActivityAction, Role};
    use crate::test_utils::test_helpers::TestContext;

    #[tokio::test]
    async fn test_add_appends_positions() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;
        let task = ctx.task(&alice, "Year-end close").await;

        let subtasks = SubtaskManager::new(ctx.pool());
        for title in ["Collect statements", "Reconcile", "Adjusting entries"] {
            subtasks.add_subtask(&alice, task.id, title).await.unwrap();
        }

        let list = subtasks.list_subtasks(&alice, task.id).await.unwrap();
        let positions: Vec<i64> = list.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(list[0].title, "Collect statements");

        assert!(matches!(
            subtasks.add_subtask(&alice, task.id, "  ").await,
            Err(FirmError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_sets_and_clears_together() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;
        let task = ctx.task(&alice, "Onboard client").await;

        let subtasks = SubtaskManager::new(ctx.pool());
        let item = subtasks
            .add_subtask(&alice, task.id, "Signed engagement letter")
            .await
            .unwrap();

        let done = subtasks
            .set_subtask_completed(&alice, item.id, true)
            .await
            .unwrap();
        assert!(done.is_completed);
        assert_eq!(done.completed_by, Some(alice.user_id));
        assert!(done.completed_at.is_some());

        let undone = subtasks
            .set_subtask_completed(&alice, item.id, false)
            .await
            .unwrap();
        assert!(!undone.is_completed);
        assert!(undone.completed_at.is_none());
        assert!(undone.completed_by.is_none());

        let actions: Vec<ActivityAction> = ActivityManager::new(ctx.pool())
            .list_for_task(&alice, task.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                ActivityAction::SubtaskUncompleted,
                ActivityAction::SubtaskCompleted,
                ActivityAction::SubtaskAdded,
                ActivityAction::Created,
            ]
        );
    }

    #[tokio::test]
    async fn test_reorder_requires_permutation() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;
        let task = ctx.task(&alice, "Payroll setup").await;

        let subtasks = SubtaskManager::new(ctx.pool());
        let a = subtasks.add_subtask(&alice, task.id, "A").await.unwrap();
        let b = subtasks.add_subtask(&alice, task.id, "B").await.unwrap();
        let c = subtasks.add_subtask(&alice, task.id, "C").await.unwrap();

        for bad in [vec![a.id, b.id], vec![a.id, b.id, b.id], vec![a.id, b.id, c.id, 999]] {
            assert!(matches!(
                subtasks.reorder_subtasks(&alice, task.id, &bad).await,
                Err(FirmError::Validation(_))
            ));
        }

        let reordered = subtasks
            .reorder_subtasks(&alice, task.id, &[c.id, a.id, b.id])
            .await
            .unwrap();
        let titles: Vec<&str> = reordered.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_delete_and_cascade() {
        let ctx = TestContext::new().await;
        let org = ctx.org("Acme CPA").await;
        let other = ctx.org("Other LLP").await;
        let alice = ctx.user(org, "Alice", Role::Staff).await;
        let mallory = ctx.user(other, "Mallory", Role::Owner).await;
        let task = ctx.task(&alice, "Sales tax").await;

        let subtasks = SubtaskManager::new(ctx.pool());
        let first = subtasks.add_subtask(&alice, task.id, "File CA").await.unwrap();
        subtasks.add_subtask(&alice, task.id, "File NV").await.unwrap();

        assert!(matches!(
            subtasks.delete_subtask(&mallory, first.id).await,
            Err(FirmError::NotFound { .. })
        ));
        subtasks.delete_subtask(&alice, first.id).await.unwrap();
        assert_eq!(subtasks.list_subtasks(&alice, task.id).await.unwrap().len(), 1);

        crate::tasks::TaskManager::new(ctx.pool())
            .delete_task(&alice, task.id)
            .await
            .unwrap();
        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subtasks")
            .fetch_one(ctx.pool())
            .await
            .unwrap();
        assert_eq!(left, 0);
    }
}
