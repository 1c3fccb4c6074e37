//! Task store: the org-wide pool, assignment, claims and status changes.
//!
//! Every mutation runs in a single transaction together with the activity
//! row describing it, so the task and its history never disagree.

use crate::activity;
use crate::board::check_transition;
use crate::db::models::{
    ActionItem, ActivityDetails, NewTask, SourceMetadata, SourceType, Task, TaskFilter,
    TaskStatus, TaskUpdate, Viewer,
};
use crate::db::begin_write;
use crate::directory;
use crate::error::{FirmError, Result};
use crate::priority::TaskPriority;
use crate::sql_constants::{
    CLAIM_TASK, RELEASE_TASK, SELECT_INBOX_TASKS, SELECT_ORG_FEED, SELECT_POOL_TASKS,
    SELECT_TASK, SELECT_TASKS_BY_ASSIGNEE, SELECT_TASK_BY_ID,
};
use chrono::{NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 1000;
const DEFAULT_FEED_LIMIT: i64 = 50;
const MAX_FEED_LIMIT: i64 = 200;

async fn fetch_task(conn: &mut SqliteConnection, org_id: i64, id: i64) -> Result<Task> {
    sqlx::query_as::<_, Task>(SELECT_TASK_BY_ID)
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(FirmError::task_not_found(id))
}

fn clean_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(FirmError::Validation("Task title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}

fn clean_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn updated<T: ToString>(field: &str, old: Option<T>, new: Option<T>) -> ActivityDetails {
    ActivityDetails::Updated {
        field: field.to_string(),
        old_value: old.map(|v| v.to_string()),
        new_value: new.map(|v| v.to_string()),
    }
}

/// Set the status and `completed_at` together and record the transition.
async fn apply_status(
    conn: &mut SqliteConnection,
    viewer: &Viewer,
    task: &Task,
    to: TaskStatus,
) -> Result<()> {
    let now = Utc::now();
    let completed_at = (to == TaskStatus::Completed).then_some(now);

    sqlx::query(
        "UPDATE tasks SET status = ?, completed_at = ?, updated_at = ? WHERE id = ? AND org_id = ?",
    )
    .bind(to)
    .bind(completed_at)
    .bind(now)
    .bind(task.id)
    .bind(task.org_id)
    .execute(&mut *conn)
    .await?;

    let from = task.status;
    let details = match (from, to) {
        (_, TaskStatus::Completed) => ActivityDetails::Completed { from },
        (_, TaskStatus::Cancelled) => ActivityDetails::Cancelled { from },
        (TaskStatus::Completed, to) => ActivityDetails::Reopened { to },
        (from, to) => ActivityDetails::StatusChanged { from, to },
    };
    activity::record(conn, task.org_id, task.id, viewer.user_id, details).await?;
    Ok(())
}

/// Hand a task to `target`. Any claim on it is dropped.
async fn apply_assign(
    conn: &mut SqliteConnection,
    viewer: &Viewer,
    task: &Task,
    target: i64,
) -> Result<()> {
    if task.status == TaskStatus::Cancelled {
        return Err(FirmError::Validation(format!(
            "Task {} is cancelled and cannot be assigned",
            task.id
        )));
    }
    directory::ensure_active_user(conn, task.org_id, target).await?;

    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE tasks
        SET assigned_to = ?, assigned_by = ?, assigned_at = ?,
            claimed_by = NULL, claimed_at = NULL, updated_at = ?
        WHERE id = ? AND org_id = ?
        "#,
    )
    .bind(target)
    .bind(viewer.user_id)
    .bind(now)
    .bind(now)
    .bind(task.id)
    .bind(task.org_id)
    .execute(&mut *conn)
    .await?;

    activity::record(
        conn,
        task.org_id,
        task.id,
        viewer.user_id,
        ActivityDetails::Assigned {
            from: task.holder(),
            to: target,
        },
    )
    .await?;
    Ok(())
}

/// Return a task to the pool. Only its holder or an administrator may.
async fn apply_release(conn: &mut SqliteConnection, viewer: &Viewer, task: &Task) -> Result<()> {
    if task.is_unassigned() {
        return Err(FirmError::Conflict(format!(
            "Task {} is already in the pool",
            task.id
        )));
    }
    let holds = task.assigned_to == Some(viewer.user_id) || task.claimed_by == Some(viewer.user_id);
    if !holds && !viewer.is_admin() {
        return Err(FirmError::Forbidden(format!(
            "Only the current holder or an administrator can release task {}",
            task.id
        )));
    }

    sqlx::query(RELEASE_TASK)
        .bind(Utc::now())
        .bind(task.id)
        .bind(task.org_id)
        .execute(&mut *conn)
        .await?;

    activity::record(
        conn,
        task.org_id,
        task.id,
        viewer.user_id,
        ActivityDetails::Released {
            previous: task.holder(),
        },
    )
    .await?;
    Ok(())
}

/// Common shape of manual tasks and inbound action items
struct Draft {
    title: String,
    description: Option<String>,
    priority: Option<TaskPriority>,
    status: Option<TaskStatus>,
    due_date: Option<NaiveDate>,
    client_id: Option<i64>,
    action_type_id: Option<i64>,
    assigned_to: Option<i64>,
    source: Option<SourceMetadata>,
}

impl From<NewTask> for Draft {
    fn from(new: NewTask) -> Self {
        Self {
            title: new.title,
            description: new.description,
            priority: new.priority,
            status: new.status,
            due_date: new.due_date,
            client_id: new.client_id,
            action_type_id: new.action_type_id,
            assigned_to: new.assigned_to,
            source: None,
        }
    }
}

impl From<ActionItem> for Draft {
    fn from(item: ActionItem) -> Self {
        Self {
            title: item.title,
            description: item.description,
            priority: item.priority,
            status: None,
            due_date: item.due_date,
            client_id: item.client_id,
            action_type_id: item.action_type_id,
            assigned_to: item.assigned_to,
            source: Some(item.source),
        }
    }
}

pub struct TaskManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TaskManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a manual task
    pub async fn add_task(&self, viewer: &Viewer, new: NewTask) -> Result<Task> {
        self.insert(viewer, new.into()).await
    }

    /// Turn an inbound call, email or document into a task
    pub async fn create_from_action(&self, viewer: &Viewer, item: ActionItem) -> Result<Task> {
        self.insert(viewer, item.into()).await
    }

    async fn insert(&self, viewer: &Viewer, draft: Draft) -> Result<Task> {
        let title = clean_title(&draft.title)?;
        let status = draft.status.unwrap_or(TaskStatus::Open);
        if status == TaskStatus::Cancelled {
            return Err(FirmError::Validation(
                "New tasks cannot start cancelled".to_string(),
            ));
        }

        let org_id = viewer.org_id;
        let now = Utc::now();
        let mut tx = begin_write(self.pool).await?;

        if let Some(client_id) = draft.client_id {
            directory::ensure_client(&mut tx, org_id, client_id).await?;
        }
        if let Some(action_type_id) = draft.action_type_id {
            directory::ensure_action_type(&mut tx, org_id, action_type_id).await?;
        }
        if let Some(assignee) = draft.assigned_to {
            directory::ensure_active_user(&mut tx, org_id, assignee).await?;
        }

        let source_type = draft
            .source
            .as_ref()
            .map(SourceMetadata::source_type)
            .unwrap_or(SourceType::Manual);
        let source_email_id = draft
            .source
            .as_ref()
            .and_then(SourceMetadata::email_id)
            .map(str::to_string);
        let (assigned_by, assigned_at) = match draft.assigned_to {
            Some(_) => (Some(viewer.user_id), Some(now)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (
                org_id, title, description, status, priority, source_type,
                source_email_id, source_metadata, action_type_id, client_id,
                assigned_to, assigned_by, assigned_at, due_date, completed_at,
                created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(org_id)
        .bind(&title)
        .bind(clean_text(draft.description))
        .bind(status)
        .bind(draft.priority.unwrap_or_default())
        .bind(source_type)
        .bind(source_email_id)
        .bind(draft.source.as_ref().map(Json))
        .bind(draft.action_type_id)
        .bind(draft.client_id)
        .bind(draft.assigned_to)
        .bind(assigned_by)
        .bind(assigned_at)
        .bind(draft.due_date)
        .bind((status == TaskStatus::Completed).then_some(now))
        .bind(viewer.user_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();
        activity::record(
            &mut tx,
            org_id,
            id,
            viewer.user_id,
            ActivityDetails::Created {
                title: title.clone(),
            },
        )
        .await?;
        if let Some(assignee) = draft.assigned_to {
            activity::record(
                &mut tx,
                org_id,
                id,
                viewer.user_id,
                ActivityDetails::Assigned {
                    from: None,
                    to: assignee,
                },
            )
            .await?;
        }

        let task = fetch_task(&mut tx, org_id, id).await?;
        tx.commit().await?;

        crate::log_task_operation!("create", id, source_type.as_str());
        Ok(task)
    }

    pub async fn get_task(&self, org_id: i64, id: i64) -> Result<Task> {
        let mut conn = self.pool.acquire().await?;
        fetch_task(&mut conn, org_id, id).await
    }

    /// Filtered org-wide listing, most pressing first
    pub async fn find_tasks(&self, org_id: i64, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new(format!("{} WHERE org_id = ", SELECT_TASK));
        builder.push_bind(org_id);

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            builder.push(" AND priority = ").push_bind(priority);
        }
        if let Some(user_id) = filter.assigned_to {
            builder
                .push(" AND (assigned_to = ")
                .push_bind(user_id)
                .push(" OR claimed_by = ")
                .push_bind(user_id)
                .push(")");
        }
        if let Some(client_id) = filter.client_id {
            builder.push(" AND client_id = ").push_bind(client_id);
        }
        if let Some(source_type) = filter.source_type {
            builder.push(" AND source_type = ").push_bind(source_type);
        }
        if filter.overdue_only {
            builder
                .push(" AND due_date < ")
                .push_bind(Utc::now().date_naive())
                .push(" AND status NOT IN ('completed', 'cancelled')");
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = filter.offset.unwrap_or(0).max(0);
        builder
            .push(format!(
                " ORDER BY {}, due_date IS NULL, due_date ASC, id ASC LIMIT ",
                TaskPriority::SQL_RANK
            ))
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let tasks = builder.build_query_as::<Task>().fetch_all(self.pool).await?;
        Ok(tasks)
    }

    /// The org pool: unassigned, unclaimed and still actionable, oldest first
    pub async fn list_unassigned(&self, org_id: i64) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(SELECT_POOL_TASKS)
            .bind(org_id)
            .fetch_all(self.pool)
            .await?;
        Ok(tasks)
    }

    /// Tasks assigned to or claimed by `user_id`
    pub async fn list_by_assignee(&self, org_id: i64, user_id: i64) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(SELECT_TASKS_BY_ASSIGNEE)
            .bind(org_id)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(tasks)
    }

    /// Inbound action items waiting on `user_id`, newest first
    pub async fn inbox(&self, org_id: i64, user_id: i64) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(SELECT_INBOX_TASKS)
            .bind(org_id)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(tasks)
    }

    /// Newest tasks in the organization
    pub async fn org_feed(&self, org_id: i64, limit: Option<i64>) -> Result<Vec<Task>> {
        let limit = limit.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, MAX_FEED_LIMIT);
        let tasks = sqlx::query_as::<_, Task>(SELECT_ORG_FEED)
            .bind(org_id)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        Ok(tasks)
    }

    /// Non-cancelled tasks due within `from..=to`
    pub async fn list_due_between(&self, org_id: i64, from: NaiveDate, to: NaiveDate) -> Result<Vec<Task>> {
        if from > to {
            return Err(FirmError::Validation(format!(
                "Invalid range: {} is after {}",
                from, to
            )));
        }
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "{} WHERE org_id = ? AND due_date BETWEEN ? AND ? AND status != 'cancelled' \
             ORDER BY due_date ASC, id ASC",
            SELECT_TASK
        ))
        .bind(org_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;
        Ok(tasks)
    }

    /// Partial update. Each changed field gets its own activity row.
    pub async fn update_task(&self, viewer: &Viewer, id: i64, patch: TaskUpdate) -> Result<Task> {
        let org_id = viewer.org_id;
        let mut tx = begin_write(self.pool).await?;
        let task = fetch_task(&mut tx, org_id, id).await?;

        // Validate the status up front so nothing is written for a rejected patch
        if let Some(status) = patch.status {
            check_transition(task.status, status)?;
        }

        let now = Utc::now();
        let mut changes: Vec<ActivityDetails> = Vec::new();
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("UPDATE tasks SET updated_at = ");
        builder.push_bind(now);

        if let Some(title) = &patch.title {
            let title = clean_title(title)?;
            if title != task.title {
                builder.push(", title = ").push_bind(title.clone());
                changes.push(updated("title", Some(task.title.clone()), Some(title)));
            }
        }

        if let Some(description) = patch.description {
            let description = clean_text(description);
            if description != task.description {
                builder.push(", description = ").push_bind(description.clone());
                changes.push(updated("description", task.description.clone(), description));
            }
        }

        if let Some(priority) = patch.priority {
            if priority != task.priority {
                builder.push(", priority = ").push_bind(priority);
                changes.push(updated(
                    "priority",
                    Some(task.priority.as_str()),
                    Some(priority.as_str()),
                ));
            }
        }

        if let Some(due_date) = patch.due_date {
            if due_date != task.due_date {
                builder.push(", due_date = ").push_bind(due_date);
                changes.push(updated("due_date", task.due_date, due_date));
            }
        }

        if let Some(client_id) = patch.client_id {
            if client_id != task.client_id {
                if let Some(cid) = client_id {
                    directory::ensure_client(&mut tx, org_id, cid).await?;
                }
                builder.push(", client_id = ").push_bind(client_id);
                changes.push(updated("client_id", task.client_id, client_id));
            }
        }

        if let Some(action_type_id) = patch.action_type_id {
            if action_type_id != task.action_type_id {
                if let Some(aid) = action_type_id {
                    directory::ensure_action_type(&mut tx, org_id, aid).await?;
                }
                builder.push(", action_type_id = ").push_bind(action_type_id);
                changes.push(updated("action_type_id", task.action_type_id, action_type_id));
            }
        }

        if !changes.is_empty() {
            builder
                .push(" WHERE id = ")
                .push_bind(id)
                .push(" AND org_id = ")
                .push_bind(org_id);
            builder.build().execute(&mut *tx).await?;

            for details in changes {
                activity::record(&mut tx, org_id, id, viewer.user_id, details).await?;
            }
        }

        match patch.assigned_to {
            Some(Some(target)) if task.assigned_to != Some(target) || task.claimed_by.is_some() => {
                apply_assign(&mut tx, viewer, &task, target).await?;
            },
            Some(None) if !task.is_unassigned() => {
                apply_release(&mut tx, viewer, &task).await?;
            },
            _ => {},
        }

        if let Some(status) = patch.status {
            if status != task.status {
                apply_status(&mut tx, viewer, &task, status).await?;
            }
        }

        let task = fetch_task(&mut tx, org_id, id).await?;
        tx.commit().await?;

        crate::log_task_operation!("update", id);
        Ok(task)
    }

    /// Move a task to `status`. A same-status request is a no-op.
    pub async fn update_status(&self, viewer: &Viewer, id: i64, status: TaskStatus) -> Result<Task> {
        let mut tx = begin_write(self.pool).await?;
        let task = fetch_task(&mut tx, viewer.org_id, id).await?;
        check_transition(task.status, status)?;
        if task.status == status {
            return Ok(task);
        }

        apply_status(&mut tx, viewer, &task, status).await?;
        let task = fetch_task(&mut tx, viewer.org_id, id).await?;
        tx.commit().await?;

        crate::log_task_operation!("status", id, status.as_str());
        Ok(task)
    }

    /// Take a task from the pool.
    ///
    /// The update only matches while the task is still unheld, so of two
    /// racing claims exactly one succeeds; the other gets `Conflict`.
    pub async fn claim(&self, viewer: &Viewer, id: i64) -> Result<Task> {
        let now = Utc::now();
        let mut tx = begin_write(self.pool).await?;

        let result = sqlx::query(CLAIM_TASK)
            .bind(viewer.user_id)
            .bind(viewer.user_id)
            .bind(now)
            .bind(now)
            .bind(id)
            .bind(viewer.org_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            let task = fetch_task(&mut tx, viewer.org_id, id).await?;
            return Err(match task.holder() {
                Some(holder) => FirmError::Conflict(format!(
                    "Task {} is already held by user {}",
                    id, holder
                )),
                None => FirmError::Conflict(format!(
                    "Task {} is {} and cannot be claimed",
                    id,
                    task.status.as_str()
                )),
            });
        }

        activity::record(&mut tx, viewer.org_id, id, viewer.user_id, ActivityDetails::Claimed)
            .await?;
        let task = fetch_task(&mut tx, viewer.org_id, id).await?;
        tx.commit().await?;

        crate::log_task_operation!("claim", id);
        Ok(task)
    }

    /// Give a task to an active member of the organization
    pub async fn assign(&self, viewer: &Viewer, id: i64, target: i64) -> Result<Task> {
        let mut tx = begin_write(self.pool).await?;
        let task = fetch_task(&mut tx, viewer.org_id, id).await?;
        if task.assigned_to == Some(target) && task.claimed_by.is_none() {
            return Ok(task);
        }

        apply_assign(&mut tx, viewer, &task, target).await?;
        let task = fetch_task(&mut tx, viewer.org_id, id).await?;
        tx.commit().await?;

        crate::log_task_operation!("assign", id);
        Ok(task)
    }

    /// Put a task back in the pool
    pub async fn release(&self, viewer: &Viewer, id: i64) -> Result<Task> {
        let mut tx = begin_write(self.pool).await?;
        let task = fetch_task(&mut tx, viewer.org_id, id).await?;

        apply_release(&mut tx, viewer, &task).await?;
        let task = fetch_task(&mut tx, viewer.org_id, id).await?;
        tx.commit().await?;

        crate::log_task_operation!("release", id);
        Ok(task)
    }

    /// Hard delete; subtasks and activity go with it. Returns the removed task.
    pub async fn delete_task(&self, viewer: &Viewer, id: i64) -> Result<Task> {
        let mut tx = begin_write(self.pool).await?;
        let task = fetch_task(&mut tx, viewer.org_id, id).await?;

        if !viewer.is_admin() && task.created_by != Some(viewer.user_id) {
            return Err(FirmError::Forbidden(format!(
                "Only an administrator or the creator can delete task {}",
                id
            )));
        }

        sqlx::query("DELETE FROM tasks WHERE id = ? AND org_id = ?")
            .bind(id)
            .bind(viewer.org_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        crate::log_task_operation!("delete", id);
        Ok(task)
    }
}
