//! SQL query constants and fragments
//!
//! Column lists and base SELECTs shared by the managers. Dynamic WHERE
//! clauses are still built inline with `QueryBuilder`.

// ============================================================================
// Task Queries
// ============================================================================

/// Column list matching `Task`'s `FromRow` layout
pub const TASK_COLUMNS: &str = "id, org_id, title, description, status, priority, source_type, \
     source_email_id, source_metadata, action_type_id, client_id, assigned_to, claimed_by, \
     assigned_by, assigned_at, claimed_at, due_date, completed_at, created_by, created_at, updated_at";

/// Base SELECT for tasks. Add WHERE clauses as needed.
pub const SELECT_TASK: &str = const_format::formatcp!("SELECT {} FROM tasks", TASK_COLUMNS);

/// Single task scoped to an organization
pub const SELECT_TASK_BY_ID: &str =
    const_format::formatcp!("{} WHERE id = ? AND org_id = ?", SELECT_TASK);

/// Org-wide pool: nobody assigned, nobody claimed, still actionable
pub const SELECT_POOL_TASKS: &str = const_format::formatcp!(
    "{} WHERE org_id = ? AND assigned_to IS NULL AND claimed_by IS NULL \
     AND status NOT IN ('completed', 'cancelled') \
     ORDER BY created_at ASC, id ASC",
    SELECT_TASK
);

/// Tasks held by a user, either by assignment or by claim
pub const SELECT_TASKS_BY_ASSIGNEE: &str = const_format::formatcp!(
    "{} WHERE org_id = ? AND (assigned_to = ? OR claimed_by = ?) \
     ORDER BY due_date IS NULL, due_date ASC, id ASC",
    SELECT_TASK
);

/// Open action items for a user: non-manual tasks they hold or nobody holds yet;
/// binds: org, user, user
pub const SELECT_INBOX_TASKS: &str = const_format::formatcp!(
    "{} WHERE org_id = ? AND source_type != 'manual' \
     AND status NOT IN ('completed', 'cancelled') \
     AND (assigned_to = ? OR claimed_by = ? OR (assigned_to IS NULL AND claimed_by IS NULL)) \
     ORDER BY created_at DESC, id DESC",
    SELECT_TASK
);

/// Newest tasks of an organization; binds: org, limit
pub const SELECT_ORG_FEED: &str = const_format::formatcp!(
    "{} WHERE org_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
    SELECT_TASK
);

/// Check if a task exists in an organization
pub const CHECK_TASK_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ? AND org_id = ?)";

/// Compare-and-swap claim: only succeeds while the task is still in the pool
pub const CLAIM_TASK: &str = "UPDATE tasks \
     SET assigned_to = ?, claimed_by = ?, claimed_at = ?, updated_at = ? \
     WHERE id = ? AND org_id = ? AND assigned_to IS NULL AND claimed_by IS NULL \
     AND status NOT IN ('completed', 'cancelled')";

/// Return a task to the pool
pub const RELEASE_TASK: &str = "UPDATE tasks \
     SET assigned_to = NULL, claimed_by = NULL, assigned_by = NULL, \
         assigned_at = NULL, claimed_at = NULL, updated_at = ? \
     WHERE id = ? AND org_id = ?";

/// Per-user counters used by the stats endpoint; binds: today, org, user, user
pub const COUNT_TASKS_FOR_USER: &str = r#"
    SELECT
        COUNT(*) AS total,
        COALESCE(SUM(CASE WHEN status = 'open' THEN 1 ELSE 0 END), 0) AS open,
        COALESCE(SUM(CASE WHEN status IN ('in_progress', 'review') THEN 1 ELSE 0 END), 0) AS in_progress,
        COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
        COALESCE(SUM(CASE WHEN due_date < ? AND status NOT IN ('completed', 'cancelled') THEN 1 ELSE 0 END), 0) AS overdue
    FROM tasks
    WHERE org_id = ? AND (assigned_to = ? OR claimed_by = ?)
"#;

// ============================================================================
// Subtask Queries
// ============================================================================

pub const SUBTASK_COLUMNS: &str =
    "id, task_id, title, position, is_completed, completed_at, completed_by, created_at";

pub const SELECT_SUBTASK: &str =
    const_format::formatcp!("SELECT {} FROM subtasks", SUBTASK_COLUMNS);

// ============================================================================
// Activity Queries
// ============================================================================

pub const ACTIVITY_COLUMNS: &str =
    "id, task_id, org_id, user_id, action, old_value, new_value, details, created_at";

pub const SELECT_ACTIVITY: &str =
    const_format::formatcp!("SELECT {} FROM task_activity", ACTIVITY_COLUMNS);

// ============================================================================
// Privacy / Directory Queries
// ============================================================================

pub const PRIVACY_COLUMNS: &str = "user_id, hide_tasks_from_peers, hide_activity_from_peers, \
     hide_performance_from_peers, hide_calendar_from_peers, visible_to_user_ids, updated_at";

pub const SELECT_PRIVACY: &str =
    const_format::formatcp!("SELECT {} FROM user_privacy_settings", PRIVACY_COLUMNS);

pub const USER_COLUMNS: &str = "id, org_id, name, email, role, is_active, created_at";

pub const SELECT_USER: &str = const_format::formatcp!("SELECT {} FROM users", USER_COLUMNS);

pub const AUDIT_COLUMNS: &str =
    "id, org_id, user_id, session_id, action, resource_type, resource_id, details, created_at";

pub const SELECT_AUDIT: &str = const_format::formatcp!("SELECT {} FROM audit_logs", AUDIT_COLUMNS);
