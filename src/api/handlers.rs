use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use super::auth::Caller;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::models::*;
use super::server::AppState;
use crate::activity::ActivityManager;
use crate::audit::{AuditEvent, AuditLog};
use crate::board::{Board, BoardManager};
use crate::db::models::{
    ActionItem, ActionType, ActivityEntry, AuditLogEntry, Client, NewActionType, NewClient,
    NewTask, PrivacySettings, PrivacySettingsUpdate, Subtask, Task, TaskFilter, TaskUpdate,
    TaskView, User, UserStats,
};
use crate::directory::Directory;
use crate::error::{FirmError, Result};
use crate::privacy::PrivacyFilter;
use crate::subtasks::SubtaskManager;
use crate::tasks::TaskManager;

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>)>;

const DEFAULT_AUDIT_LIMIT: i64 = 100;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse { data })))
}

fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse { data })))
}

fn view(task: Task) -> TaskView {
    TaskView::new(task, Utc::now().date_naive())
}

/// Audit failures are logged but never fail a request that already committed
async fn record_audit(state: &AppState, event: AuditEvent) {
    if let Err(e) = AuditLog::new(&state.db_pool).record(event).await {
        tracing::warn!(error = %e, "Failed to write audit entry");
    }
}

/// A task the caller may see. Tasks hidden by their assignee look absent.
async fn visible_task(state: &AppState, caller: &Caller, id: i64) -> Result<Task> {
    let task = TaskManager::new(&state.db_pool)
        .get_task(caller.viewer.org_id, id)
        .await?;
    let visible = PrivacyFilter::new(&state.db_pool)
        .can_view_task(&task, &caller.viewer)
        .await?;
    if !visible {
        return Err(FirmError::task_not_found(id));
    }
    Ok(task)
}

// ============================================================================
// Tasks
// ============================================================================

/// Team task listing with filters, privacy applied
pub async fn list_tasks(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(filter): ApiQuery<TaskFilter>,
) -> ApiResult<Vec<TaskView>> {
    let tasks = TaskManager::new(&state.db_pool)
        .find_tasks(caller.viewer.org_id, &filter)
        .await?;
    let tasks = PrivacyFilter::new(&state.db_pool)
        .filter_tasks_by_privacy(tasks, &caller.viewer)
        .await?;
    ok(TaskView::today(tasks))
}

pub async fn create_task(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<NewTask>,
) -> ApiResult<TaskView> {
    let task = TaskManager::new(&state.db_pool)
        .add_task(&caller.viewer, req)
        .await?;
    record_audit(&state, caller.audit("task.create", "task").resource(task.id)).await;
    created(view(task))
}

/// Turn an inbound call, email or document into an action item
pub async fn create_from_action(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<ActionItem>,
) -> ApiResult<TaskView> {
    let task = TaskManager::new(&state.db_pool)
        .create_from_action(&caller.viewer, req)
        .await?;
    record_audit(
        &state,
        caller
            .audit("task.from_action", "task")
            .resource(task.id)
            .details(json!({ "source_type": task.source_type.as_str() })),
    )
    .await;
    created(view(task))
}

pub async fn get_task(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<TaskView> {
    ok(view(visible_task(&state, &caller, id).await?))
}

pub async fn update_task(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(patch): ApiJson<TaskUpdate>,
) -> ApiResult<TaskView> {
    visible_task(&state, &caller, id).await?;
    let task = TaskManager::new(&state.db_pool)
        .update_task(&caller.viewer, id, patch)
        .await?;
    record_audit(&state, caller.audit("task.update", "task").resource(id)).await;
    ok(view(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    visible_task(&state, &caller, id).await?;
    let task = TaskManager::new(&state.db_pool)
        .delete_task(&caller.viewer, id)
        .await?;
    record_audit(
        &state,
        caller
            .audit("task.delete", "task")
            .resource(id)
            .details(json!({ "title": task.title })),
    )
    .await;
    ok(json!({ "id": id, "deleted": true }))
}

pub async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<TaskView> {
    visible_task(&state, &caller, id).await?;
    let task = TaskManager::new(&state.db_pool)
        .update_status(&caller.viewer, id, req.status)
        .await?;
    record_audit(
        &state,
        caller
            .audit("task.status", "task")
            .resource(id)
            .details(json!({ "status": req.status.as_str() })),
    )
    .await;
    ok(view(task))
}

pub async fn assign_task(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<AssignRequest>,
) -> ApiResult<TaskView> {
    visible_task(&state, &caller, id).await?;
    let task = TaskManager::new(&state.db_pool)
        .assign(&caller.viewer, id, req.user_id)
        .await?;
    record_audit(
        &state,
        caller
            .audit("task.assign", "task")
            .resource(id)
            .details(json!({ "assigned_to": req.user_id })),
    )
    .await;
    ok(view(task))
}

/// Return a task to the pool; serves both unassign and unclaim
pub async fn release_task(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<TaskView> {
    visible_task(&state, &caller, id).await?;
    let task = TaskManager::new(&state.db_pool)
        .release(&caller.viewer, id)
        .await?;
    record_audit(&state, caller.audit("task.release", "task").resource(id)).await;
    ok(view(task))
}

// ============================================================================
// Task pool and personal views
// ============================================================================

pub async fn pool_tasks(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<TaskView>> {
    let tasks = TaskManager::new(&state.db_pool)
        .list_unassigned(caller.viewer.org_id)
        .await?;
    ok(TaskView::today(tasks))
}

pub async fn claim_task(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<TaskView> {
    let task = TaskManager::new(&state.db_pool)
        .claim(&caller.viewer, id)
        .await?;
    record_audit(&state, caller.audit("task.claim", "task").resource(id)).await;
    ok(view(task))
}

pub async fn my_tasks(State(state): State<AppState>, caller: Caller) -> ApiResult<Vec<TaskView>> {
    let tasks = TaskManager::new(&state.db_pool)
        .list_by_assignee(caller.viewer.org_id, caller.viewer.user_id)
        .await?;
    ok(TaskView::today(tasks))
}

pub async fn my_inbox(State(state): State<AppState>, caller: Caller) -> ApiResult<Vec<TaskView>> {
    let tasks = TaskManager::new(&state.db_pool)
        .inbox(caller.viewer.org_id, caller.viewer.user_id)
        .await?;
    ok(TaskView::today(tasks))
}

pub async fn org_feed(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> ApiResult<Vec<TaskView>> {
    let tasks = TaskManager::new(&state.db_pool)
        .org_feed(caller.viewer.org_id, query.limit)
        .await?;
    let tasks = PrivacyFilter::new(&state.db_pool)
        .filter_tasks_by_privacy(tasks, &caller.viewer)
        .await?;
    ok(TaskView::today(tasks))
}

pub async fn calendar(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<CalendarQuery>,
) -> ApiResult<Vec<TaskView>> {
    let tasks = TaskManager::new(&state.db_pool)
        .list_due_between(caller.viewer.org_id, query.from, query.to)
        .await?;
    let tasks = PrivacyFilter::new(&state.db_pool)
        .filter_calendar_by_privacy(tasks, &caller.viewer)
        .await?;
    ok(TaskView::today(tasks))
}

// ============================================================================
// Board
// ============================================================================

pub async fn board(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<BoardQuery>,
) -> ApiResult<Board> {
    let board = BoardManager::new(&state.db_pool)
        .board(&caller.viewer, query.scope)
        .await?;
    ok(board)
}

pub async fn move_card(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<MoveCardRequest>,
) -> ApiResult<TaskView> {
    visible_task(&state, &caller, req.task_id).await?;
    let task = BoardManager::new(&state.db_pool)
        .move_card(&caller.viewer, req.task_id, req.column)
        .await?;
    record_audit(
        &state,
        caller
            .audit("task.status", "task")
            .resource(req.task_id)
            .details(json!({ "status": task.status.as_str() })),
    )
    .await;
    ok(view(task))
}

// ============================================================================
// Subtasks
// ============================================================================

pub async fn list_subtasks(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(task_id): ApiPath<i64>,
) -> ApiResult<Vec<Subtask>> {
    visible_task(&state, &caller, task_id).await?;
    let subtasks = SubtaskManager::new(&state.db_pool)
        .list_subtasks(&caller.viewer, task_id)
        .await?;
    ok(subtasks)
}

pub async fn create_subtask(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(task_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateSubtaskRequest>,
) -> ApiResult<Subtask> {
    visible_task(&state, &caller, task_id).await?;
    let subtask = SubtaskManager::new(&state.db_pool)
        .add_subtask(&caller.viewer, task_id, &req.title)
        .await?;
    created(subtask)
}

pub async fn reorder_subtasks(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(task_id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReorderSubtasksRequest>,
) -> ApiResult<Vec<Subtask>> {
    visible_task(&state, &caller, task_id).await?;
    let subtasks = SubtaskManager::new(&state.db_pool)
        .reorder_subtasks(&caller.viewer, task_id, &req.subtask_ids)
        .await?;
    ok(subtasks)
}

pub async fn update_subtask(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateSubtaskRequest>,
) -> ApiResult<Subtask> {
    let subtasks = SubtaskManager::new(&state.db_pool);
    let task_id = subtasks.parent_task_id(&caller.viewer, id).await?;
    visible_task(&state, &caller, task_id).await?;
    let subtask = subtasks
        .set_subtask_completed(&caller.viewer, id, req.is_completed)
        .await?;
    ok(subtask)
}

pub async fn delete_subtask(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Value> {
    let subtasks = SubtaskManager::new(&state.db_pool);
    let task_id = subtasks.parent_task_id(&caller.viewer, id).await?;
    visible_task(&state, &caller, task_id).await?;
    subtasks.delete_subtask(&caller.viewer, id).await?;
    ok(json!({ "id": id, "deleted": true }))
}

// ============================================================================
// Activity
// ============================================================================

pub async fn task_activity(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(task_id): ApiPath<i64>,
) -> ApiResult<Vec<ActivityEntry>> {
    visible_task(&state, &caller, task_id).await?;
    let entries = ActivityManager::new(&state.db_pool)
        .list_for_task(&caller.viewer, task_id)
        .await?;
    ok(entries)
}

pub async fn add_comment(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(task_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> ApiResult<ActivityEntry> {
    visible_task(&state, &caller, task_id).await?;
    let entry = ActivityManager::new(&state.db_pool)
        .add_comment(&caller.viewer, task_id, &req.body)
        .await?;
    created(entry)
}

pub async fn activity_feed(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> ApiResult<Vec<ActivityEntry>> {
    let entries = ActivityManager::new(&state.db_pool)
        .list_recent(&caller.viewer, query.limit, query.user_id)
        .await?;
    ok(entries)
}

// ============================================================================
// Users and privacy
// ============================================================================

pub async fn team(State(state): State<AppState>, caller: Caller) -> ApiResult<Vec<User>> {
    let users = Directory::new(&state.db_pool)
        .team(caller.viewer.org_id)
        .await?;
    ok(users)
}

pub async fn user_stats(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(user_id): ApiPath<i64>,
) -> ApiResult<UserStats> {
    Directory::new(&state.db_pool)
        .get_user(caller.viewer.org_id, user_id)
        .await?;
    let stats = PrivacyFilter::new(&state.db_pool)
        .get_user_stats_with_privacy(&caller.viewer, user_id)
        .await?;
    ok(stats)
}

pub async fn get_privacy_settings(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<PrivacySettings> {
    let settings = PrivacyFilter::new(&state.db_pool)
        .get_settings(caller.viewer.user_id)
        .await?;
    ok(settings)
}

pub async fn update_privacy_settings(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<PrivacySettingsUpdate>,
) -> ApiResult<PrivacySettings> {
    let settings = PrivacyFilter::new(&state.db_pool)
        .upsert_settings(&caller.viewer, req)
        .await?;
    record_audit(
        &state,
        caller
            .audit("privacy.update", "user")
            .resource(caller.viewer.user_id),
    )
    .await;
    ok(settings)
}

// ============================================================================
// Clients and action types
// ============================================================================

pub async fn list_clients(State(state): State<AppState>, caller: Caller) -> ApiResult<Vec<Client>> {
    let clients = Directory::new(&state.db_pool)
        .list_clients(caller.viewer.org_id)
        .await?;
    ok(clients)
}

pub async fn create_client(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<NewClient>,
) -> ApiResult<Client> {
    let client = Directory::new(&state.db_pool)
        .create_client(caller.viewer.org_id, req)
        .await?;
    record_audit(&state, caller.audit("client.create", "client").resource(client.id)).await;
    created(client)
}

pub async fn get_client(
    State(state): State<AppState>,
    caller: Caller,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Client> {
    let client = Directory::new(&state.db_pool)
        .get_client(caller.viewer.org_id, id)
        .await?;
    ok(client)
}

pub async fn list_action_types(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<ActionType>> {
    let types = Directory::new(&state.db_pool)
        .list_action_types(caller.viewer.org_id)
        .await?;
    ok(types)
}

pub async fn create_action_type(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<NewActionType>,
) -> ApiResult<ActionType> {
    let action_type = Directory::new(&state.db_pool)
        .create_action_type(caller.viewer.org_id, req)
        .await?;
    record_audit(
        &state,
        caller
            .audit("action_type.create", "action_type")
            .resource(action_type.id),
    )
    .await;
    created(action_type)
}

// ============================================================================
// Audit
// ============================================================================

/// Administrators only: recent entries, or one session's trail
pub async fn audit_logs(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> ApiResult<Vec<AuditLogEntry>> {
    if !caller.viewer.is_admin() {
        return Err(FirmError::Forbidden(
            "Audit logs are only available to administrators".to_string(),
        ));
    }

    let audit = AuditLog::new(&state.db_pool);
    let entries = match query.session_id.as_deref() {
        Some(session_id) => audit.get_session_logs(caller.viewer.org_id, session_id).await?,
        None => {
            audit
                .get_recent_logs(
                    caller.viewer.org_id,
                    query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT),
                )
                .await?
        },
    };
    ok(entries)
}
