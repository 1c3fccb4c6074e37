use axum::{
    routing::{get, patch, post, put},
    Router,
};

use super::{handlers, server::AppState};

/// Create API router with all endpoints
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Tasks
        .route("/tasks", get(handlers::list_tasks).post(handlers::create_task))
        .route("/tasks/from-action", post(handlers::create_from_action))
        .route(
            "/tasks/:id",
            get(handlers::get_task)
                .patch(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/tasks/:id/status", patch(handlers::update_status))
        .route(
            "/tasks/:id/assign",
            post(handlers::assign_task).delete(handlers::release_task),
        )
        .route(
            "/tasks/:id/subtasks",
            get(handlers::list_subtasks).post(handlers::create_subtask),
        )
        .route("/tasks/:id/subtasks/order", put(handlers::reorder_subtasks))
        .route("/tasks/:id/activity", get(handlers::task_activity))
        .route("/tasks/:id/comments", post(handlers::add_comment))
        .route(
            "/subtasks/:id",
            patch(handlers::update_subtask).delete(handlers::delete_subtask),
        )
        // Task pool
        .route("/taskpool/tasks", get(handlers::pool_tasks))
        .route(
            "/taskpool/tasks/:id/claim",
            post(handlers::claim_task).delete(handlers::release_task),
        )
        // Personal and team views
        .route("/my-tasks", get(handlers::my_tasks))
        .route("/my-inbox", get(handlers::my_inbox))
        .route("/org-feed", get(handlers::org_feed))
        .route("/board", get(handlers::board))
        .route("/board/move", post(handlers::move_card))
        .route("/calendar", get(handlers::calendar))
        .route("/activity", get(handlers::activity_feed))
        // Users and privacy
        .route("/users/team", get(handlers::team))
        .route("/users/:id/stats", get(handlers::user_stats))
        .route(
            "/privacy-settings",
            get(handlers::get_privacy_settings).put(handlers::update_privacy_settings),
        )
        // Reference data
        .route(
            "/clients",
            get(handlers::list_clients).post(handlers::create_client),
        )
        .route("/clients/:id", get(handlers::get_client))
        .route(
            "/action-types",
            get(handlers::list_action_types).post(handlers::create_action_type),
        )
        .route("/audit-logs", get(handlers::audit_logs))
}
