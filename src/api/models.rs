use crate::board::{BoardScope, KanbanColumn};
use crate::db::models::TaskStatus;
use crate::error::FirmError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn status_for(error: &FirmError) -> StatusCode {
    match error {
        FirmError::NotFound { .. } => StatusCode::NOT_FOUND,
        FirmError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        FirmError::Forbidden(_) => StatusCode::FORBIDDEN,
        FirmError::Conflict(_) => StatusCode::CONFLICT,
        FirmError::Validation(_) => StatusCode::BAD_REQUEST,
        FirmError::DatabaseError(_)
        | FirmError::IoError(_)
        | FirmError::JsonError(_)
        | FirmError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for FirmError {
    fn into_response(self) -> Response {
        let status = status_for(&self);

        let body = if self.is_internal() {
            crate::log_error!(self, "request failed");
            ApiError {
                code: "INTERNAL_ERROR".to_string(),
                message: "Internal server error".to_string(),
                details: None,
            }
        } else {
            let details = match &self {
                FirmError::NotFound { resource, id } => Some(json!({
                    "resource": resource,
                    "id": id,
                })),
                _ => None,
            };
            ApiError {
                code: self.to_error_code().to_string(),
                message: self.to_string(),
                details,
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: TaskStatus,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct CreateSubtaskRequest {
    pub title: String,
}

#[derive(Deserialize)]
pub struct UpdateSubtaskRequest {
    pub is_completed: bool,
}

#[derive(Deserialize)]
pub struct ReorderSubtasksRequest {
    pub subtask_ids: Vec<i64>,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Deserialize)]
pub struct MoveCardRequest {
    pub task_id: i64,
    pub column: KanbanColumn,
}

#[derive(Deserialize, Default)]
pub struct BoardQuery {
    #[serde(default)]
    pub scope: BoardScope,
}

/// Inclusive date range for the calendar feed
#[derive(Deserialize)]
pub struct CalendarQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Deserialize, Default)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct FeedQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct AuditQuery {
    pub limit: Option<i64>,
    pub session_id: Option<String>,
}
