//! Caller identity.
//!
//! The authenticating front proxy forwards the signed-in user's id in
//! `X-User-Id`. The user must exist and be active; everything a handler does
//! is then scoped to that user's organization.

use super::server::AppState;
use crate::audit::AuditEvent;
use crate::db::models::Viewer;
use crate::directory::Directory;
use crate::error::FirmError;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Clone)]
pub struct Caller {
    pub viewer: Viewer,
    pub session_id: Option<String>,
}

impl Caller {
    /// Start an audit record attributed to this caller
    pub fn audit(&self, action: &str, resource_type: &str) -> AuditEvent {
        AuditEvent::new(self.viewer.org_id, action, resource_type)
            .by(self.viewer.user_id, self.session_id.clone())
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = FirmError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = header(parts, USER_ID_HEADER)
            .ok_or_else(|| FirmError::Unauthorized("Missing X-User-Id header".to_string()))?;
        let user_id: i64 = raw
            .parse()
            .map_err(|_| FirmError::Unauthorized("Malformed X-User-Id header".to_string()))?;

        let user = Directory::new(&state.db_pool)
            .get_active_user(user_id)
            .await?
            .ok_or_else(|| {
                FirmError::Unauthorized(format!("Unknown or inactive user {}", user_id))
            })?;

        Ok(Self {
            viewer: Viewer::from(&user),
            session_id: header(parts, SESSION_ID_HEADER).map(str::to_string),
        })
    }
}
