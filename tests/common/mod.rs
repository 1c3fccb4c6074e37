//! Shared setup for integration tests: a migrated database in a temp dir,
//! an in-process router over it, and a pre-configured `firmdesk` command.

#![allow(dead_code)]

use assert_cmd::Command;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use firmdesk::api::{create_router, AppState};
use firmdesk::db::models::{Role, User};
use firmdesk::db::{create_pool, run_migrations};
use firmdesk::directory::Directory;
use serde_json::Value;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;

/// Path to the `firmdesk` binary, honouring custom target directories
#[allow(deprecated)]
pub fn firmdesk_binary() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_firmdesk")
        .map(PathBuf::from)
        .unwrap_or_else(|_| assert_cmd::cargo::cargo_bin("firmdesk"))
}

pub fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("firmdesk.db").display())
}

/// A `firmdesk` command with the ambient configuration stripped, so only
/// what the test sets is seen by the binary.
pub fn firmdesk_command() -> Command {
    let mut cmd = Command::new(firmdesk_binary());
    cmd.env_remove("DATABASE_URL")
        .env_remove("FIRMDESK_BIND")
        .env_remove("FIRMDESK_MAX_CONNECTIONS")
        .env_remove("FIRMDESK_LOG_LEVEL")
        .env_remove("FIRMDESK_LOG_JSON")
        .env_remove("FIRMDESK_LOG_DIR")
        .env_remove("RUST_LOG");
    cmd
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    _temp_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_pool(&database_url(temp_dir.path()), 5).await.unwrap();
        run_migrations(&pool).await.unwrap();

        Self {
            router: create_router(AppState {
                db_pool: pool.clone(),
            }),
            pool,
            _temp_dir: temp_dir,
        }
    }

    pub async fn org(&self, name: &str) -> i64 {
        Directory::new(&self.pool).create_org(name).await.unwrap().id
    }

    pub async fn user(&self, org_id: i64, name: &str, role: Role) -> User {
        let email = format!("{}.{}@firm.test", name.to_lowercase(), org_id);
        Directory::new(&self.pool)
            .create_user(org_id, name, &email, role)
            .await
            .unwrap()
    }

    /// Send a request as `user_id` (or anonymously) and decode the JSON body
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        user_id: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user_id {
            builder = builder.header("x-user-id", id.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, user_id: i64) -> (StatusCode, Value) {
        self.call("GET", uri, Some(user_id), None).await
    }

    pub async fn post(&self, uri: &str, user_id: i64, body: Value) -> (StatusCode, Value) {
        self.call("POST", uri, Some(user_id), Some(body)).await
    }
}
