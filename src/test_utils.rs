#[cfg(test)]
pub mod test_helpers {
    use crate::db::models::{NewTask, Role, SourceType, Task, TaskStatus, Viewer};
    use crate::db::{create_pool, run_migrations};
    use crate::directory::Directory;
    use crate::priority::TaskPriority;
    use crate::tasks::TaskManager;
    use chrono::Utc;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    pub struct TestContext {
        pub pool: SqlitePool,
        pub _temp_dir: TempDir,
    }

    impl TestContext {
        pub async fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let url = format!("sqlite://{}", temp_dir.path().join("firmdesk.db").display());

            let pool = create_pool(&url, 5).await.unwrap();
            run_migrations(&pool).await.unwrap();

            Self {
                pool,
                _temp_dir: temp_dir,
            }
        }

        pub fn pool(&self) -> &SqlitePool {
            &self.pool
        }

        pub async fn org(&self, name: &str) -> i64 {
            Directory::new(&self.pool).create_org(name).await.unwrap().id
        }

        /// Create an active user with a unique email and return them as a caller
        pub async fn user(&self, org_id: i64, name: &str, role: Role) -> Viewer {
            let email = format!(
                "{}.{}@firm.test",
                name.to_lowercase().replace(' ', "."),
                org_id
            );
            let user = Directory::new(&self.pool)
                .create_user(org_id, name, &email, role)
                .await
                .unwrap();
            Viewer::from(&user)
        }

        /// A manual, unassigned task created by `by`
        pub async fn task(&self, by: &Viewer, title: &str) -> Task {
            TaskManager::new(&self.pool)
                .add_task(
                    by,
                    NewTask {
                        title: title.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
        }
    }

    /// An in-memory open task in org 1, for pure-function tests
    pub fn sample_task(id: i64) -> Task {
        let now = Utc::now();
        Task {
            id,
            org_id: 1,
            title: format!("Task {}", id),
            description: None,
            status: TaskStatus::Open,
            priority: TaskPriority::Medium,
            source_type: SourceType::Manual,
            source_email_id: None,
            source_metadata: None,
            action_type_id: None,
            client_id: None,
            assigned_to: None,
            claimed_by: None,
            assigned_by: None,
            assigned_at: None,
            claimed_at: None,
            due_date: None,
            completed_at: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}
