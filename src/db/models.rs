use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;

/// Task lifecycle status. `pending` is accepted on input as an alias of `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskStatus {
    #[serde(alias = "pending")]
    Open,
    InProgress,
    Review,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "open" | "pending" => Ok(TaskStatus::Open),
            "in_progress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(crate::error::FirmError::Validation(format!(
                "Invalid status '{}'. Valid values: open, in_progress, review, completed, cancelled",
                s
            ))),
        }
    }

    /// Completed and cancelled tasks no longer need work.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SourceType {
    Manual,
    PhoneCall,
    Email,
    DocumentIntake,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Manual => "manual",
            SourceType::PhoneCall => "phone_call",
            SourceType::Email => "email",
            SourceType::DocumentIntake => "document_intake",
        }
    }
}

/// Provenance of a task, one variant per `source_type`.
///
/// `extra` holds provider-specific fields that have no typed home.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum SourceMetadata {
    Manual {
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: Map<String, Value>,
    },
    PhoneCall {
        call_id: Option<String>,
        caller_name: Option<String>,
        caller_number: Option<String>,
        duration_seconds: Option<i64>,
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: Map<String, Value>,
    },
    Email {
        email_id: Option<String>,
        from: Option<String>,
        subject: Option<String>,
        received_at: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: Map<String, Value>,
    },
    DocumentIntake {
        document_id: Option<String>,
        document_name: Option<String>,
        page_count: Option<i64>,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: Map<String, Value>,
    },
}

impl SourceMetadata {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceMetadata::Manual { .. } => SourceType::Manual,
            SourceMetadata::PhoneCall { .. } => SourceType::PhoneCall,
            SourceMetadata::Email { .. } => SourceType::Email,
            SourceMetadata::DocumentIntake { .. } => SourceType::DocumentIntake,
        }
    }

    pub fn email_id(&self) -> Option<&str> {
        match self {
            SourceMetadata::Email { email_id, .. } => email_id.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub org_id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: crate::priority::TaskPriority,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_email_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<Json<SourceMetadata>>,
    pub action_type_id: Option<i64>,
    pub client_id: Option<i64>,
    pub assigned_to: Option<i64>,
    pub claimed_by: Option<i64>,
    pub assigned_by: Option<i64>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// In the org pool: nobody assigned, nobody claimed.
    pub fn is_unassigned(&self) -> bool {
        self.assigned_to.is_none() && self.claimed_by.is_none()
    }

    /// The user currently responsible for the task, if any.
    pub fn holder(&self) -> Option<i64> {
        self.assigned_to.or(self.claimed_by)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.due_date {
            Some(due) => due < today && !self.status.is_closed(),
            None => false,
        }
    }
}

/// A task as returned over the API, with derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub is_overdue: bool,
}

impl TaskView {
    pub fn new(task: Task, today: NaiveDate) -> Self {
        let is_overdue = task.is_overdue(today);
        Self { task, is_overdue }
    }

    pub fn today(tasks: Vec<Task>) -> Vec<Self> {
        let today = Utc::now().date_naive();
        tasks.into_iter().map(|t| Self::new(t, today)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subtask {
    pub id: i64,
    pub task_id: i64,
    pub title: String,
    pub position: i64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActivityAction {
    Created,
    Updated,
    StatusChanged,
    Completed,
    Reopened,
    Cancelled,
    Assigned,
    Claimed,
    Released,
    SubtaskAdded,
    SubtaskCompleted,
    SubtaskUncompleted,
    SubtaskDeleted,
    Comment,
}

/// Typed payload of an activity entry, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActivityDetails {
    Created {
        title: String,
    },
    Updated {
        field: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    StatusChanged {
        from: TaskStatus,
        to: TaskStatus,
    },
    Completed {
        from: TaskStatus,
    },
    Reopened {
        to: TaskStatus,
    },
    Cancelled {
        from: TaskStatus,
    },
    Assigned {
        from: Option<i64>,
        to: i64,
    },
    Claimed,
    Released {
        previous: Option<i64>,
    },
    SubtaskAdded {
        subtask_id: i64,
        title: String,
    },
    SubtaskCompleted {
        subtask_id: i64,
        title: String,
    },
    SubtaskUncompleted {
        subtask_id: i64,
        title: String,
    },
    SubtaskDeleted {
        subtask_id: i64,
        title: String,
    },
    Comment {
        body: String,
    },
}

impl ActivityDetails {
    pub fn action(&self) -> ActivityAction {
        match self {
            ActivityDetails::Created { .. } => ActivityAction::Created,
            ActivityDetails::Updated { .. } => ActivityAction::Updated,
            ActivityDetails::StatusChanged { .. } => ActivityAction::StatusChanged,
            ActivityDetails::Completed { .. } => ActivityAction::Completed,
            ActivityDetails::Reopened { .. } => ActivityAction::Reopened,
            ActivityDetails::Cancelled { .. } => ActivityAction::Cancelled,
            ActivityDetails::Assigned { .. } => ActivityAction::Assigned,
            ActivityDetails::Claimed => ActivityAction::Claimed,
            ActivityDetails::Released { .. } => ActivityAction::Released,
            ActivityDetails::SubtaskAdded { .. } => ActivityAction::SubtaskAdded,
            ActivityDetails::SubtaskCompleted { .. } => ActivityAction::SubtaskCompleted,
            ActivityDetails::SubtaskUncompleted { .. } => ActivityAction::SubtaskUncompleted,
            ActivityDetails::SubtaskDeleted { .. } => ActivityAction::SubtaskDeleted,
            ActivityDetails::Comment { .. } => ActivityAction::Comment,
        }
    }

    /// Before/after pair stored alongside the payload for plain-SQL reporting.
    pub fn change(&self) -> (Option<String>, Option<String>) {
        match self {
            ActivityDetails::Updated {
                old_value,
                new_value,
                ..
            } => (old_value.clone(), new_value.clone()),
            ActivityDetails::StatusChanged { from, to } => {
                (Some(from.as_str().to_string()), Some(to.as_str().to_string()))
            },
            ActivityDetails::Completed { from } | ActivityDetails::Cancelled { from } => (
                Some(from.as_str().to_string()),
                Some(self.action_target().to_string()),
            ),
            ActivityDetails::Reopened { to } => (
                Some(TaskStatus::Completed.as_str().to_string()),
                Some(to.as_str().to_string()),
            ),
            ActivityDetails::Assigned { from, to } => {
                (from.map(|id| id.to_string()), Some(to.to_string()))
            },
            ActivityDetails::Released { previous } => (previous.map(|id| id.to_string()), None),
            _ => (None, None),
        }
    }

    fn action_target(&self) -> &'static str {
        match self {
            ActivityDetails::Cancelled { .. } => TaskStatus::Cancelled.as_str(),
            _ => TaskStatus::Completed.as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityEntry {
    pub id: i64,
    pub task_id: i64,
    pub org_id: i64,
    pub user_id: i64,
    pub action: ActivityAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub details: Json<ActivityDetails>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Staff,
}

impl Role {
    /// Owners and admins bypass peer privacy and may manage any task.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }

    pub fn parse(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "staff" => Ok(Role::Staff),
            _ => Err(crate::error::FirmError::Validation(format!(
                "Invalid role '{}'. Valid values: owner, admin, staff",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    pub org_id: i64,
    pub role: Role,
}

impl Viewer {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<&User> for Viewer {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            org_id: user.org_id,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub entity_type: Option<String>,
    pub tax_id_last4: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionType {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrivacySettings {
    pub user_id: i64,
    pub hide_tasks_from_peers: bool,
    pub hide_activity_from_peers: bool,
    pub hide_performance_from_peers: bool,
    pub hide_calendar_from_peers: bool,
    pub visible_to_user_ids: Json<Vec<i64>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PrivacySettings {
    /// The settings a user has when no row exists: fully visible.
    pub fn visible_defaults(user_id: i64) -> Self {
        Self {
            user_id,
            hide_tasks_from_peers: false,
            hide_activity_from_peers: false,
            hide_performance_from_peers: false,
            hide_calendar_from_peers: false,
            visible_to_user_ids: Json(Vec::new()),
            updated_at: None,
        }
    }
}

/// Writable privacy fields; omitted fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrivacySettingsUpdate {
    pub hide_tasks_from_peers: Option<bool>,
    pub hide_activity_from_peers: Option<bool>,
    pub hide_performance_from_peers: Option<bool>,
    pub hide_calendar_from_peers: Option<bool>,
    pub visible_to_user_ids: Option<Vec<i64>>,
}

/// Per-user task counters. When the viewer may not see them every number is
/// `None` and `visible` is false; hidden is not the same as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: i64,
    pub visible: bool,
    pub total_tasks: Option<i64>,
    pub open_tasks: Option<i64>,
    pub in_progress_tasks: Option<i64>,
    pub completed_tasks: Option<i64>,
    pub overdue_tasks: Option<i64>,
}

impl UserStats {
    pub fn hidden(user_id: i64) -> Self {
        Self {
            user_id,
            visible: false,
            total_tasks: None,
            open_tasks: None,
            in_progress_tasks: None,
            completed_tasks: None,
            overdue_tasks: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct TaskCounts {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub overdue: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub org_id: i64,
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<i64>,
    pub details: Json<Value>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new manual task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<crate::priority::TaskPriority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<NaiveDate>,
    pub client_id: Option<i64>,
    pub action_type_id: Option<i64>,
    pub assigned_to: Option<i64>,
}

/// An inbound call, email or document turned into a task.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionItem {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<crate::priority::TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub client_id: Option<i64>,
    pub action_type_id: Option<i64>,
    pub assigned_to: Option<i64>,
    pub source: SourceMetadata,
}

/// A partial update. Nullable columns use `Option<Option<_>>`: absent leaves
/// the column alone, `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub priority: Option<crate::priority::TaskPriority>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub client_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub action_type_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<i64>>,
}

fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Fields for a new client record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub entity_type: Option<String>,
    pub tax_id_last4: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewActionType {
    pub name: String,
    pub color: String,
}

/// Filters for team task listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<crate::priority::TaskPriority>,
    pub assigned_to: Option<i64>,
    pub client_id: Option<i64>,
    pub source_type: Option<SourceType>,
    #[serde(default)]
    pub overdue_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
