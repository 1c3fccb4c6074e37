//! Kanban board and the task status machine.
//!
//! Work statuses (open, in_progress, review, completed) move freely between
//! each other. `cancelled` is only reachable by explicit action from a
//! non-completed status, and nothing leaves it.

use crate::db::models::{Task, TaskStatus, TaskView, Viewer};
use crate::error::{FirmError, Result};
use crate::privacy::PrivacyFilter;
use crate::tasks::TaskManager;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Validate a status change. Same-status changes are accepted as no-ops.
pub fn check_transition(from: TaskStatus, to: TaskStatus) -> Result<()> {
    if from == to {
        return Ok(());
    }
    match (from, to) {
        (TaskStatus::Cancelled, _) => Err(FirmError::Validation(format!(
            "Task is cancelled and cannot move to {}",
            to.as_str()
        ))),
        (TaskStatus::Completed, TaskStatus::Cancelled) => Err(FirmError::Validation(
            "Completed tasks cannot be cancelled".to_string(),
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KanbanColumn {
    Open,
    InProgress,
    Completed,
}

impl KanbanColumn {
    pub const ALL: [KanbanColumn; 3] = [
        KanbanColumn::Open,
        KanbanColumn::InProgress,
        KanbanColumn::Completed,
    ];

    /// Column a task is shown in. Review work sits in the in-progress column;
    /// cancelled tasks are not on the board.
    pub fn for_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Open => Some(KanbanColumn::Open),
            TaskStatus::InProgress | TaskStatus::Review => Some(KanbanColumn::InProgress),
            TaskStatus::Completed => Some(KanbanColumn::Completed),
            TaskStatus::Cancelled => None,
        }
    }

    /// Status a card takes when dropped into this column
    pub fn target_status(&self) -> TaskStatus {
        match self {
            KanbanColumn::Open => TaskStatus::Open,
            KanbanColumn::InProgress => TaskStatus::InProgress,
            KanbanColumn::Completed => TaskStatus::Completed,
        }
    }
}

/// Which tasks a board shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardScope {
    /// Tasks assigned to or claimed by the viewer
    #[default]
    Mine,
    /// Every task in the organization the viewer may see
    All,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    pub column: KanbanColumn,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub columns: Vec<BoardColumn>,
}

impl Board {
    /// Group tasks into columns, keeping their input order inside each column
    pub fn from_tasks(tasks: Vec<Task>, today: NaiveDate) -> Self {
        let mut columns: Vec<BoardColumn> = KanbanColumn::ALL
            .iter()
            .map(|c| BoardColumn {
                column: *c,
                tasks: Vec::new(),
            })
            .collect();

        for task in tasks {
            if let Some(col) = KanbanColumn::for_status(task.status) {
                if let Some(slot) = columns.iter_mut().find(|c| c.column == col) {
                    slot.tasks.push(TaskView::new(task, today));
                }
            }
        }

        Self { columns }
    }

    pub fn column(&self, column: KanbanColumn) -> &[TaskView] {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.tasks.as_slice())
            .unwrap_or(&[])
    }
}

pub struct BoardManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BoardManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn board(&self, viewer: &Viewer, scope: BoardScope) -> Result<Board> {
        let task_mgr = TaskManager::new(self.pool);
        let tasks = match scope {
            BoardScope::Mine => {
                task_mgr
                    .list_by_assignee(viewer.org_id, viewer.user_id)
                    .await?
            },
            BoardScope::All => task_mgr.find_tasks(viewer.org_id, &Default::default()).await?,
        };
        let tasks = PrivacyFilter::new(self.pool)
            .filter_tasks_by_privacy(tasks, viewer)
            .await?;

        Ok(Board::from_tasks(tasks, chrono::Utc::now().date_naive()))
    }

    /// Drag-and-drop a card into a column.
    ///
    /// Dropping a card into the column it already sits in leaves its status
    /// untouched, so a review card dropped on in-progress stays in review.
    pub async fn move_card(&self, viewer: &Viewer, task_id: i64, column: KanbanColumn) -> Result<Task> {
        let task_mgr = TaskManager::new(self.pool);
        let task = task_mgr.get_task(viewer.org_id, task_id).await?;

        match KanbanColumn::for_status(task.status) {
            None => Err(FirmError::Validation(
                "Cancelled tasks are not on the board".to_string(),
            )),
            Some(current) if current == column => Ok(task),
            Some(_) => {
                task_mgr
                    .update_status(viewer, task_id, column.target_status())
                    .await
            },
        }
    }
}
