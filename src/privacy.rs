//! Peer privacy: row-level visibility of tasks, activity, calendar entries
//! and performance numbers.
//!
//! Rules, applied per row owner:
//!
//! 1. Administrators (owner/admin roles) see everything.
//! 2. Rows with no owner, or owned by the viewer, are visible.
//! 3. An owner with no settings row is fully visible.
//! 4. Otherwise the row is hidden when the owner has switched the relevant
//!    `hide_*_from_peers` flag on, unless the viewer is on the owner's
//!    `visible_to_user_ids` allow-list.
//!
//! The decision functions are pure; [`PrivacyFilter`] only adds a single
//! batched settings lookup per call.

use crate::db::models::{
    ActivityEntry, PrivacySettings, PrivacySettingsUpdate, Task, UserStats, Viewer,
};
use crate::error::{FirmError, Result};
use crate::sql_constants::{COUNT_TASKS_FOR_USER, SELECT_PRIVACY};
use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};

/// Which kind of data a visibility decision is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Tasks,
    Activity,
    Performance,
    Calendar,
}

impl PrivacySettings {
    pub fn hides(&self, facet: Facet) -> bool {
        match facet {
            Facet::Tasks => self.hide_tasks_from_peers,
            Facet::Activity => self.hide_activity_from_peers,
            Facet::Performance => self.hide_performance_from_peers,
            Facet::Calendar => self.hide_calendar_from_peers,
        }
    }

    pub fn allows(&self, user_id: i64) -> bool {
        self.visible_to_user_ids.0.contains(&user_id)
    }
}

/// Can `viewer` see data of `facet` owned by `owner`?
pub fn can_view(
    viewer: &Viewer,
    owner: Option<i64>,
    settings: &HashMap<i64, PrivacySettings>,
    facet: Facet,
) -> bool {
    if viewer.is_admin() {
        return true;
    }
    let Some(owner) = owner else {
        return true;
    };
    if owner == viewer.user_id {
        return true;
    }
    match settings.get(&owner) {
        None => true,
        Some(s) => !s.hides(facet) || s.allows(viewer.user_id),
    }
}

/// Keep the rows `viewer` may see. Order is preserved; rows are not modified.
pub fn filter_rows<T, F>(
    rows: Vec<T>,
    viewer: &Viewer,
    settings: &HashMap<i64, PrivacySettings>,
    facet: Facet,
    owner_of: F,
) -> Vec<T>
where
    F: Fn(&T) -> Option<i64>,
{
    if viewer.is_admin() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| can_view(viewer, owner_of(row), settings, facet))
        .collect()
}

/// Distinct owners other than the viewer: the only users whose settings matter.
fn owners_to_check<T, F>(rows: &[T], viewer: &Viewer, owner_of: F) -> Vec<i64>
where
    F: Fn(&T) -> Option<i64>,
{
    rows.iter()
        .filter_map(&owner_of)
        .filter(|id| *id != viewer.user_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct PrivacyFilter<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PrivacyFilter<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch settings rows for all given users in one query.
    pub async fn load_settings(&self, user_ids: &[i64]) -> Result<HashMap<i64, PrivacySettings>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new(format!("{} WHERE user_id IN (", SELECT_PRIVACY));
        let mut separated = builder.separated(", ");
        for id in user_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder
            .build_query_as::<PrivacySettings>()
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(|s| (s.user_id, s)).collect())
    }

    async fn filter<T, F>(&self, rows: Vec<T>, viewer: &Viewer, facet: Facet, owner_of: F) -> Result<Vec<T>>
    where
        F: Fn(&T) -> Option<i64> + Copy,
    {
        if viewer.is_admin() || rows.is_empty() {
            return Ok(rows);
        }
        let owners = owners_to_check(&rows, viewer, owner_of);
        let settings = self.load_settings(&owners).await?;
        Ok(filter_rows(rows, viewer, &settings, facet, owner_of))
    }

    /// Drop tasks whose assignee hides tasks from `viewer`
    pub async fn filter_tasks_by_privacy(&self, tasks: Vec<Task>, viewer: &Viewer) -> Result<Vec<Task>> {
        self.filter(tasks, viewer, Facet::Tasks, |t: &Task| t.assigned_to)
            .await
    }

    /// Drop activity rows whose actor hides activity from `viewer`
    pub async fn filter_activity_by_privacy(
        &self,
        entries: Vec<ActivityEntry>,
        viewer: &Viewer,
    ) -> Result<Vec<ActivityEntry>> {
        self.filter(entries, viewer, Facet::Activity, |e: &ActivityEntry| {
            Some(e.user_id)
        })
        .await
    }

    /// Drop activity rows about tasks whose assignee hides tasks from `viewer`
    pub async fn filter_activity_by_task_privacy(
        &self,
        entries: Vec<ActivityEntry>,
        viewer: &Viewer,
    ) -> Result<Vec<ActivityEntry>> {
        if viewer.is_admin() || entries.is_empty() {
            return Ok(entries);
        }

        let task_ids: BTreeSet<i64> = entries.iter().map(|e| e.task_id).collect();
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT id, assigned_to FROM tasks WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in &task_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(i64, Option<i64>)> = builder.build_query_as().fetch_all(self.pool).await?;
        let assignees: HashMap<i64, Option<i64>> = rows.into_iter().collect();
        let assignees = &assignees;

        self.filter(entries, viewer, Facet::Tasks, move |e: &ActivityEntry| {
            assignees.get(&e.task_id).copied().flatten()
        })
        .await
    }

    /// Drop dated tasks whose assignee hides their calendar from `viewer`
    pub async fn filter_calendar_by_privacy(
        &self,
        tasks: Vec<Task>,
        viewer: &Viewer,
    ) -> Result<Vec<Task>> {
        self.filter(tasks, viewer, Facet::Calendar, |t: &Task| t.assigned_to)
            .await
    }

    /// Single-task check used by detail endpoints
    pub async fn can_view_task(&self, task: &Task, viewer: &Viewer) -> Result<bool> {
        let owners = owners_to_check(std::slice::from_ref(task), viewer, |t: &Task| {
            t.assigned_to
        });
        let settings = self.load_settings(&owners).await?;
        Ok(can_view(viewer, task.assigned_to, &settings, Facet::Tasks))
    }

    /// Task counters for `target_user_id`, or an explicit hidden result.
    pub async fn get_user_stats_with_privacy(
        &self,
        viewer: &Viewer,
        target_user_id: i64,
    ) -> Result<UserStats> {
        let settings = self.load_settings(&[target_user_id]).await?;
        if !can_view(viewer, Some(target_user_id), &settings, Facet::Performance) {
            return Ok(UserStats::hidden(target_user_id));
        }

        let counts = sqlx::query_as::<_, crate::db::models::TaskCounts>(COUNT_TASKS_FOR_USER)
            .bind(Utc::now().date_naive())
            .bind(viewer.org_id)
            .bind(target_user_id)
            .bind(target_user_id)
            .fetch_one(self.pool)
            .await?;

        Ok(UserStats {
            user_id: target_user_id,
            visible: true,
            total_tasks: Some(counts.total),
            open_tasks: Some(counts.open),
            in_progress_tasks: Some(counts.in_progress),
            completed_tasks: Some(counts.completed),
            overdue_tasks: Some(counts.overdue),
        })
    }

    /// A user's settings, or the fully-visible defaults when none are stored
    pub async fn get_settings(&self, user_id: i64) -> Result<PrivacySettings> {
        let row = sqlx::query_as::<_, PrivacySettings>(&format!(
            "{} WHERE user_id = ?",
            SELECT_PRIVACY
        ))
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.unwrap_or_else(|| PrivacySettings::visible_defaults(user_id)))
    }

    /// Create or update the viewer's own settings
    pub async fn upsert_settings(
        &self,
        viewer: &Viewer,
        update: PrivacySettingsUpdate,
    ) -> Result<PrivacySettings> {
        let mut settings = self.get_settings(viewer.user_id).await?;

        if let Some(ids) = update.visible_to_user_ids {
            let ids: Vec<i64> = ids
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if ids.contains(&viewer.user_id) {
                return Err(FirmError::Validation(
                    "visible_to_user_ids must not contain yourself".to_string(),
                ));
            }
            self.check_same_org(viewer.org_id, &ids).await?;
            settings.visible_to_user_ids = Json(ids);
        }
        if let Some(v) = update.hide_tasks_from_peers {
            settings.hide_tasks_from_peers = v;
        }
        if let Some(v) = update.hide_activity_from_peers {
            settings.hide_activity_from_peers = v;
        }
        if let Some(v) = update.hide_performance_from_peers {
            settings.hide_performance_from_peers = v;
        }
        if let Some(v) = update.hide_calendar_from_peers {
            settings.hide_calendar_from_peers = v;
        }
        let now = Utc::now();
        settings.updated_at = Some(now);

        sqlx::query(
            r#"
            INSERT INTO user_privacy_settings (
                user_id, hide_tasks_from_peers, hide_activity_from_peers,
                hide_performance_from_peers, hide_calendar_from_peers,
                visible_to_user_ids, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                hide_tasks_from_peers = excluded.hide_tasks_from_peers,
                hide_activity_from_peers = excluded.hide_activity_from_peers,
                hide_performance_from_peers = excluded.hide_performance_from_peers,
                hide_calendar_from_peers = excluded.hide_calendar_from_peers,
                visible_to_user_ids = excluded.visible_to_user_ids,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(viewer.user_id)
        .bind(settings.hide_tasks_from_peers)
        .bind(settings.hide_activity_from_peers)
        .bind(settings.hide_performance_from_peers)
        .bind(settings.hide_calendar_from_peers)
        .bind(&settings.visible_to_user_ids)
        .bind(now)
        .execute(self.pool)
        .await?;

        tracing::info!(user_id = viewer.user_id, "Privacy settings updated");
        Ok(settings)
    }

    async fn check_same_org(&self, org_id: i64, user_ids: &[i64]) -> Result<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT id FROM users WHERE org_id = ");
        builder.push_bind(org_id).push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for id in user_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let found = builder
            .build_query_scalar::<i64>()
            .fetch_all(self.pool)
            .await?;
        if let Some(missing) = user_ids.iter().find(|id| !found.contains(id)) {
            return Err(FirmError::Validation(format!(
                "User {} is not a member of this organization",
                missing
            )));
        }
        Ok(())
    }
}
