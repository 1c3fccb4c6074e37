//! Organizations, users, clients and action types.

use crate::db::models::{
    ActionType, Client, NewActionType, NewClient, Organization, Role, User,
};
use crate::error::{FirmError, Result};
use crate::sql_constants::SELECT_USER;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

const SELECT_CLIENT: &str =
    "SELECT id, org_id, name, email, phone, entity_type, tax_id_last4, created_at FROM clients";
const SELECT_ACTION_TYPE: &str = "SELECT id, org_id, name, color, created_at FROM action_types";

/// The user must exist, belong to `org_id` and be active.
pub async fn ensure_active_user(conn: &mut SqliteConnection, org_id: i64, user_id: i64) -> Result<User> {
    let user = sqlx::query_as::<_, User>(&format!("{} WHERE id = ? AND org_id = ?", SELECT_USER))
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(FirmError::user_not_found(user_id))?;

    if !user.is_active {
        return Err(FirmError::Validation(format!(
            "User {} is inactive and cannot hold tasks",
            user_id
        )));
    }
    Ok(user)
}

pub async fn ensure_client(conn: &mut SqliteConnection, org_id: i64, client_id: i64) -> Result<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM clients WHERE id = ? AND org_id = ?)")
            .bind(client_id)
            .bind(org_id)
            .fetch_one(&mut *conn)
            .await?;
    if !exists {
        return Err(FirmError::NotFound {
            resource: "Client",
            id: client_id,
        });
    }
    Ok(())
}

pub async fn ensure_action_type(conn: &mut SqliteConnection, org_id: i64, action_type_id: i64) -> Result<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM action_types WHERE id = ? AND org_id = ?)")
            .bind(action_type_id)
            .bind(org_id)
            .fetch_one(&mut *conn)
            .await?;
    if !exists {
        return Err(FirmError::NotFound {
            resource: "Action type",
            id: action_type_id,
        });
    }
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FirmError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(value.to_string())
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

pub struct Directory<'a> {
    pool: &'a SqlitePool,
}

impl<'a> Directory<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_org(&self, name: &str) -> Result<Organization> {
        let name = required("Organization name", name)?;
        let now = Utc::now();

        let result = sqlx::query("INSERT INTO organizations (name, created_at) VALUES (?, ?)")
            .bind(&name)
            .bind(now)
            .execute(self.pool)
            .await?;

        let org = Organization {
            id: result.last_insert_rowid(),
            name,
            created_at: now,
        };
        tracing::info!(org_id = org.id, "Organization created");
        Ok(org)
    }

    pub async fn get_org(&self, id: i64) -> Result<Organization> {
        sqlx::query_as::<_, Organization>(
            "SELECT id, name, created_at FROM organizations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(FirmError::NotFound {
            resource: "Organization",
            id,
        })
    }

    pub async fn create_user(&self, org_id: i64, name: &str, email: &str, role: Role) -> Result<User> {
        let name = required("User name", name)?;
        let email = required("Email", email)?.to_lowercase();
        if !email.contains('@') {
            return Err(FirmError::Validation(format!("Invalid email '{}'", email)));
        }
        self.get_org(org_id).await?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (org_id, name, email, role, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(org_id)
        .bind(&name)
        .bind(&email)
        .bind(role)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                FirmError::Conflict(format!("A user with email '{}' already exists", email))
            } else {
                e.into()
            }
        })?;

        tracing::info!(org_id, user_id = result.last_insert_rowid(), role = ?role, "User created");
        Ok(User {
            id: result.last_insert_rowid(),
            org_id,
            name,
            email,
            role,
            is_active: true,
            created_at: now,
        })
    }

    /// A user of `org_id`, active or not
    pub async fn get_user(&self, org_id: i64, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>(&format!("{} WHERE id = ? AND org_id = ?", SELECT_USER))
            .bind(id)
            .bind(org_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(FirmError::user_not_found(id))
    }

    /// Lookup used to authenticate a caller: any org, active users only
    pub async fn get_active_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "{} WHERE id = ? AND is_active = 1",
            SELECT_USER
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    pub async fn set_user_active(&self, org_id: i64, id: i64, active: bool) -> Result<User> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ? AND org_id = ?")
            .bind(active)
            .bind(id)
            .bind(org_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(FirmError::user_not_found(id));
        }
        self.get_user(org_id, id).await
    }

    /// Active members of an organization, by name
    pub async fn team(&self, org_id: i64) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "{} WHERE org_id = ? AND is_active = 1 ORDER BY name ASC, id ASC",
            SELECT_USER
        ))
        .bind(org_id)
        .fetch_all(self.pool)
        .await?;
        Ok(users)
    }

    pub async fn create_client(&self, org_id: i64, new: NewClient) -> Result<Client> {
        let name = required("Client name", &new.name)?;
        if let Some(last4) = &new.tax_id_last4 {
            if last4.len() != 4 || !last4.chars().all(|c| c.is_ascii_digit()) {
                return Err(FirmError::Validation(
                    "tax_id_last4 must be exactly four digits".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO clients (org_id, name, email, phone, entity_type, tax_id_last4, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(org_id)
        .bind(&name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.entity_type)
        .bind(&new.tax_id_last4)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(Client {
            id: result.last_insert_rowid(),
            org_id,
            name,
            email: new.email,
            phone: new.phone,
            entity_type: new.entity_type,
            tax_id_last4: new.tax_id_last4,
            created_at: now,
        })
    }

    pub async fn get_client(&self, org_id: i64, id: i64) -> Result<Client> {
        sqlx::query_as::<_, Client>(&format!("{} WHERE id = ? AND org_id = ?", SELECT_CLIENT))
            .bind(id)
            .bind(org_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(FirmError::NotFound {
                resource: "Client",
                id,
            })
    }

    pub async fn list_clients(&self, org_id: i64) -> Result<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>(&format!(
            "{} WHERE org_id = ? ORDER BY name ASC, id ASC",
            SELECT_CLIENT
        ))
        .bind(org_id)
        .fetch_all(self.pool)
        .await?;
        Ok(clients)
    }

    pub async fn create_action_type(&self, org_id: i64, new: NewActionType) -> Result<ActionType> {
        let name = required("Action type name", &new.name)?;
        let color = new.color.trim().to_lowercase();
        if !is_hex_color(&color) {
            return Err(FirmError::Validation(format!(
                "Invalid color '{}'. Expected #rrggbb",
                new.color
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO action_types (org_id, name, color, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(org_id)
        .bind(&name)
        .bind(&color)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                FirmError::Conflict(format!("Action type '{}' already exists", name))
            } else {
                e.into()
            }
        })?;

        Ok(ActionType {
            id: result.last_insert_rowid(),
            org_id,
            name,
            color,
            created_at: now,
        })
    }

    pub async fn list_action_types(&self, org_id: i64) -> Result<Vec<ActionType>> {
        let types = sqlx::query_as::<_, ActionType>(&format!(
            "{} WHERE org_id = ? ORDER BY name ASC",
            SELECT_ACTION_TYPE
        ))
        .bind(org_id)
        .fetch_all(self.pool)
        .await?;
        Ok(types)
    }
}
