//! libSQL backend — async `IdentityStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::models::{
    ChannelAccount, ChannelIdentity, Organization, Person, ReminderTarget, Subscription, User,
};
use crate::store::migrations;
use crate::store::traits::IdentityStore;

/// Organization columns in funnel order.
const ORG_LEVELS: [&str; 4] = ["name", "city", "office", "department"];

const USER_COLUMNS: &str = "id, first_name, last_name, patronymic, birth_date, email";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run an `INSERT ... RETURNING id` and return the new id.
    async fn insert_returning_id(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| map_write_error(op, e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| map_write_error(op, e))?
            .ok_or_else(|| DatabaseError::Query(format!("{op}: no id returned")))?;
        row.get(0)
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))
    }

    async fn query_users(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut users = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            users.push(row_to_user(&row, 0).map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?);
        }
        Ok(users)
    }

    async fn query_one_user(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
        id: String,
    ) -> Result<User, DatabaseError> {
        self.query_users(op, sql, params)
            .await?
            .into_iter()
            .next()
            .ok_or(DatabaseError::NotFound {
                entity: "user".into(),
                id,
            })
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Uniqueness violations become `Constraint`, everything else `Query`.
fn map_write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> NaiveDate {
    crate::models::parse_birth_date(s).unwrap_or(NaiveDate::MIN)
}

/// Map a row to a User, reading six columns starting at `offset`.
///
/// Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row, offset: i32) -> Result<User, libsql::Error> {
    let birth_date: String = row.get(offset + 4)?;
    Ok(User {
        id: row.get(offset)?,
        first_name: row.get(offset + 1)?,
        last_name: row.get(offset + 2)?,
        patronymic: row.get(offset + 3)?,
        birth_date: parse_date(&birth_date),
        email: row.get(offset + 5)?,
    })
}

fn row_to_organization(row: &libsql::Row) -> Result<Organization, libsql::Error> {
    Ok(Organization {
        id: row.get(0)?,
        name: row.get(1)?,
        city: row.get(2)?,
        office: row.get(3)?,
        department: row.get(4)?,
    })
}

/// Build the WHERE clause for a funnel prefix: `name = ?1 AND city = ?2 ...`.
fn org_path_clause(depth: usize) -> String {
    ORG_LEVELS[..depth]
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

// ── IdentityStore implementation ────────────────────────────────────

#[async_trait]
impl IdentityStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn save_user(&self, person: &Person) -> Result<i64, DatabaseError> {
        let id = self
            .insert_returning_id(
                "save_user",
                "INSERT INTO users (first_name, last_name, patronymic, birth_date, email)
                 VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
                params![
                    person.first_name.as_str(),
                    person.last_name.as_str(),
                    person.patronymic.as_str(),
                    format_date(person.birth_date),
                    person.email.as_str(),
                ],
            )
            .await?;
        debug!(user_id = id, email = %person.email, "User saved");
        Ok(id)
    }

    async fn user(&self, id: i64) -> Result<User, DatabaseError> {
        self.query_one_user(
            "user",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            id.to_string(),
        )
        .await
    }

    async fn user_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        self.query_one_user(
            "user_by_email",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            email.to_string(),
        )
        .await
    }

    // ── Organizations ───────────────────────────────────────────────

    async fn save_organization(&self, org: &Organization) -> Result<i64, DatabaseError> {
        let existing = self
            .find_organizations(&[
                org.name.as_str(),
                org.city.as_str(),
                org.office.as_str(),
                org.department.as_str(),
            ])
            .await?;
        if let Some(found) = existing.first() {
            return Ok(found.id);
        }

        let id = self
            .insert_returning_id(
                "save_organization",
                "INSERT INTO organizations (name, city, office, department)
                 VALUES (?1, ?2, ?3, ?4) RETURNING id",
                params![
                    org.name.as_str(),
                    org.city.as_str(),
                    org.office.as_str(),
                    org.department.as_str(),
                ],
            )
            .await?;
        debug!(org_id = id, name = %org.name, "Organization saved");
        Ok(id)
    }

    async fn link_user_organization(
        &self,
        user_id: i64,
        org_id: i64,
    ) -> Result<i64, DatabaseError> {
        self.insert_returning_id(
            "link_user_organization",
            "INSERT INTO user_organizations (user_id, organization_id) VALUES (?1, ?2) RETURNING id",
            params![user_id, org_id],
        )
        .await
    }

    async fn find_organizations(&self, path: &[&str]) -> Result<Vec<Organization>, DatabaseError> {
        if path.len() > ORG_LEVELS.len() {
            return Err(DatabaseError::Query(format!(
                "find_organizations: path too deep ({} levels)",
                path.len()
            )));
        }

        let mut sql = String::from("SELECT id, name, city, office, department FROM organizations");
        if !path.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&org_path_clause(path.len()));
        }
        sql.push_str(" ORDER BY name, city, office, department");

        let values: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let mut rows = self
            .conn()
            .query(&sql, libsql::params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("find_organizations: {e}")))?;

        let mut orgs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_organizations: {e}")))?
        {
            orgs.push(
                row_to_organization(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            );
        }
        Ok(orgs)
    }

    async fn members_of_organization(
        &self,
        org: &Organization,
    ) -> Result<Vec<User>, DatabaseError> {
        self.query_users(
            "members_of_organization",
            "SELECT u.id, u.first_name, u.last_name, u.patronymic, u.birth_date, u.email
             FROM users u
             JOIN user_organizations uo ON uo.user_id = u.id
             JOIN organizations o ON o.id = uo.organization_id
             WHERE o.name = ?1 AND o.city = ?2 AND o.office = ?3 AND o.department = ?4
             ORDER BY u.last_name, u.first_name, u.id",
            params![
                org.name.as_str(),
                org.city.as_str(),
                org.office.as_str(),
                org.department.as_str(),
            ],
        )
        .await
    }

    // ── Channel identities ──────────────────────────────────────────

    async fn save_channel_account(
        &self,
        user_id: i64,
        identity: &ChannelIdentity,
        token: &str,
    ) -> Result<i64, DatabaseError> {
        self.insert_returning_id(
            "save_channel_account",
            "INSERT INTO user_messengers (user_id, messenger_type, messenger_id, chat_id, is_activated, token)
             VALUES (?1, ?2, ?3, ?4, 0, ?5) RETURNING id",
            params![
                user_id,
                identity.channel.as_str(),
                identity.user_id,
                identity.chat_id,
                token,
            ],
        )
        .await
    }

    async fn channel_account(
        &self,
        identity: &ChannelIdentity,
    ) -> Result<ChannelAccount, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, is_activated, token FROM user_messengers
                 WHERE messenger_type = ?1 AND messenger_id = ?2 AND chat_id = ?3
                 ORDER BY id DESC LIMIT 1",
                params![identity.channel.as_str(), identity.user_id, identity.chat_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("channel_account: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let user_id: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                let activated: i64 = row.get(1).unwrap_or(0);
                let token: String = row.get(2).unwrap_or_default();
                Ok(ChannelAccount {
                    user_id,
                    identity: identity.clone(),
                    is_activated: activated != 0,
                    token,
                })
            }
            Ok(None) => Err(DatabaseError::NotFound {
                entity: "channel identity".into(),
                id: format!("{}:{}:{}", identity.channel, identity.user_id, identity.chat_id),
            }),
            Err(e) => Err(DatabaseError::Query(format!("channel_account: {e}"))),
        }
    }

    async fn activate(
        &self,
        identity: &ChannelIdentity,
        token: &str,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE user_messengers SET is_activated = 1, token = ''
                 WHERE messenger_type = ?1 AND messenger_id = ?2 AND chat_id = ?3
                   AND token = ?4 AND token <> '' AND is_activated = 0",
                params![
                    identity.channel.as_str(),
                    identity.user_id,
                    identity.chat_id,
                    token,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("activate: {e}")))?;
        Ok(count > 0)
    }

    // ── Subscriptions ───────────────────────────────────────────────

    async fn subscribe(&self, subscriber_id: i64, target_id: i64) -> Result<i64, DatabaseError> {
        let id = self
            .insert_returning_id(
                "subscribe",
                "INSERT INTO subscriptions (subscriber_id, target_id) VALUES (?1, ?2) RETURNING id",
                params![subscriber_id, target_id],
            )
            .await?;
        debug!(subscriber_id, target_id, "Subscription saved");
        Ok(id)
    }

    async fn subscriptions_of(
        &self,
        subscriber_id: i64,
    ) -> Result<Vec<Subscription>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, subscriber_id, target_id FROM subscriptions
                 WHERE subscriber_id = ?1 ORDER BY id",
                params![subscriber_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("subscriptions_of: {e}")))?;

        let mut subs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("subscriptions_of: {e}")))?
        {
            subs.push(Subscription {
                id: row.get(0).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
                subscriber_id: row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
                target_id: row.get(2).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?,
            });
        }
        Ok(subs)
    }

    async fn reminder_targets(&self) -> Result<Vec<ReminderTarget>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT um.messenger_type, um.messenger_id, um.chat_id,
                        u.id, u.first_name, u.last_name, u.patronymic, u.birth_date, u.email
                 FROM subscriptions s
                 JOIN user_messengers um ON um.user_id = s.subscriber_id AND um.is_activated = 1
                 JOIN users u ON u.id = s.target_id
                 ORDER BY s.id",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reminder_targets: {e}")))?;

        let mut targets = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("reminder_targets: {e}")))?
        {
            let parse = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));
            let channel: String = row.get(0).map_err(parse)?;
            targets.push(ReminderTarget {
                subscriber: ChannelIdentity::new(
                    channel,
                    row.get(1).map_err(parse)?,
                    row.get(2).map_err(parse)?,
                ),
                target: row_to_user(&row, 3).map_err(parse)?,
            });
        }
        Ok(targets)
    }
}
