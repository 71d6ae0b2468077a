//! In-memory fakes of the engine's collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use birthday_bot::auth::AccountService;
use birthday_bot::conversation::{ConversationEngine, InMemoryStateStore};
use birthday_bot::directory::DirectoryGateway;
use birthday_bot::error::{AuthError, DatabaseError, DirectoryError};
use birthday_bot::models::{ChannelIdentity, DirectoryRecord, Organization, Person, User};
use birthday_bot::subscribe::DirectorySearch;

// ── Accounts ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeAccounts {
    /// identity → activated
    pub identities: Mutex<HashMap<ChannelIdentity, bool>>,
    pub emails: Mutex<HashSet<String>>,
    pub registrations: Mutex<Vec<(Person, Organization)>>,
    /// Every call fails with a storage error.
    pub fail: Mutex<bool>,
    /// Every call hangs forever.
    pub stall: Mutex<bool>,
}

impl FakeAccounts {
    pub async fn activate(&self, identity: &ChannelIdentity) {
        self.identities.lock().await.insert(identity.clone(), true);
    }

    pub async fn set_failing(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }

    pub async fn set_stalled(&self, stall: bool) {
        *self.stall.lock().await = stall;
    }

    async fn check(&self) -> Result<(), AuthError> {
        if *self.stall.lock().await {
            std::future::pending::<()>().await;
        }
        if *self.fail.lock().await {
            return Err(AuthError::Database(DatabaseError::Query(
                "database is locked".into(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountService for FakeAccounts {
    async fn is_activated(&self, identity: &ChannelIdentity) -> Result<bool, AuthError> {
        self.check().await?;
        self.identities
            .lock()
            .await
            .get(identity)
            .copied()
            .ok_or_else(|| {
                AuthError::Database(DatabaseError::NotFound {
                    entity: "channel identity".into(),
                    id: identity.user_id.to_string(),
                })
            })
    }

    async fn register_new_user(
        &self,
        person: &Person,
        identity: &ChannelIdentity,
        org: &Organization,
    ) -> Result<i64, AuthError> {
        self.check().await?;
        let mut emails = self.emails.lock().await;
        if !emails.insert(person.email.clone()) {
            return Err(AuthError::UserExists {
                email: person.email.clone(),
            });
        }
        self.identities.lock().await.insert(identity.clone(), false);
        let mut regs = self.registrations.lock().await;
        regs.push((person.clone(), org.clone()));
        Ok(regs.len() as i64)
    }
}

// ── Directory gateway ───────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDirectory {
    pub records: HashMap<String, DirectoryRecord>,
}

impl FakeDirectory {
    pub fn with_employee(mut self, email: &str) -> Self {
        self.records.insert(
            email.to_string(),
            DirectoryRecord {
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                patronymic: String::new(),
                birth_date: NaiveDate::from_ymd_opt(1990, 3, 14).unwrap(),
                email: email.into(),
                name: "Gazprom Media".into(),
                city: "Moscow".into(),
                office: "Main Office".into(),
                department: "Go Dev".into(),
            },
        );
        self
    }
}

#[async_trait]
impl DirectoryGateway for FakeDirectory {
    async fn employee(&self, email: &str) -> Result<DirectoryRecord, DirectoryError> {
        self.records
            .get(email)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                email: email.to_string(),
            })
    }
}

// ── Directory search ────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSearch {
    pub orgs: Vec<Organization>,
    pub members: HashMap<(String, String, String, String), Vec<User>>,
    pub subscriptions: Mutex<Vec<(ChannelIdentity, i64)>>,
    pub fail: Mutex<bool>,
    /// Number of option/member queries issued.
    pub queries: Mutex<usize>,
}

pub fn user(id: i64, first: &str, last: &str) -> User {
    User {
        id,
        first_name: first.into(),
        last_name: last.into(),
        patronymic: String::new(),
        birth_date: NaiveDate::from_ymd_opt(1990, 3, 14).unwrap(),
        email: format!("{}@example.com", first.to_lowercase()),
    }
}

pub fn org(name: &str, city: &str, office: &str, department: &str) -> Organization {
    Organization {
        id: 0,
        name: name.into(),
        city: city.into(),
        office: office.into(),
        department: department.into(),
    }
}

impl FakeSearch {
    /// Gazprom Media with two departments in Moscow and one in Kazan;
    /// Jane Doe (id 42) works in Go Dev.
    pub fn seeded() -> Self {
        let go_dev = org("Gazprom Media", "Moscow", "Main Office", "Go Dev");
        let mut members = HashMap::new();
        members.insert(
            tuple(&go_dev),
            vec![user(42, "Jane", "Doe"), user(43, "John", "Roe")],
        );
        Self {
            orgs: vec![
                go_dev,
                org("Gazprom Media", "Moscow", "Main Office", "QA"),
                org("Gazprom Media", "Kazan", "Tower", "Sales"),
            ],
            members,
            ..Default::default()
        }
    }

    pub async fn set_failing(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }

    async fn check(&self) -> Result<(), DatabaseError> {
        *self.queries.lock().await += 1;
        if *self.fail.lock().await {
            return Err(DatabaseError::Query("database is locked".into()));
        }
        Ok(())
    }
}

fn tuple(org: &Organization) -> (String, String, String, String) {
    (
        org.name.clone(),
        org.city.clone(),
        org.office.clone(),
        org.department.clone(),
    )
}

#[async_trait]
impl DirectorySearch for FakeSearch {
    async fn options(&self, path: &[&str]) -> Result<Vec<String>, DatabaseError> {
        self.check().await?;
        let mut values: Vec<String> = self
            .orgs
            .iter()
            .map(|o| [
                    o.name.as_str(),
                    o.city.as_str(),
                    o.office.as_str(),
                    o.department.as_str(),
                ])
            .filter(|levels| levels[..path.len()] == *path)
            .filter_map(|levels| levels.get(path.len()).map(|v| v.to_string()))
            .collect();
        values.sort();
        values.dedup();
        Ok(values)
    }

    async fn members(&self, org: &Organization) -> Result<Vec<User>, DatabaseError> {
        self.check().await?;
        Ok(self.members.get(&tuple(org)).cloned().unwrap_or_default())
    }

    async fn subscribe(
        &self,
        identity: &ChannelIdentity,
        target_id: i64,
    ) -> Result<i64, DatabaseError> {
        self.check().await?;
        let known = self
            .members
            .values()
            .flatten()
            .any(|u| u.id == target_id);
        if !known {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: target_id.to_string(),
            });
        }
        let mut subs = self.subscriptions.lock().await;
        subs.push((identity.clone(), target_id));
        Ok(subs.len() as i64)
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub engine: Arc<ConversationEngine>,
    pub accounts: Arc<FakeAccounts>,
    pub search: Arc<FakeSearch>,
    pub states: Arc<InMemoryStateStore>,
}

pub fn harness(directory: FakeDirectory, search: FakeSearch) -> Harness {
    let accounts = Arc::new(FakeAccounts::default());
    let search = Arc::new(search);
    let states = Arc::new(InMemoryStateStore::new());
    let engine = Arc::new(ConversationEngine::new(
        accounts.clone(),
        Arc::new(directory),
        search.clone(),
        states.clone(),
    ));
    Harness {
        engine,
        accounts,
        search,
        states,
    }
}

pub fn telegram_user(id: i64) -> ChannelIdentity {
    ChannelIdentity::new("telegram", id, id + 1000)
}
