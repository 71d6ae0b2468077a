//! Directory and identity records.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// Channel type string for the Telegram transport.
pub const TELEGRAM: &str = "telegram";
/// Channel type string for the local CLI transport.
pub const CLI: &str = "cli";

/// A person as known to the directory, before it gets a server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    pub patronymic: String,
    pub birth_date: NaiveDate,
    pub email: String,
}

/// A persisted user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub patronymic: String,
    pub birth_date: NaiveDate,
    pub email: String,
}

impl User {
    /// One-line label shown in the person-selection keyboard: `"<id> Last First Patronymic"`.
    ///
    /// The leading id is what the selection step parses back.
    pub fn selection_label(&self) -> String {
        let mut label = format!("{} {} {}", self.id, self.last_name, self.first_name);
        if !self.patronymic.is_empty() {
            label.push(' ');
            label.push_str(&self.patronymic);
        }
        label
    }

    /// "First Last" for reminder texts.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// An organizational unit. The (name, city, office, department) tuple is unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Organization {
    /// Server-assigned id; 0 until persisted.
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub city: String,
    pub office: String,
    pub department: String,
}

/// Identifies a user inside one chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelIdentity {
    /// Transport type, e.g. `"telegram"`.
    pub channel: String,
    /// The user's id within that transport.
    pub user_id: i64,
    /// The conversation the user talks to the bot in.
    pub chat_id: i64,
}

impl ChannelIdentity {
    pub fn new(channel: impl Into<String>, user_id: i64, chat_id: i64) -> Self {
        Self {
            channel: channel.into(),
            user_id,
            chat_id,
        }
    }
}

/// A persisted channel identity row with its activation status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAccount {
    pub user_id: i64,
    pub identity: ChannelIdentity,
    pub is_activated: bool,
    /// Single-use activation token; cleared once consumed.
    pub token: String,
}

/// A directed "remind me about this person" edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub subscriber_id: i64,
    pub target_id: i64,
}

/// A subscription joined with everything needed to deliver a reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTarget {
    /// Where to deliver the reminder.
    pub subscriber: ChannelIdentity,
    /// Whose birthday it is.
    pub target: User,
}

/// Employee record returned by the directory gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub patronymic: String,
    #[serde(deserialize_with = "deserialize_birth_date")]
    pub birth_date: NaiveDate,
    pub email: String,
    /// Organization name.
    pub name: String,
    pub city: String,
    pub office: String,
    pub department: String,
}

impl DirectoryRecord {
    /// Split into the person and the organization they belong to.
    pub fn into_parts(self) -> (Person, Organization) {
        (
            Person {
                first_name: self.first_name,
                last_name: self.last_name,
                patronymic: self.patronymic,
                birth_date: self.birth_date,
                email: self.email,
            },
            Organization {
                id: 0,
                name: self.name,
                city: self.city,
                office: self.office,
                department: self.department,
            },
        )
    }
}

/// Accepts both `2001-05-12` and RFC 3339 timestamps such as `2001-05-12T00:00:00Z`.
fn deserialize_birth_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_birth_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid birth date: {raw}")))
}

/// Parse a birth date in either plain date or RFC 3339 form.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
}
