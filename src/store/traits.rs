//! `IdentityStore` trait — single async interface for users, organizations,
//! channel identities and subscriptions.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::models::{
    ChannelAccount, ChannelIdentity, Organization, Person, ReminderTarget, Subscription, User,
};

/// Backend-agnostic persistence for the identity and subscription data.
///
/// Lookups that find nothing return [`DatabaseError::NotFound`]; list
/// queries return an empty `Vec` instead.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert a user. A duplicate email yields [`DatabaseError::Constraint`].
    async fn save_user(&self, person: &Person) -> Result<i64, DatabaseError>;

    async fn user(&self, id: i64) -> Result<User, DatabaseError>;

    async fn user_by_email(&self, email: &str) -> Result<User, DatabaseError>;

    // ── Organizations ───────────────────────────────────────────────

    /// Return the id of the organization with this exact 4-tuple, inserting it
    /// first if it does not exist yet.
    async fn save_organization(&self, org: &Organization) -> Result<i64, DatabaseError>;

    /// Attach a user to an organization.
    async fn link_user_organization(&self, user_id: i64, org_id: i64)
    -> Result<i64, DatabaseError>;

    /// Organizations whose leading fields equal `path`, in
    /// name → city → office → department order. At most four elements.
    async fn find_organizations(&self, path: &[&str]) -> Result<Vec<Organization>, DatabaseError>;

    /// Members of the organization identified by its full 4-tuple.
    async fn members_of_organization(
        &self,
        org: &Organization,
    ) -> Result<Vec<User>, DatabaseError>;

    // ── Channel identities ──────────────────────────────────────────

    /// Persist a (not yet activated) channel identity carrying `token`.
    async fn save_channel_account(
        &self,
        user_id: i64,
        identity: &ChannelIdentity,
        token: &str,
    ) -> Result<i64, DatabaseError>;

    async fn channel_account(
        &self,
        identity: &ChannelIdentity,
    ) -> Result<ChannelAccount, DatabaseError>;

    /// Activation flag of a channel identity.
    async fn is_activated(&self, identity: &ChannelIdentity) -> Result<bool, DatabaseError> {
        Ok(self.channel_account(identity).await?.is_activated)
    }

    /// Flip the activation flag if `token` matches an unconsumed token for
    /// this identity. Returns whether a row changed.
    async fn activate(&self, identity: &ChannelIdentity, token: &str)
    -> Result<bool, DatabaseError>;

    // ── Subscriptions ───────────────────────────────────────────────

    /// Insert a subscriber → target edge. Duplicates are not rejected.
    async fn subscribe(&self, subscriber_id: i64, target_id: i64) -> Result<i64, DatabaseError>;

    async fn subscriptions_of(&self, subscriber_id: i64)
    -> Result<Vec<Subscription>, DatabaseError>;

    /// Every subscription whose subscriber has an activated channel identity,
    /// joined with the target user.
    async fn reminder_targets(&self) -> Result<Vec<ReminderTarget>, DatabaseError>;

    // ── Composite ───────────────────────────────────────────────────

    /// Persist a freshly registered user: user row, organization
    /// (find-or-insert), membership link and channel identity.
    ///
    /// Not atomic: a failure partway leaves the rows written so far.
    async fn save_all_user_info(
        &self,
        person: &Person,
        identity: &ChannelIdentity,
        token: &str,
        org: &Organization,
    ) -> Result<i64, DatabaseError> {
        let user_id = self.save_user(person).await?;
        let org_id = self.save_organization(org).await?;
        self.link_user_organization(user_id, org_id).await?;
        self.save_channel_account(user_id, identity, token).await?;
        Ok(user_id)
    }
}
