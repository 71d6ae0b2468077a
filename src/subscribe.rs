//! Hierarchy search and subscription edges used by the funnel.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::models::{ChannelIdentity, Organization, User};
use crate::store::IdentityStore;

/// Directory search operations consumed by the conversation engine.
#[async_trait]
pub trait DirectorySearch: Send + Sync {
    /// Distinct values of the next hierarchy level below `path`
    /// (organization names for an empty path, then cities, offices,
    /// departments). Sorted, empty when nothing matches.
    async fn options(&self, path: &[&str]) -> Result<Vec<String>, DatabaseError>;

    /// Members of the organization with this exact 4-tuple.
    async fn members(&self, org: &Organization) -> Result<Vec<User>, DatabaseError>;

    /// Subscribe the user behind `identity` to `target_id`'s birthday.
    /// An unknown target yields `DatabaseError::NotFound`.
    async fn subscribe(
        &self,
        identity: &ChannelIdentity,
        target_id: i64,
    ) -> Result<i64, DatabaseError>;
}

/// `DirectorySearch` over the identity store.
pub struct SubscriptionService {
    store: Arc<dyn IdentityStore>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }
}

fn level_value(org: &Organization, depth: usize) -> Option<&str> {
    match depth {
        0 => Some(&org.name),
        1 => Some(&org.city),
        2 => Some(&org.office),
        3 => Some(&org.department),
        _ => None,
    }
}

#[async_trait]
impl DirectorySearch for SubscriptionService {
    async fn options(&self, path: &[&str]) -> Result<Vec<String>, DatabaseError> {
        let orgs = self.store.find_organizations(path).await?;
        let values: BTreeSet<&str> = orgs
            .iter()
            .filter_map(|org| level_value(org, path.len()))
            .collect();
        Ok(values.into_iter().map(String::from).collect())
    }

    async fn members(&self, org: &Organization) -> Result<Vec<User>, DatabaseError> {
        self.store.members_of_organization(org).await
    }

    async fn subscribe(
        &self,
        identity: &ChannelIdentity,
        target_id: i64,
    ) -> Result<i64, DatabaseError> {
        let subscriber = self.store.channel_account(identity).await?;
        let target = self.store.user(target_id).await?;
        let id = self.store.subscribe(subscriber.user_id, target.id).await?;
        tracing::info!(
            subscriber_id = subscriber.user_id,
            target_id = target.id,
            "Subscribed to birthday"
        );
        Ok(id)
    }
}
