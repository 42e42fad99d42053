//! Storage adapters
//!
//! One capability trait, three interchangeable backends:
//! PostgreSQL (normalized tables), DynamoDB (key-value tables with GSIs)
//! and an in-memory map used by tests and local runs.
//!
//! Lookups of absent keys return `None`/`false`. Every `Err` is an
//! infrastructure failure and is never retried here.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    resources::repo_types::{NewResource, ResourcePatch, ResourceRecord},
    tags::repo_types::Tag,
    users::repo_types::{NewUser, User, UserPatch},
};

pub mod dynamo;
pub mod memory;
pub mod postgres;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Failure of a user write. The email conflict is reported by the backend
/// itself, so a racing writer that got past the service check still sees it.
#[derive(Debug, thiserror::Error)]
pub enum UserWriteError {
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn create_user(&self, new: NewUser) -> Result<User, UserWriteError>;
    async fn get_user_by_id(&self, id: &str) -> anyhow::Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    async fn update_user(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, UserWriteError>;
    async fn delete_user(&self, id: &str) -> anyhow::Result<bool>;

    // tags
    async fn create_tag(&self, name: &str) -> anyhow::Result<Tag>;
    async fn get_tag_by_id(&self, id: &str) -> anyhow::Result<Option<Tag>>;
    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>>;
    /// Returns only the tags that exist; callers detect missing ids themselves.
    async fn get_tags_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Tag>>;

    // resources
    async fn create_resource(&self, new: NewResource) -> anyhow::Result<ResourceRecord>;
    async fn get_resource_by_id(&self, id: &str) -> anyhow::Result<Option<ResourceRecord>>;
    async fn list_resources(&self) -> anyhow::Result<Vec<ResourceRecord>>;
    async fn get_resources_by_user_id(&self, user_id: &str)
        -> anyhow::Result<Vec<ResourceRecord>>;
    async fn update_resource(
        &self,
        id: &str,
        patch: ResourcePatch,
    ) -> anyhow::Result<Option<ResourceRecord>>;
    async fn delete_resource(&self, id: &str) -> anyhow::Result<bool>;

    /// Releases connections during shutdown.
    async fn close(&self) {}
}

/// Fresh opaque identity shared by all backends.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Drops repeated ids, keeping first occurrence order.
pub(crate) fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let ids: Vec<String> = ["b", "a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dedup_ids(&ids), vec!["b", "a", "c"]);
    }
}
