//! In-memory store (tests and local runs)
//!
//! Mirrors the secondary indexes of the persistent backends: a unique
//! email index and an owner index over resources.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{new_id, Store, UserWriteError};
use crate::{
    resources::repo_types::{NewResource, ResourcePatch, ResourceRecord},
    tags::repo_types::Tag,
    users::repo_types::{NewUser, User, UserPatch},
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    users_by_email: HashMap<String, String>,
    tags: HashMap<String, Tag>,
    resources: HashMap<String, ResourceRecord>,
    resources_by_user: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_resources<'a>(it: impl Iterator<Item = &'a ResourceRecord>) -> Vec<ResourceRecord> {
    let mut out: Vec<ResourceRecord> = it.cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    out
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, new: NewUser) -> Result<User, UserWriteError> {
        let mut t = self.tables.write().await;
        if t.users_by_email.contains_key(&new.email) {
            return Err(UserWriteError::EmailTaken);
        }
        let user = User {
            id: new_id(),
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            password_hash: new.password_hash,
        };
        t.users_by_email.insert(user.email.clone(), user.id.clone());
        t.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: &str) -> anyhow::Result<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users_by_email
            .get(email)
            .and_then(|id| t.users.get(id))
            .cloned())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let mut users: Vec<User> = self.tables.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn update_user(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, UserWriteError> {
        let mut t = self.tables.write().await;
        if let Some(email) = &patch.email {
            if t.users_by_email.get(email).is_some_and(|owner| owner.as_str() != id) {
                return Err(UserWriteError::EmailTaken);
            }
        }
        let Some(mut user) = t.users.get(id).cloned() else {
            return Ok(None);
        };
        let old_email = user.email.clone();
        patch.apply_to(&mut user);
        if user.email != old_email {
            t.users_by_email.remove(&old_email);
            t.users_by_email.insert(user.email.clone(), user.id.clone());
        }
        t.users.insert(user.id.clone(), user.clone());
        Ok(Some(user))
    }

    async fn delete_user(&self, id: &str) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        match t.users.remove(id) {
            Some(user) => {
                t.users_by_email.remove(&user.email);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_tag(&self, name: &str) -> anyhow::Result<Tag> {
        let tag = Tag {
            id: new_id(),
            name: name.to_string(),
        };
        self.tables
            .write()
            .await
            .tags
            .insert(tag.id.clone(), tag.clone());
        Ok(tag)
    }

    async fn get_tag_by_id(&self, id: &str) -> anyhow::Result<Option<Tag>> {
        Ok(self.tables.read().await.tags.get(id).cloned())
    }

    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
        let mut tags: Vec<Tag> = self.tables.read().await.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(tags)
    }

    async fn get_tags_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Tag>> {
        let t = self.tables.read().await;
        Ok(super::dedup_ids(ids)
            .iter()
            .filter_map(|id| t.tags.get(id).cloned())
            .collect())
    }

    async fn create_resource(&self, new: NewResource) -> anyhow::Result<ResourceRecord> {
        let record = new.into_record(new_id(), OffsetDateTime::now_utc());
        let mut t = self.tables.write().await;
        t.resources_by_user
            .entry(record.user_id.clone())
            .or_default()
            .insert(record.id.clone());
        t.resources.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_resource_by_id(&self, id: &str) -> anyhow::Result<Option<ResourceRecord>> {
        Ok(self.tables.read().await.resources.get(id).cloned())
    }

    async fn list_resources(&self) -> anyhow::Result<Vec<ResourceRecord>> {
        Ok(sorted_resources(self.tables.read().await.resources.values()))
    }

    async fn get_resources_by_user_id(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Vec<ResourceRecord>> {
        let t = self.tables.read().await;
        let Some(ids) = t.resources_by_user.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(sorted_resources(
            ids.iter().filter_map(|id| t.resources.get(id)),
        ))
    }

    async fn update_resource(
        &self,
        id: &str,
        patch: ResourcePatch,
    ) -> anyhow::Result<Option<ResourceRecord>> {
        let mut t = self.tables.write().await;
        let Some(record) = t.resources.get_mut(id) else {
            return Ok(None);
        };
        patch.apply_to(record);
        Ok(Some(record.clone()))
    }

    async fn delete_resource(&self, id: &str) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let Some(record) = t.resources.remove(id) else {
            return Ok(false);
        };
        if let Some(ids) = t.resources_by_user.get_mut(&record.user_id) {
            ids.remove(id);
        }
        Ok(true)
    }
}
