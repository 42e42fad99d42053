//! Conversion between stored resource records and the API shape.
//!
//! Reads resolve the owner and the tags concurrently. A missing owner
//! aborts the request; missing tags are dropped from the output. Writes
//! must reference existing tags only.

use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use tracing::{debug, error};

use super::{
    dto::ResourceView,
    repo_types::{ResourceKind, ResourceRecord, ResourceVariant},
};
use crate::{
    error::{AppError, AppResult},
    store::{dedup_ids, Store},
    tags::repo_types::Tag,
};

pub async fn materialize(store: &dyn Store, record: ResourceRecord) -> AppResult<ResourceView> {
    let (owner, tags) = tokio::try_join!(
        store.get_user_by_id(&record.user_id),
        store.get_tags_by_ids(&record.tag_ids),
    )?;

    let Some(owner) = owner else {
        error!(resource_id = %record.id, user_id = %record.user_id, "resource owner missing");
        return Err(AppError::OwnerNotFound {
            resource_id: record.id,
        });
    };
    let variant = stored_variant(&record)?;
    let tags = in_stored_order(&record.tag_ids, tags);

    Ok(ResourceView {
        id: record.id,
        title: record.title,
        description: record.description,
        user: owner.into(),
        tags,
        created_at: record.created_at,
        variant,
    })
}

pub async fn materialize_all(
    store: &dyn Store,
    records: Vec<ResourceRecord>,
) -> AppResult<Vec<ResourceView>> {
    debug!(count = records.len(), "materializing resources");
    try_join_all(records.into_iter().map(|r| materialize(store, r))).await
}

/// Fails with the missing ids in input order. Repeated ids are checked once.
pub async fn ensure_tags_exist(store: &dyn Store, tag_ids: &[String]) -> AppResult<()> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    let found: HashSet<String> = store
        .get_tags_by_ids(tag_ids)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();

    let missing: Vec<String> = dedup_ids(tag_ids)
        .into_iter()
        .filter(|id| !found.contains(id))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::MissingTags(missing))
    }
}

fn stored_variant(record: &ResourceRecord) -> AppResult<ResourceVariant> {
    let kind = ResourceKind::parse(&record.kind)
        .ok_or_else(|| AppError::UnknownResourceType(record.kind.clone()))?;

    Ok(match kind {
        ResourceKind::Article => ResourceVariant::Article {
            url: record.url.clone().unwrap_or_default(),
        },
        ResourceKind::CodeSnippet => ResourceVariant::CodeSnippet {
            code: record.code.clone().unwrap_or_default(),
        },
        ResourceKind::Book => ResourceVariant::Book {
            author: record.author.clone(),
        },
        ResourceKind::Course => ResourceVariant::Course {
            author: record.author.clone(),
        },
    })
}

fn in_stored_order(tag_ids: &[String], found: Vec<Tag>) -> Vec<Tag> {
    let mut by_id: HashMap<String, Tag> = found.into_iter().map(|t| (t.id.clone(), t)).collect();
    tag_ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        resources::repo_types::NewResource,
        store::MemoryStore,
        users::repo_types::{NewUser, User},
    };

    async fn user(store: &MemoryStore, email: &str) -> User {
        store
            .create_user(NewUser {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: email.into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap()
    }

    fn new_resource(user_id: &str, tag_ids: Vec<String>, variant: ResourceVariant) -> NewResource {
        NewResource {
            user_id: user_id.into(),
            title: "X".into(),
            description: "Y".into(),
            tag_ids,
            variant,
        }
    }

    #[tokio::test]
    async fn materializes_owner_tags_and_variant() {
        let store = MemoryStore::new();
        let a = user(&store, "a@x.com").await;
        let t1 = store.create_tag("rust").await.unwrap();

        let record = store
            .create_resource(new_resource(
                &a.id,
                vec![t1.id.clone()],
                ResourceVariant::Article {
                    url: "http://x".into(),
                },
            ))
            .await
            .unwrap();
        let view = materialize(&store, record.clone()).await.unwrap();

        assert_eq!(view.id, record.id);
        assert_eq!(view.title, "X");
        assert_eq!(view.description, "Y");
        assert_eq!(view.user.email, "a@x.com");
        assert_eq!(view.tags, vec![t1]);
        assert_eq!(view.created_at, record.created_at);
        assert_eq!(
            view.variant,
            ResourceVariant::Article {
                url: "http://x".into()
            }
        );
    }

    #[tokio::test]
    async fn tags_follow_stored_order_and_missing_ones_are_dropped() {
        let store = MemoryStore::new();
        let a = user(&store, "a@x.com").await;
        let t1 = store.create_tag("rust").await.unwrap();
        let t2 = store.create_tag("async").await.unwrap();

        let record = store
            .create_resource(new_resource(
                &a.id,
                vec![t2.id.clone(), "gone".into(), t1.id.clone()],
                ResourceVariant::Book { author: None },
            ))
            .await
            .unwrap();
        let view = materialize(&store, record).await.unwrap();
        assert_eq!(view.tags, vec![t2, t1]);
        assert_eq!(view.variant, ResourceVariant::Book { author: None });
    }

    #[tokio::test]
    async fn orphaned_resource_fails_with_owner_not_found() {
        let store = MemoryStore::new();
        let a = user(&store, "a@x.com").await;
        let record = store
            .create_resource(new_resource(
                &a.id,
                vec![],
                ResourceVariant::Course { author: None },
            ))
            .await
            .unwrap();
        store.delete_user(&a.id).await.unwrap();

        let err = materialize(&store, record).await.unwrap_err();
        assert!(matches!(err, AppError::OwnerNotFound { .. }));
    }

    #[tokio::test]
    async fn unknown_stored_type_is_internal() {
        let store = MemoryStore::new();
        let a = user(&store, "a@x.com").await;
        let mut record = store
            .create_resource(new_resource(
                &a.id,
                vec![],
                ResourceVariant::Article { url: "u".into() },
            ))
            .await
            .unwrap();
        record.kind = "video".into();

        let err = materialize(&store, record).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownResourceType(ref k) if k == "video"));
    }

    #[test]
    fn absent_extras_get_defaults() {
        let mut record = new_resource("u1", vec![], ResourceVariant::Article { url: "u".into() })
            .into_record("r1".into(), time::OffsetDateTime::UNIX_EPOCH);
        record.url = None;
        assert_eq!(
            stored_variant(&record).unwrap(),
            ResourceVariant::Article { url: String::new() }
        );

        record.kind = "code_snippet".into();
        assert_eq!(
            stored_variant(&record).unwrap(),
            ResourceVariant::CodeSnippet {
                code: String::new()
            }
        );
    }

    #[tokio::test]
    async fn ensure_tags_exist_reports_missing_ids_in_input_order() {
        let store = MemoryStore::new();
        let t1 = store.create_tag("rust").await.unwrap();

        ensure_tags_exist(&store, &[]).await.unwrap();
        ensure_tags_exist(&store, &[t1.id.clone(), t1.id.clone()])
            .await
            .unwrap();

        let err = ensure_tags_exist(
            &store,
            &["z".into(), t1.id.clone(), "a".into(), "z".into()],
        )
        .await
        .unwrap_err();
        match err {
            AppError::MissingTags(ids) => assert_eq!(ids, vec!["z", "a"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn materialize_all_keeps_record_order() {
        let store = MemoryStore::new();
        let a = user(&store, "a@x.com").await;
        let mut records = Vec::new();
        for url in ["1", "2", "3"] {
            records.push(
                store
                    .create_resource(new_resource(
                        &a.id,
                        vec![],
                        ResourceVariant::Article { url: url.into() },
                    ))
                    .await
                    .unwrap(),
            );
        }
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let views = materialize_all(&store, records).await.unwrap();
        assert_eq!(views.iter().map(|v| v.id.clone()).collect::<Vec<_>>(), ids);
    }
}
