use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::{NewResource, ResourcePatch, ResourceVariant};
use crate::{tags::repo_types::Tag, users::dto::PublicUser};

/// Write input for create and update. `type` and its extra fields arrive
/// flat alongside the common fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceInput {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(flatten)]
    pub variant: ResourceVariant,
}

impl ResourceInput {
    pub fn into_new(self, user_id: String) -> NewResource {
        NewResource {
            user_id,
            title: self.title,
            description: self.description,
            tag_ids: self.tag_ids,
            variant: self.variant,
        }
    }

    /// Updates carry a full payload, so every field is replaced.
    pub fn into_patch(self) -> ResourcePatch {
        ResourcePatch {
            title: Some(self.title),
            description: Some(self.description),
            tag_ids: Some(self.tag_ids),
            variant: Some(self.variant),
        }
    }
}

/// Fully denormalized resource as returned by the API.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub user: PublicUser,
    pub tags: Vec<Tag>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub variant: ResourceVariant,
}

#[derive(Debug, Serialize)]
pub struct ResourceCollection {
    pub resources: Vec<ResourceView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_reads_flat_variant_fields() {
        let input: ResourceInput = serde_json::from_value(json!({
            "title": "X",
            "description": "Y",
            "type": "article",
            "url": "http://x",
            "tag_ids": ["t1"]
        }))
        .unwrap();
        assert_eq!(
            input.variant,
            ResourceVariant::Article {
                url: "http://x".into()
            }
        );
        assert_eq!(input.tag_ids, vec!["t1"]);

        let book: ResourceInput = serde_json::from_value(json!({
            "title": "X",
            "description": "Y",
            "type": "book"
        }))
        .unwrap();
        assert!(book.tag_ids.is_empty());
        assert_eq!(book.variant, ResourceVariant::Book { author: None });
    }

    #[test]
    fn input_rejects_unknown_type_and_missing_extras() {
        let unknown = serde_json::from_value::<ResourceInput>(json!({
            "title": "X", "description": "Y", "type": "video"
        }));
        assert!(unknown.is_err());

        let no_code = serde_json::from_value::<ResourceInput>(json!({
            "title": "X", "description": "Y", "type": "code_snippet"
        }));
        assert!(no_code.is_err());
    }

    #[test]
    fn view_serializes_variant_inline() {
        let view = ResourceView {
            id: "r1".into(),
            title: "X".into(),
            description: "Y".into(),
            user: PublicUser {
                id: "u1".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "a@x.com".into(),
            },
            tags: vec![],
            created_at: OffsetDateTime::UNIX_EPOCH,
            variant: ResourceVariant::Course { author: None },
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["type"], "course");
        assert!(value["author"].is_null());
        assert_eq!(value["created_at"], "1970-01-01T00:00:00Z");
        assert_eq!(value["user"]["email"], "a@x.com");
        assert!(value.get("password_hash").is_none());
    }
}
