use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Closed set of resource variants. The stored discriminator is the
/// snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Article,
    CodeSnippet,
    Book,
    Course,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::CodeSnippet => "code_snippet",
            Self::Book => "book",
            Self::Course => "course",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "article" => Some(Self::Article),
            "code_snippet" => Some(Self::CodeSnippet),
            "book" => Some(Self::Book),
            "course" => Some(Self::Course),
            _ => None,
        }
    }
}

/// The `type` discriminator together with its variant-specific fields.
/// Flattened into both the write input and the API output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceVariant {
    Article {
        url: String,
    },
    CodeSnippet {
        code: String,
    },
    Book {
        #[serde(default)]
        author: Option<String>,
    },
    Course {
        #[serde(default)]
        author: Option<String>,
    },
}

/// Storage columns for a variant. Fields foreign to the variant are `None`,
/// so writing all four clears stale extras after a type change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantColumns {
    pub kind: &'static str,
    pub url: Option<String>,
    pub code: Option<String>,
    pub author: Option<String>,
}

impl ResourceVariant {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Article { .. } => ResourceKind::Article,
            Self::CodeSnippet { .. } => ResourceKind::CodeSnippet,
            Self::Book { .. } => ResourceKind::Book,
            Self::Course { .. } => ResourceKind::Course,
        }
    }

    pub fn columns(&self) -> VariantColumns {
        let kind = self.kind().as_str();
        match self {
            Self::Article { url } => VariantColumns {
                kind,
                url: Some(url.clone()),
                code: None,
                author: None,
            },
            Self::CodeSnippet { code } => VariantColumns {
                kind,
                url: None,
                code: Some(code.clone()),
                author: None,
            },
            Self::Book { author } | Self::Course { author } => VariantColumns {
                kind,
                url: None,
                code: None,
                author: author.clone(),
            },
        }
    }
}

/// Normalized resource record: owner and tags by id only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub kind: String,
    pub tag_ids: Vec<String>,
    pub url: Option<String>,
    pub code: Option<String>,
    pub author: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewResource {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub tag_ids: Vec<String>,
    pub variant: ResourceVariant,
}

impl NewResource {
    /// Builds the record a backend persists; id and timestamp are assigned here.
    pub fn into_record(self, id: String, created_at: OffsetDateTime) -> ResourceRecord {
        let cols = self.variant.columns();
        ResourceRecord {
            id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            kind: cols.kind.to_string(),
            tag_ids: self.tag_ids,
            url: cols.url,
            code: cols.code,
            author: cols.author,
            created_at,
        }
    }
}

/// Partial update. `tag_ids` replaces the whole set when present and
/// `variant` rewrites the discriminator and all extra fields together.
#[derive(Debug, Clone, Default)]
pub struct ResourcePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tag_ids: Option<Vec<String>>,
    pub variant: Option<ResourceVariant>,
}

impl ResourcePatch {
    pub fn apply_to(self, record: &mut ResourceRecord) {
        if let Some(v) = self.title {
            record.title = v;
        }
        if let Some(v) = self.description {
            record.description = v;
        }
        if let Some(v) = self.tag_ids {
            record.tag_ids = v;
        }
        if let Some(variant) = self.variant {
            let cols = variant.columns();
            record.kind = cols.kind.to_string();
            record.url = cols.url;
            record.code = cols.code;
            record.author = cols.author;
        }
    }
}
