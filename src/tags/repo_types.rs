use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Tags are immutable once created and serialize as-is in API output.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
}
