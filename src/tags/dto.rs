use serde::{Deserialize, Serialize};

use super::repo_types::Tag;

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TagCollection {
    pub tags: Vec<Tag>,
}
