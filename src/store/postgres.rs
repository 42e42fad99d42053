//! PostgreSQL store: normalized tables, owner and tags held by id.

use std::{str::FromStr, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use time::OffsetDateTime;
use tracing::{info, warn};

use super::{new_id, Store, UserWriteError};
use crate::{
    config::PostgresConfig,
    resources::repo_types::{NewResource, ResourcePatch, ResourceRecord},
    tags::repo_types::Tag,
    users::repo_types::{NewUser, User, UserPatch},
};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash";
const RESOURCE_COLUMNS: &str =
    "id, user_id, title, description, kind, tag_ids, url, code, author, created_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    /// Pool waits and statements share the same bound.
    pub async fn connect(cfg: &PostgresConfig, timeout: Duration) -> anyhow::Result<Self> {
        let options = PgConnectOptions::from_str(&cfg.database_url)
            .context("parse DATABASE_URL")?
            .options([("statement_timeout", statement_timeout(timeout))]);
        let db = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .context("connect to database")?;
        info!(
            max_connections = cfg.max_connections,
            timeout_ms = timeout.as_millis() as u64,
            "postgres pool ready"
        );
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

fn statement_timeout(timeout: Duration) -> String {
    format!("{}ms", timeout.as_millis())
}

/// `users_email_idx` violations become a typed conflict.
fn user_write_error(err: sqlx::Error, op: &'static str) -> UserWriteError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => UserWriteError::EmailTaken,
        _ => UserWriteError::Other(anyhow::Error::new(err).context(op)),
    }
}

/// Bind values for the resource update. `rewrite_variant` switches the
/// `CASE` branches so a variant change writes all four variant columns.
#[derive(Debug, PartialEq, Eq)]
struct ResourceUpdate {
    title: Option<String>,
    description: Option<String>,
    tag_ids: Option<Vec<String>>,
    rewrite_variant: bool,
    kind: Option<&'static str>,
    url: Option<String>,
    code: Option<String>,
    author: Option<String>,
}

impl From<ResourcePatch> for ResourceUpdate {
    fn from(patch: ResourcePatch) -> Self {
        let cols = patch.variant.as_ref().map(|v| v.columns());
        let rewrite_variant = cols.is_some();
        let (kind, url, code, author) = match cols {
            Some(c) => (Some(c.kind), c.url, c.code, c.author),
            None => (None, None, None, None),
        };
        Self {
            title: patch.title,
            description: patch.description,
            tag_ids: patch.tag_ids,
            rewrite_variant,
            kind,
            url,
            code,
            author,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, new: NewUser) -> Result<User, UserWriteError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new_id())
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| user_write_error(e, "insert user"))?;
        Ok(user)
    }

    async fn get_user_by_id(&self, id: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get user by id")?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("get user by email")?;
        Ok(user)
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY email"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(users)
    }

    async fn update_user(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, UserWriteError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET first_name    = COALESCE($2, first_name),
                   last_name     = COALESCE($3, last_name),
                   email         = COALESCE($4, email),
                   password_hash = COALESCE($5, password_hash)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.first_name)
        .bind(patch.last_name)
        .bind(patch.email)
        .bind(patch.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| user_write_error(e, "update user"))?;
        Ok(user)
    }

    async fn delete_user(&self, id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_tag(&self, name: &str) -> anyhow::Result<Tag> {
        let tag = sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(new_id())
        .bind(name)
        .fetch_one(&self.db)
        .await
        .context("insert tag")?;
        Ok(tag)
    }

    async fn get_tag_by_id(&self, id: &str) -> anyhow::Result<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("get tag by id")?;
        Ok(tag)
    }

    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name, id")
            .fetch_all(&self.db)
            .await
            .context("list tags")?;
        Ok(tags)
    }

    async fn get_tags_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.db)
            .await
            .context("get tags by ids")?;
        Ok(tags)
    }

    async fn create_resource(&self, new: NewResource) -> anyhow::Result<ResourceRecord> {
        let rec = new.into_record(new_id(), OffsetDateTime::now_utc());
        let row = sqlx::query_as::<_, ResourceRecord>(&format!(
            r#"
            INSERT INTO resources
                (id, user_id, title, description, kind, tag_ids, url, code, author, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {RESOURCE_COLUMNS}
            "#
        ))
        .bind(&rec.id)
        .bind(&rec.user_id)
        .bind(&rec.title)
        .bind(&rec.description)
        .bind(&rec.kind)
        .bind(&rec.tag_ids)
        .bind(&rec.url)
        .bind(&rec.code)
        .bind(&rec.author)
        .bind(rec.created_at)
        .fetch_one(&self.db)
        .await
        .context("insert resource")?;
        Ok(row)
    }

    async fn get_resource_by_id(&self, id: &str) -> anyhow::Result<Option<ResourceRecord>> {
        let row = sqlx::query_as::<_, ResourceRecord>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get resource by id")?;
        Ok(row)
    }

    async fn list_resources(&self) -> anyhow::Result<Vec<ResourceRecord>> {
        let rows = sqlx::query_as::<_, ResourceRecord>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources ORDER BY created_at, id"
        ))
        .fetch_all(&self.db)
        .await
        .context("list resources")?;
        Ok(rows)
    }

    async fn get_resources_by_user_id(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Vec<ResourceRecord>> {
        let rows = sqlx::query_as::<_, ResourceRecord>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list resources by user")?;
        Ok(rows)
    }

    async fn update_resource(
        &self,
        id: &str,
        patch: ResourcePatch,
    ) -> anyhow::Result<Option<ResourceRecord>> {
        let update = ResourceUpdate::from(patch);
        let row = sqlx::query_as::<_, ResourceRecord>(&format!(
            r#"
            UPDATE resources
               SET title       = COALESCE($2, title),
                   description = COALESCE($3, description),
                   tag_ids     = COALESCE($4::text[], tag_ids),
                   kind        = CASE WHEN $5 THEN $6::text ELSE kind END,
                   url         = CASE WHEN $5 THEN $7::text ELSE url END,
                   code        = CASE WHEN $5 THEN $8::text ELSE code END,
                   author      = CASE WHEN $5 THEN $9::text ELSE author END
             WHERE id = $1
            RETURNING {RESOURCE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.title)
        .bind(update.description)
        .bind(update.tag_ids)
        .bind(update.rewrite_variant)
        .bind(update.kind)
        .bind(update.url)
        .bind(update.code)
        .bind(update.author)
        .fetch_optional(&self.db)
        .await
        .context("update resource")?;
        Ok(row)
    }

    async fn delete_resource(&self, id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete resource")?;
        Ok(res.rows_affected() > 0)
    }

    async fn close(&self) {
        if self.db.is_closed() {
            warn!("postgres pool already closed");
            return;
        }
        self.db.close().await;
        info!("postgres pool closed");
    }
}
