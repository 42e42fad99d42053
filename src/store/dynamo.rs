//! DynamoDB store
//!
//! Three tables named `{prefix}-users`, `{prefix}-tags`, `{prefix}-resources`.
//! Owner and tags are bare id attributes resolved by explicit fetches.
//! Email uniqueness is looked up through the `email-index` GSI; DynamoDB
//! cannot enforce it, so callers check before writing.

use std::{collections::HashMap, time::Duration};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use aws_config::{timeout::TimeoutConfig, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::{
    config::Region,
    types::{
        AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex,
        KeySchemaElement, KeyType, Projection, ProjectionType, ReturnValue,
        ScalarAttributeType,
    },
    Client,
};
use futures::future::try_join_all;
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    OffsetDateTime, PrimitiveDateTime,
};
use tracing::{debug, info};

use super::{dedup_ids, new_id, Store, UserWriteError};
use crate::{
    config::DynamoConfig,
    resources::repo_types::{NewResource, ResourcePatch, ResourceRecord},
    tags::repo_types::Tag,
    users::repo_types::{NewUser, User, UserPatch},
};

type Item = HashMap<String, AttributeValue>;

const EMAIL_INDEX: &str = "email-index";
const USER_ID_INDEX: &str = "user_id-index";

#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
    users_table: String,
    tags_table: String,
    resources_table: String,
}

impl DynamoStore {
    pub async fn connect(cfg: &DynamoConfig, timeout: Duration) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        if let Some(endpoint) = &cfg.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (&cfg.access_key_id, &cfg.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ));
        }
        let shared = loader.load().await;

        info!(prefix = %cfg.table_prefix, region = %cfg.region, "dynamodb client ready");
        Ok(Self::with_client(Client::new(&shared), &cfg.table_prefix))
    }

    pub fn with_client(client: Client, prefix: &str) -> Self {
        Self {
            client,
            users_table: format!("{prefix}-users"),
            tags_table: format!("{prefix}-tags"),
            resources_table: format!("{prefix}-resources"),
        }
    }

    /// Creates the three tables with on-demand billing. Existing tables are
    /// left as they are.
    pub async fn ensure_tables(&self) -> anyhow::Result<()> {
        self.create_table(&self.users_table, "user_id", Some((EMAIL_INDEX, "email")))
            .await?;
        self.create_table(&self.tags_table, "tag_id", None).await?;
        self.create_table(
            &self.resources_table,
            "resource_id",
            Some((USER_ID_INDEX, "user_id")),
        )
        .await?;
        Ok(())
    }

    async fn create_table(
        &self,
        name: &str,
        pk: &str,
        gsi: Option<(&str, &str)>,
    ) -> anyhow::Result<()> {
        let mut req = self
            .client
            .create_table()
            .table_name(name)
            .billing_mode(BillingMode::PayPerRequest)
            .attribute_definitions(string_attribute(pk)?)
            .key_schema(hash_key(pk)?);

        if let Some((index, attr)) = gsi {
            req = req.attribute_definitions(string_attribute(attr)?).global_secondary_indexes(
                GlobalSecondaryIndex::builder()
                    .index_name(index)
                    .key_schema(hash_key(attr)?)
                    .projection(
                        Projection::builder()
                            .projection_type(ProjectionType::All)
                            .build(),
                    )
                    .build()?,
            );
        }

        match req.send().await {
            Ok(_) => info!(table = name, "dynamodb table created"),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_in_use_exception()) =>
            {
                info!(table = name, "dynamodb table already exists");
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!("create table {name}")))
            }
        }
        Ok(())
    }

    async fn get_item(&self, table: &str, pk: &str, id: &str) -> anyhow::Result<Option<Item>> {
        let out = self
            .client
            .get_item()
            .table_name(table)
            .key(pk, s(id))
            .send()
            .await
            .with_context(|| format!("dynamodb get_item {table}"))?;
        Ok(out.item().cloned())
    }

    async fn scan_all(&self, table: &str) -> anyhow::Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let out = self
                .client
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .with_context(|| format!("dynamodb scan {table}"))?;
            items.extend(out.items().iter().cloned());
            match out.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn query_index(
        &self,
        table: &str,
        index: &str,
        attr: &str,
        value: &str,
    ) -> anyhow::Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let out = self
                .client
                .query()
                .table_name(table)
                .index_name(index)
                .key_condition_expression("#k = :v")
                .expression_attribute_names("#k", attr)
                .expression_attribute_values(":v", s(value))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .with_context(|| format!("dynamodb query {table}/{index}"))?;
            items.extend(out.items().iter().cloned());
            match out.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(items)
    }

    /// Applies `expr` only when the key exists; `Ok(None)` otherwise.
    async fn update_existing(
        &self,
        table: &str,
        pk: &str,
        id: &str,
        expr: UpdateExpr,
    ) -> anyhow::Result<Option<Item>> {
        let (expression, mut names, values) = expr.into_parts();
        names.insert("#pk".into(), pk.into());

        let result = self
            .client
            .update_item()
            .table_name(table)
            .key(pk, s(id))
            .update_expression(expression)
            .condition_expression("attribute_exists(#pk)")
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values((!values.is_empty()).then_some(values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(out) => Ok(out.attributes().cloned()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(None)
            }
            Err(err) => Err(anyhow::Error::new(err).context(format!("dynamodb update_item {table}"))),
        }
    }

    async fn delete_existing(&self, table: &str, pk: &str, id: &str) -> anyhow::Result<bool> {
        let result = self
            .client
            .delete_item()
            .table_name(table)
            .key(pk, s(id))
            .condition_expression("attribute_exists(#pk)")
            .expression_attribute_names("#pk", pk)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                Ok(false)
            }
            Err(err) => Err(anyhow::Error::new(err).context(format!("dynamodb delete_item {table}"))),
        }
    }

    async fn put(&self, table: &str, item: Item) -> anyhow::Result<()> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(item))
            .send()
            .await
            .with_context(|| format!("dynamodb put_item {table}"))?;
        Ok(())
    }
}

#[async_trait]
impl Store for DynamoStore {
    async fn create_user(&self, new: NewUser) -> Result<User, UserWriteError> {
        let user = User {
            id: new_id(),
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            password_hash: new.password_hash,
        };
        self.put(&self.users_table, user_to_item(&user)).await?;
        Ok(user)
    }

    async fn get_user_by_id(&self, id: &str) -> anyhow::Result<Option<User>> {
        self.get_item(&self.users_table, "user_id", id)
            .await?
            .as_ref()
            .map(user_from_item)
            .transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let items = self
            .query_index(&self.users_table, EMAIL_INDEX, "email", email)
            .await?;
        items.first().map(user_from_item).transpose()
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        self.scan_all(&self.users_table)
            .await?
            .iter()
            .map(user_from_item)
            .collect()
    }

    async fn update_user(
        &self,
        id: &str,
        patch: UserPatch,
    ) -> Result<Option<User>, UserWriteError> {
        let mut expr = UpdateExpr::default();
        expr.set_opt("first_name", patch.first_name);
        expr.set_opt("last_name", patch.last_name);
        expr.set_opt("email", patch.email);
        expr.set_opt("password", patch.password_hash);
        if expr.is_empty() {
            return Ok(self.get_user_by_id(id).await?);
        }
        let item = self
            .update_existing(&self.users_table, "user_id", id, expr)
            .await?;
        Ok(item.as_ref().map(user_from_item).transpose()?)
    }

    async fn delete_user(&self, id: &str) -> anyhow::Result<bool> {
        self.delete_existing(&self.users_table, "user_id", id).await
    }

    async fn create_tag(&self, name: &str) -> anyhow::Result<Tag> {
        let tag = Tag {
            id: new_id(),
            name: name.to_string(),
        };
        self.put(&self.tags_table, tag_to_item(&tag)).await?;
        Ok(tag)
    }

    async fn get_tag_by_id(&self, id: &str) -> anyhow::Result<Option<Tag>> {
        self.get_item(&self.tags_table, "tag_id", id)
            .await?
            .as_ref()
            .map(tag_from_item)
            .transpose()
    }

    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
        self.scan_all(&self.tags_table)
            .await?
            .iter()
            .map(tag_from_item)
            .collect()
    }

    async fn get_tags_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<Tag>> {
        let ids = dedup_ids(ids);
        debug!(count = ids.len(), "fetching tags by id");
        let found = try_join_all(ids.iter().map(|id| self.get_tag_by_id(id))).await?;
        Ok(found.into_iter().flatten().collect())
    }

    async fn create_resource(&self, new: NewResource) -> anyhow::Result<ResourceRecord> {
        let record = new.into_record(new_id(), OffsetDateTime::now_utc());
        self.put(&self.resources_table, resource_to_item(&record)?)
            .await?;
        Ok(record)
    }

    async fn get_resource_by_id(&self, id: &str) -> anyhow::Result<Option<ResourceRecord>> {
        self.get_item(&self.resources_table, "resource_id", id)
            .await?
            .as_ref()
            .map(resource_from_item)
            .transpose()
    }

    async fn list_resources(&self) -> anyhow::Result<Vec<ResourceRecord>> {
        self.scan_all(&self.resources_table)
            .await?
            .iter()
            .map(resource_from_item)
            .collect()
    }

    async fn get_resources_by_user_id(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Vec<ResourceRecord>> {
        self.query_index(&self.resources_table, USER_ID_INDEX, "user_id", user_id)
            .await?
            .iter()
            .map(resource_from_item)
            .collect()
    }

    async fn update_resource(
        &self,
        id: &str,
        patch: ResourcePatch,
    ) -> anyhow::Result<Option<ResourceRecord>> {
        let mut expr = UpdateExpr::default();
        expr.set_opt("title", patch.title);
        expr.set_opt("description", patch.description);
        if let Some(tag_ids) = patch.tag_ids {
            expr.set("tag_ids", string_list(&tag_ids));
        }
        if let Some(variant) = patch.variant {
            let cols = variant.columns();
            expr.set("type", s(cols.kind));
            expr.set_or_remove("url", cols.url);
            expr.set_or_remove("code", cols.code);
            expr.set_or_remove("author", cols.author);
        }
        if expr.is_empty() {
            return self.get_resource_by_id(id).await;
        }
        self.update_existing(&self.resources_table, "resource_id", id, expr)
            .await?
            .as_ref()
            .map(resource_from_item)
            .transpose()
    }

    async fn delete_resource(&self, id: &str) -> anyhow::Result<bool> {
        self.delete_existing(&self.resources_table, "resource_id", id)
            .await
    }

    async fn close(&self) {
        info!("dynamodb client released");
    }
}

#[derive(Debug, Default)]
struct UpdateExpr {
    sets: Vec<String>,
    removes: Vec<String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl UpdateExpr {
    fn set(&mut self, attr: &str, value: AttributeValue) {
        self.names.insert(format!("#{attr}"), attr.to_string());
        self.values.insert(format!(":{attr}"), value);
        self.sets.push(format!("#{attr} = :{attr}"));
    }

    fn set_opt(&mut self, attr: &str, value: Option<String>) {
        if let Some(v) = value {
            self.set(attr, s(v));
        }
    }

    fn set_or_remove(&mut self, attr: &str, value: Option<String>) {
        match value {
            Some(v) => self.set(attr, s(v)),
            None => {
                self.names.insert(format!("#{attr}"), attr.to_string());
                self.removes.push(format!("#{attr}"));
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.removes.is_empty()
    }

    fn expression(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if !self.sets.is_empty() {
            parts.push(format!("SET {}", self.sets.join(", ")));
        }
        if !self.removes.is_empty() {
            parts.push(format!("REMOVE {}", self.removes.join(", ")));
        }
        parts.join(" ")
    }

    fn into_parts(self) -> (String, HashMap<String, String>, HashMap<String, AttributeValue>) {
        (self.expression(), self.names, self.values)
    }
}

fn string_attribute(name: &str) -> anyhow::Result<AttributeDefinition> {
    Ok(AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()?)
}

fn hash_key(name: &str) -> anyhow::Result<KeySchemaElement> {
    Ok(KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(KeyType::Hash)
        .build()?)
}

fn s(v: impl Into<String>) -> AttributeValue {
    AttributeValue::S(v.into())
}

fn string_list(values: &[String]) -> AttributeValue {
    AttributeValue::L(values.iter().map(|v| s(v.as_str())).collect())
}

fn get_s(item: &Item, key: &str) -> anyhow::Result<String> {
    get_opt_s(item, key).ok_or_else(|| anyhow!("dynamodb item missing string attribute `{key}`"))
}

fn get_opt_s(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

/// Accepts both list-of-strings and string-set encodings.
fn get_string_list(item: &Item, key: &str) -> Vec<String> {
    match item.get(key) {
        Some(AttributeValue::L(values)) => values
            .iter()
            .filter_map(|v| v.as_s().ok().cloned())
            .collect(),
        Some(AttributeValue::Ss(values)) => values.clone(),
        _ => Vec::new(),
    }
}

/// RFC 3339, or a zone-less ISO 8601 timestamp taken as UTC.
fn parse_timestamp(raw: &str) -> anyhow::Result<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT)
        .map(PrimitiveDateTime::assume_utc)
        .with_context(|| format!("unparseable created_at `{raw}`"))
}

fn user_to_item(user: &User) -> Item {
    HashMap::from([
        ("user_id".to_string(), s(user.id.as_str())),
        ("first_name".to_string(), s(user.first_name.as_str())),
        ("last_name".to_string(), s(user.last_name.as_str())),
        ("email".to_string(), s(user.email.as_str())),
        ("password".to_string(), s(user.password_hash.as_str())),
    ])
}

fn user_from_item(item: &Item) -> anyhow::Result<User> {
    Ok(User {
        id: get_s(item, "user_id")?,
        first_name: get_opt_s(item, "first_name").unwrap_or_default(),
        last_name: get_opt_s(item, "last_name").unwrap_or_default(),
        email: get_s(item, "email")?,
        password_hash: get_opt_s(item, "password").unwrap_or_default(),
    })
}

fn tag_to_item(tag: &Tag) -> Item {
    HashMap::from([
        ("tag_id".to_string(), s(tag.id.as_str())),
        ("name".to_string(), s(tag.name.as_str())),
    ])
}

fn tag_from_item(item: &Item) -> anyhow::Result<Tag> {
    Ok(Tag {
        id: get_s(item, "tag_id")?,
        name: get_opt_s(item, "name").unwrap_or_default(),
    })
}

fn resource_to_item(rec: &ResourceRecord) -> anyhow::Result<Item> {
    let mut item = HashMap::from([
        ("resource_id".to_string(), s(rec.id.as_str())),
        ("user_id".to_string(), s(rec.user_id.as_str())),
        ("title".to_string(), s(rec.title.as_str())),
        ("description".to_string(), s(rec.description.as_str())),
        ("type".to_string(), s(rec.kind.as_str())),
        ("tag_ids".to_string(), string_list(&rec.tag_ids)),
        (
            "created_at".to_string(),
            s(rec.created_at.format(&Rfc3339).context("format created_at")?),
        ),
    ]);
    for (key, value) in [("url", &rec.url), ("code", &rec.code), ("author", &rec.author)] {
        if let Some(v) = value {
            item.insert(key.to_string(), s(v.as_str()));
        }
    }
    Ok(item)
}

fn resource_from_item(item: &Item) -> anyhow::Result<ResourceRecord> {
    Ok(ResourceRecord {
        id: get_s(item, "resource_id")?,
        user_id: get_s(item, "user_id")?,
        title: get_opt_s(item, "title").unwrap_or_default(),
        description: get_opt_s(item, "description").unwrap_or_default(),
        kind: get_s(item, "type")?,
        tag_ids: get_string_list(item, "tag_ids"),
        url: get_opt_s(item, "url"),
        code: get_opt_s(item, "code"),
        author: get_opt_s(item, "author"),
        created_at: parse_timestamp(&get_s(item, "created_at")?)?,
    })
}
