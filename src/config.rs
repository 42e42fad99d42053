use std::{str::FromStr, time::Duration};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

/// Which storage adapter backs the process. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Dynamodb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "dynamodb" | "dynamo" => Ok(Self::Dynamodb),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORAGE_BACKEND: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamoConfig {
    pub table_prefix: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub create_tables: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub dynamodb: Option<DynamoConfig>,
    pub storage_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub cors_allowed_origins: Vec<String>,
}

const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:5173,http://localhost:4173,http://127.0.0.1:5173,http://127.0.0.1:4173";

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend: StorageBackend = env_or("STORAGE_BACKEND", "postgres").parse()?;

        let postgres = match backend {
            StorageBackend::Postgres => Some(PostgresConfig {
                database_url: std::env::var("DATABASE_URL")
                    .map_err(|_| anyhow::anyhow!("DATABASE_URL is required for postgres"))?,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            }),
            _ => None,
        };

        let dynamodb = match backend {
            StorageBackend::Dynamodb => Some(DynamoConfig {
                table_prefix: std::env::var("TABLE_PREFIX")
                    .map_err(|_| anyhow::anyhow!("TABLE_PREFIX is required for dynamodb"))?,
                region: std::env::var("AWS_REGION")
                    .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                    .unwrap_or_else(|_| "us-east-1".into()),
                endpoint_url: std::env::var("AWS_ENDPOINT_URL").ok(),
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                create_tables: env_parse("DYNAMODB_CREATE_TABLES", false),
            }),
            _ => None,
        };

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET is required"))?,
            ttl_hours: env_parse("JWT_TTL_HOURS", 24),
        };

        Ok(Self {
            host: env_or("APP_HOST", "0.0.0.0"),
            port: env_parse("APP_PORT", 8080),
            backend,
            postgres,
            dynamodb,
            storage_timeout_secs: env_parse("STORAGE_TIMEOUT_SECS", 10),
            jwt,
            cors_allowed_origins: split_origins(&env_or(
                "CORS_ALLOWED_ORIGINS",
                DEFAULT_CORS_ORIGINS,
            )),
        })
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    #[cfg(test)]
    pub fn for_memory(secret: &str) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            backend: StorageBackend::Memory,
            postgres: None,
            dynamodb: None,
            storage_timeout_secs: 10,
            jwt: JwtConfig {
                secret: secret.into(),
                ttl_hours: 24,
            },
            cors_allowed_origins: vec!["*".into()],
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
