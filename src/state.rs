use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    config::{AppConfig, StorageBackend},
    store::{DynamoStore, MemoryStore, PgStore, Store},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let store = connect_store(&config).await?;
        Ok(Self::from_parts(store, Arc::new(config)))
    }

    pub fn from_parts(store: Arc<dyn Store>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::from_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(AppConfig::for_memory("test-secret")),
        )
    }
}

async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    let timeout = config.storage_timeout();
    let store: Arc<dyn Store> = match config.backend {
        StorageBackend::Postgres => {
            let cfg = config
                .postgres
                .as_ref()
                .context("postgres backend selected without postgres config")?;
            let store = PgStore::connect(cfg, timeout).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StorageBackend::Dynamodb => {
            let cfg = config
                .dynamodb
                .as_ref()
                .context("dynamodb backend selected without dynamodb config")?;
            let store = DynamoStore::connect(cfg, timeout).await?;
            if cfg.create_tables {
                store.ensure_tables().await?;
            }
            Arc::new(store)
        }
        StorageBackend::Memory => {
            warn!("in-memory store selected; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    info!(backend = ?config.backend, "storage ready");
    Ok(store)
}
