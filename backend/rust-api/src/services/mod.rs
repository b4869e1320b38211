use crate::config::Config;
use crate::store::{ContentStore, MongoContentStore};
use mongodb::Client as MongoClient;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ContentStore>,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let store = MongoContentStore::new(mongo_client, &config.mongo_database);

        tracing::info!("Ensuring content indexes...");
        tokio::time::timeout(std::time::Duration::from_secs(30), store.ensure_indexes())
            .await
            .map_err(|_| anyhow::anyhow!("MongoDB index creation timeout after 30s"))??;

        tracing::info!(
            "Content store ready (database: {})",
            config.mongo_database
        );

        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// State over an already-built store, e.g. the in-memory one in tests.
    pub fn with_store(config: Config, store: Arc<dyn ContentStore>) -> Self {
        Self { config, store }
    }
}

pub mod cascade;
pub mod content_service;
pub mod hierarchy_service;
pub mod result_service;
pub mod transaction;
pub mod validation;
