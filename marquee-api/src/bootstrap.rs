use std::sync::Arc;

use anyhow::Context;
use marquee_core::EventPublisher;
use marquee_store::app_config::{Config, StorageBackend};
use marquee_store::{DbClient, LogEventPublisher, MemoryStore, PgStore, RedisClient};
use tracing::info;

use crate::state::AppState;

/// Everything the process owns for its lifetime.
pub struct Resources {
    pub state: AppState,
    db: Option<DbClient>,
}

impl Resources {
    pub async fn init(config: &Config) -> anyhow::Result<Self> {
        let publisher = event_publisher(config)?;

        // 1. Store
        let (state, db) = match config.storage.backend {
            StorageBackend::Memory => {
                info!("Using in-memory store");
                let store = Arc::new(MemoryStore::new());
                (AppState::new(store.clone(), store.clone(), store, publisher), None)
            }
            StorageBackend::Postgres => {
                let db_config = config
                    .database
                    .as_ref()
                    .context("storage.backend = \"postgres\" needs a [database] section")?;
                let db = DbClient::new(db_config)
                    .await
                    .context("Failed to connect to Postgres")?;
                if db_config.run_migrations {
                    db.migrate().await.context("Failed to run migrations")?;
                }
                info!("Using Postgres store");
                let store = Arc::new(PgStore::new(db.pool.clone()));
                (AppState::new(store.clone(), store.clone(), store, publisher), Some(db))
            }
        };

        // 2. Rate limiting
        let state = match &config.redis {
            Some(redis) => {
                let client = RedisClient::new(&redis.url).context("Invalid Redis URL")?;
                info!(
                    "Rate limiting to {} requests per {}s",
                    config.rate_limit.requests, config.rate_limit.window_seconds
                );
                state.with_rate_limit(Arc::new(client), config.rate_limit.clone())
            }
            None => state,
        };

        Ok(Self { state, db })
    }

    /// Cancels waiting purchases, then closes the database pool.
    pub async fn shutdown(self) {
        self.state.shutdown.cancel();
        let idle = self.state.coordinator.locks().prune_idle();
        tracing::debug!("Dropped {} idle showtime locks", idle);
        if let Some(db) = self.db {
            db.close().await;
        }
        info!("Shutdown complete");
    }
}

#[cfg(feature = "kafka")]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = marquee_store::KafkaEventProducer::new(&kafka.brokers)
                .context("Failed to create Kafka producer")?;
            info!("Publishing events to Kafka at {}", kafka.brokers);
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(LogEventPublisher)),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    if config.kafka.is_some() {
        tracing::warn!("[kafka] is configured but this build lacks the `kafka` feature; events go to the log");
    }
    Ok(Arc::new(LogEventPublisher))
}
