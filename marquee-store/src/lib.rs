pub mod app_config;
pub mod database;
pub mod events;
pub mod memory;
pub mod pg_repo;
pub mod redis_repo;

pub use database::DbClient;
pub use events::LogEventPublisher;
#[cfg(feature = "kafka")]
pub use events::KafkaEventProducer;
pub use memory::MemoryStore;
pub use pg_repo::PgStore;
pub use redis_repo::RedisClient;
