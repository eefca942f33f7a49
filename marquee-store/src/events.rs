use async_trait::async_trait;
use marquee_core::{EventPublisher, PublishError};
use tracing::info;

/// Writes events to the log; used when no broker is configured.
#[derive(Clone, Default)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        info!(topic, key, payload, "event");
        Ok(())
    }
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaEventProducer;

#[cfg(feature = "kafka")]
mod kafka {
    use super::*;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::error;

    #[derive(Clone)]
    pub struct KafkaEventProducer {
        producer: FutureProducer,
    }

    impl KafkaEventProducer {
        pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self { producer })
        }
    }

    #[async_trait]
    impl EventPublisher for KafkaEventProducer {
        async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
            let record = FutureRecord::to(topic)
                .key(key)
                .payload(payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", topic, e);
                    Err(PublishError(e.to_string()))
                }
            }
        }
    }
}
