//! `EventPublisher` implementation over an `rdkafka` producer. Publish
//! failures are logged and swallowed; they must never fail a registration.

use async_trait::async_trait;
use broker_contracts::traits::EventPublisher;
use prost::Message;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::config::{EventBusConfig, topics};
use crate::payload::{LifecycleEventPayload, event_key};

/// Publishes lifecycle events onto the Kafka-compatible event bus.
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    cfg: EventBusConfig,
}

impl KafkaEventPublisher {
    /// # Errors
    /// Returns an error if the producer cannot be constructed (e.g. an
    /// invalid `bootstrap.servers` value).
    pub fn new(cfg: EventBusConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer =
            ClientConfig::new().set("bootstrap.servers", &cfg.bootstrap_servers).create()?;
        Ok(Self { producer, cfg })
    }

    async fn publish(&self, topic: &str, service_id: &str, name: &str) {
        let payload = LifecycleEventPayload {
            service_id: service_id.to_string(),
            name: name.to_string(),
            timestamp_unix_millis: chrono_now_millis(),
        };
        let bytes = payload.encode_length_delimited_to_vec();
        let key = event_key(service_id);

        let record = FutureRecord::to(topic).key(&key).payload(&bytes);
        if let Err((err, _)) = self.producer.send(record, self.cfg.send_timeout).await {
            tracing::warn!(topic, service_id, error = %err, "lifecycle event publish failed, dropping");
        }
    }
}

fn chrono_now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn emit_service_registered(&self, service_id: &str, name: &str) {
        self.publish(topics::SERVICE_REGISTERED, service_id, name).await;
    }

    async fn emit_service_unregistered(&self, service_id: &str, name: &str) {
        self.publish(topics::SERVICE_UNREGISTERED, service_id, name).await;
    }

    async fn emit_module_registered(&self, service_id: &str, name: &str) {
        self.publish(topics::MODULE_REGISTERED, service_id, name).await;
    }

    async fn emit_module_unregistered(&self, service_id: &str, name: &str) {
        self.publish(topics::MODULE_UNREGISTERED, service_id, name).await;
    }
}
