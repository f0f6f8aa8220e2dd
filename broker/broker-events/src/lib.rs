//! Event Publisher: fire-and-forget lifecycle notifications onto the event
//! bus, keyed by a deterministic UUID derived from the service id.

pub mod config;
pub mod payload;
pub mod publisher;

pub use config::EventBusConfig;
pub use publisher::KafkaEventPublisher;
