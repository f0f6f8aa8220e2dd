//! Event bus connection configuration.

use std::time::Duration;

/// Bootstrap configuration for the lifecycle-event producer.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub bootstrap_servers: String,
    pub send_timeout: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { bootstrap_servers: "localhost:9092".to_string(), send_timeout: Duration::from_secs(5) }
    }
}

/// The four lifecycle topics, one per `{Service,Module} x {Registered,Unregistered}`.
pub mod topics {
    pub const SERVICE_REGISTERED: &str = "broker.service.registered";
    pub const SERVICE_UNREGISTERED: &str = "broker.service.unregistered";
    pub const MODULE_REGISTERED: &str = "broker.module.registered";
    pub const MODULE_UNREGISTERED: &str = "broker.module.unregistered";
}
