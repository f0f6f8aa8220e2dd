//! Generated gRPC transport types for the registration broker's public API.

#![forbid(unsafe_code)]

pub mod v1 {
    tonic::include_proto!("broker.v1");
}

pub use v1::registration_broker_client::RegistrationBrokerClient;
pub use v1::registration_broker_server::{RegistrationBroker, RegistrationBrokerServer};

/// Service name constant used by server-reflection and log fields.
pub const REGISTRATION_BROKER_SERVICE_NAME: &str =
    <RegistrationBrokerServer<()> as tonic::server::NamedService>::NAME;
