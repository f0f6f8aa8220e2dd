//! Domain logic and gRPC surface for the registration broker: the
//! Registration Coordinator (C1), Health Gate (C3), Discovery Query service
//! (C7), and the `tonic`-generated `RegistrationBroker` implementation that
//! fronts them.

pub mod api;
pub mod config;
pub mod domain;

pub use config::BrokerConfig;
pub use domain::{DiscoveryQueryService, HealthGate, RegistrationCoordinator};
