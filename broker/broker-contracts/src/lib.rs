//! Domain model and adapter trait contracts for the registration broker.
//!
//! This crate has no I/O of its own. It defines the shapes the coordinator
//! and discovery-query domain services in `broker-core` operate on, and the
//! trait seams each adapter crate (`broker-consul`, `broker-db`,
//! `broker-archive`, `broker-callback`, `broker-events`) implements.

pub mod error;
pub mod model;
pub mod traits;

pub use error::DomainError;
pub use traits::{DiscoveryStore, EventPublisher, MetadataRepository, ModuleRegistrationProbe, SchemaArchiveClient};
