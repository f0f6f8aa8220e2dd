//! Schema archive client (C6): publishes and retrieves config schemas from
//! the external schema registry over HTTP.

pub mod artifact_id;
pub mod client;
pub mod config;
pub mod error;

pub use client::HttpSchemaArchiveClient;
pub use config::ArchiveConfig;
pub use error::ArchiveError;
