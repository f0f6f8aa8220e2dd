//! The archive client's own typed error, before it is folded into
//! `DomainError::ArchiveUnavailable` at the trait boundary.

use thiserror::Error;

/// Every failure mode the schema archive client can hit: transport,
/// authentication, not-found, conflict, or response (de)serialization.
#[derive(Debug, Error)]
#[error("schema archive error (service={service_name:?}, artifact={artifact_id:?}): {cause}")]
pub struct ArchiveError {
    pub service_name: Option<String>,
    pub artifact_id: Option<String>,
    pub cause: String,
}

impl ArchiveError {
    #[must_use]
    pub fn for_service(service_name: impl Into<String>, cause: impl Into<String>) -> Self {
        Self { service_name: Some(service_name.into()), artifact_id: None, cause: cause.into() }
    }

    #[must_use]
    pub fn for_artifact(artifact_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self { service_name: None, artifact_id: Some(artifact_id.into()), cause: cause.into() }
    }
}

impl From<ArchiveError> for broker_contracts::error::DomainError {
    fn from(e: ArchiveError) -> Self {
        Self::ArchiveUnavailable(e.to_string())
    }
}
