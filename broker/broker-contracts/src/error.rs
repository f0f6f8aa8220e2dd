//! Layered error types for the registration broker's domain.

use thiserror::Error;

/// Errors surfaced by the coordinator and discovery-query domain services.
///
/// Adapter-specific errors (`ConsulError`, `DbError`, `ArchiveError`,
/// `CallbackError`) convert into this enum via `From` impls defined in their
/// own crates, following the same collapsing pattern the adapters use
/// internally.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("registrant {name:?} not found")]
    NotFound { name: String },

    #[error("service id {service_id:?} not found")]
    ServiceNotFound { service_id: String },

    #[error("module {name:?} not found")]
    ModuleNotFound { name: String },

    #[error("schema for module {name:?} not found")]
    SchemaNotFound {
        name: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("invalid registration request: {reason}")]
    InvalidRequest { reason: String },

    #[error("{field} already registered with a different owner")]
    Conflict { field: String },

    #[error("discovery store unavailable: {0}")]
    DiscoveryStoreUnavailable(String),

    #[error("metadata repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("module callback failed: {0}")]
    CallbackFailed(String),

    #[error("schema archive unavailable: {0}")]
    ArchiveUnavailable(String),

    #[error("registration timed out after {stage}")]
    Timeout { stage: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    /// Whether this error should be reported to callers as
    /// `tonic::Code::NotFound` rather than `Internal`/`Unavailable`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::ServiceNotFound { .. }
                | Self::ModuleNotFound { .. }
                | Self::SchemaNotFound { .. }
        )
    }
}
