//! Production `SchemaArchiveClient` implementation over a schema-registry
//! style HTTP API.

use async_trait::async_trait;
use broker_contracts::error::DomainError;
use broker_contracts::model::ArtifactMetadata;
use broker_contracts::traits::SchemaArchiveClient;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::artifact_id::derive_artifact_id;
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;

/// Talks to the external schema archive over its artifact-versions REST
/// API. Transport, auth, not-found, conflict and serialization failures are
/// all folded into [`ArchiveError`] before crossing the trait boundary.
pub struct HttpSchemaArchiveClient {
    http: Client,
    cfg: ArchiveConfig,
}

impl HttpSchemaArchiveClient {
    /// # Errors
    /// Returns an error if the underlying `reqwest` client cannot be built.
    pub fn new(cfg: ArchiveConfig) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(cfg.request_timeout).build()?;
        Ok(Self { http, cfg })
    }

    fn artifact_url(&self, artifact_id: &str) -> String {
        format!("{}/artifacts/{artifact_id}/versions", self.cfg.base_url)
    }

    fn version_url(&self, artifact_id: &str, version: &str) -> String {
        format!("{}/artifacts/{artifact_id}/versions/{version}", self.cfg.base_url)
    }

    fn meta_url(&self, artifact_id: &str) -> String {
        format!("{}/artifacts/{artifact_id}/meta", self.cfg.base_url)
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.cfg.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn put_version(
        &self,
        artifact_id: &str,
        version: &str,
        json_schema: &serde_json::Value,
    ) -> Result<ArtifactMetadata, ArchiveError> {
        let body = CreateVersionBody { content: json_schema.clone(), version: version.to_string() };
        let request = self.apply_auth(self.http.put(self.artifact_url(artifact_id)).json(&body));

        let response = request
            .send()
            .await
            .map_err(|e| ArchiveError::for_artifact(artifact_id, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ArchiveError::for_artifact(
                artifact_id,
                format!("archive responded with {}", response.status()),
            ));
        }

        let parsed: VersionMetadataWire = response
            .json()
            .await
            .map_err(|e| ArchiveError::for_artifact(artifact_id, format!("invalid response body: {e}")))?;

        Ok(ArtifactMetadata {
            artifact_id: artifact_id.to_string(),
            global_id: parsed.global_id,
            version: parsed.version,
            created_at: None,
        })
    }

    async fn get_version(
        &self,
        artifact_id: &str,
        version: Option<&str>,
    ) -> Result<Option<serde_json::Value>, ArchiveError> {
        let resolved_version = version.filter(|v| !v.is_empty()).unwrap_or("latest");
        let request = self.apply_auth(self.http.get(self.version_url(artifact_id, resolved_version)));

        let response = request
            .send()
            .await
            .map_err(|e| ArchiveError::for_artifact(artifact_id, format!("request failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ArchiveError::for_artifact(
                artifact_id,
                format!("archive responded with {}", response.status()),
            ));
        }

        let schema = response
            .json()
            .await
            .map_err(|e| ArchiveError::for_artifact(artifact_id, format!("invalid response body: {e}")))?;
        Ok(Some(schema))
    }
}

#[derive(Debug, Serialize)]
struct CreateVersionBody {
    content: serde_json::Value,
    version: String,
}

#[derive(Debug, Deserialize)]
struct VersionMetadataWire {
    #[serde(rename = "globalId")]
    global_id: Option<i64>,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ArtifactMetaWire {
    #[serde(rename = "globalId")]
    global_id: Option<i64>,
    version: String,
    #[serde(rename = "createdOn")]
    created_on: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
impl SchemaArchiveClient for HttpSchemaArchiveClient {
    async fn create_or_update(
        &self,
        service_name: &str,
        version: &str,
        json_schema: &serde_json::Value,
    ) -> Result<ArtifactMetadata, DomainError> {
        self.create_or_update_with_artifact_base(service_name, version, json_schema).await
    }

    async fn create_or_update_with_artifact_base(
        &self,
        artifact_base: &str,
        version: &str,
        json_schema: &serde_json::Value,
    ) -> Result<ArtifactMetadata, DomainError> {
        let artifact_id = derive_artifact_id(artifact_base, version);
        self.put_version(&artifact_id, version, json_schema).await.map_err(Into::into)
    }

    async fn create_or_update_with_artifact_id(
        &self,
        artifact_id: &str,
        version: &str,
        json_schema: &serde_json::Value,
    ) -> Result<ArtifactMetadata, DomainError> {
        self.put_version(artifact_id, version, json_schema).await.map_err(Into::into)
    }

    async fn get_schema_by_name(
        &self,
        service_name: &str,
        version: Option<&str>,
    ) -> Result<Option<serde_json::Value>, DomainError> {
        let artifact_id = derive_artifact_id(service_name, version.unwrap_or_default());
        self.get_version(&artifact_id, version).await.map_err(Into::into)
    }

    async fn get_schema_by_artifact_id(
        &self,
        artifact_id: &str,
        version: Option<&str>,
    ) -> Result<Option<serde_json::Value>, DomainError> {
        self.get_version(artifact_id, version).await.map_err(Into::into)
    }

    async fn get_artifact_metadata(&self, service_name: &str) -> Result<Option<ArtifactMetadata>, DomainError> {
        let artifact_id = derive_artifact_id(service_name, "");
        let request = self.apply_auth(self.http.get(self.meta_url(&artifact_id)));

        let response = request
            .send()
            .await
            .map_err(|e| ArchiveError::for_service(service_name, format!("request failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ArchiveError::for_service(
                service_name,
                format!("archive responded with {}", response.status()),
            )
            .into());
        }

        let parsed: ArtifactMetaWire = response
            .json()
            .await
            .map_err(|e| ArchiveError::for_service(service_name, format!("invalid response body: {e}")))?;

        Ok(Some(ArtifactMetadata {
            artifact_id,
            global_id: parsed.global_id,
            version: parsed.version,
            created_at: parsed.created_on,
        }))
    }

    async fn is_healthy(&self) -> bool {
        self.http.get(format!("{}/system/info", self.cfg.base_url)).send().await.is_ok_and(|r| r.status().is_success())
    }
}
