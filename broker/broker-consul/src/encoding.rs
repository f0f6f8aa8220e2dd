//! Flat string-map encoding of structured registration fields, and its
//! inverse on read-back. Third-party readers of the discovery store depend
//! on this exact key layout, so it is kept in one place and tested in
//! isolation from the network client.

use std::collections::{BTreeMap, BTreeSet};

use broker_contracts::model::{CatalogEntry, HttpEndpoint, RegisterRequest, desanitize_dots, sanitize_dots};

const MODULE_TAG: &str = "module";
const CAPABILITY_TAG_PREFIX: &str = "capability:";

/// Build the tag set for a registration: the request's own tags, one
/// `"capability:"`-prefixed tag per capability, and `"module"` when the
/// registrant is a module.
#[must_use]
pub fn build_tags(request: &RegisterRequest) -> Vec<String> {
    let mut tags: Vec<String> = request.tags.iter().cloned().collect();
    tags.extend(request.capabilities.iter().map(|c| format!("{CAPABILITY_TAG_PREFIX}{c}")));
    if matches!(request.kind, broker_contracts::model::RegistrantKind::Module) {
        tags.push(MODULE_TAG.to_string());
    }
    tags
}

/// Build the sanitized flat metadata map for a registration.
#[must_use]
pub fn build_meta(request: &RegisterRequest) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    meta.insert("advertised-host".to_string(), request.connectivity.advertised_host.clone());
    meta.insert("advertised-port".to_string(), request.connectivity.advertised_port.to_string());
    meta.insert("version".to_string(), request.version.clone());
    meta.insert("service-type".to_string(), request.kind.as_str().to_string());

    meta.insert("http_endpoint_count".to_string(), request.http_endpoints.len().to_string());
    for (i, ep) in request.http_endpoints.iter().enumerate() {
        meta.insert(format!("http_endpoint_{i}_scheme"), ep.scheme.clone());
        meta.insert(format!("http_endpoint_{i}_host"), ep.host.clone());
        meta.insert(format!("http_endpoint_{i}_port"), ep.port.to_string());
        if !ep.base_path.is_empty() {
            meta.insert(format!("http_endpoint_{i}_base_path"), ep.base_path.clone());
        }
        if !ep.health_path.is_empty() {
            meta.insert(format!("http_endpoint_{i}_health_path"), ep.health_path.clone());
        }
        meta.insert(format!("http_endpoint_{i}_tls_enabled"), ep.tls_enabled.to_string());
    }

    if let Some(artifact_id) = &request.http_schema_artifact_id {
        meta.insert("http_schema_artifact_id".to_string(), artifact_id.clone());
    }
    if let Some(schema_version) = &request.http_schema_version {
        meta.insert("http_schema_version".to_string(), schema_version.clone());
    }

    for (key, value) in &request.metadata {
        meta.insert(sanitize_dots(key), value.clone());
    }

    // Sanitize keys last: user-supplied metadata keys might collide with the
    // synthesized keys above after sanitization, but the synthesized keys
    // are already dot-free so this only rewrites user keys.
    meta.into_iter().map(|(k, v)| (sanitize_dots(&k), v)).collect()
}

/// Reconstruct a [`CatalogEntry`] from a discovery-store record's id, name,
/// address, port, tags and flat metadata.
#[must_use]
pub fn decode_catalog_entry(
    service_id: &str,
    name: &str,
    address: &str,
    port: u16,
    tags: &[String],
    meta: &BTreeMap<String, String>,
    healthy: bool,
) -> CatalogEntry {
    // Structural keys (the ones this module itself synthesizes) are read by
    // their literal names straight out of `meta`: they never had dots to
    // begin with, and desanitizing them would corrupt the underscores that
    // are part of their names (`http_endpoint_count`,
    // `http_endpoint_{i}_scheme`, ...). Dot-desanitization is only valid for
    // user-supplied metadata keys, applied below when `metadata` is built.
    let host = meta.get("advertised-host").cloned().unwrap_or_else(|| address.to_string());
    let resolved_port = meta
        .get("advertised-port")
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(port);

    let is_module = tags.iter().any(|t| t == MODULE_TAG);
    let capabilities: BTreeSet<String> = tags
        .iter()
        .filter_map(|t| t.strip_prefix(CAPABILITY_TAG_PREFIX).map(str::to_string))
        .collect();
    let plain_tags: BTreeSet<String> = tags
        .iter()
        .filter(|t| *t != MODULE_TAG && !t.starts_with(CAPABILITY_TAG_PREFIX))
        .cloned()
        .collect();

    let endpoint_count: usize = meta.get("http_endpoint_count").and_then(|n| n.parse().ok()).unwrap_or(0);
    let mut http_endpoints = Vec::with_capacity(endpoint_count);
    for i in 0..endpoint_count {
        let Some(scheme) = meta.get(&format!("http_endpoint_{i}_scheme")) else {
            continue;
        };
        let Some(ep_host) = meta.get(&format!("http_endpoint_{i}_host")) else {
            continue;
        };
        let ep_port = meta
            .get(&format!("http_endpoint_{i}_port"))
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(0);
        let base_path = meta.get(&format!("http_endpoint_{i}_base_path")).cloned().unwrap_or_default();
        let health_path = meta.get(&format!("http_endpoint_{i}_health_path")).cloned().unwrap_or_default();
        let tls_enabled = meta
            .get(&format!("http_endpoint_{i}_tls_enabled"))
            .is_some_and(|v| v == "true");
        http_endpoints.push(HttpEndpoint {
            scheme: scheme.clone(),
            host: ep_host.clone(),
            port: ep_port,
            base_path,
            health_path,
            tls_enabled,
        });
    }

    // Everything left over is user-supplied metadata: only these keys were
    // ever dot-sanitized on write (see `build_meta`), so only these are
    // desanitized on read.
    let known_keys = known_meta_keys(endpoint_count);
    let metadata: BTreeMap<String, String> = meta
        .iter()
        .filter(|(k, _)| !known_keys.contains(k.as_str()))
        .map(|(k, v)| (desanitize_dots(k), v.clone()))
        .collect();

    CatalogEntry {
        service_id: service_id.to_string(),
        name: name.to_string(),
        host,
        port: resolved_port,
        version: meta.get("version").cloned(),
        tags: plain_tags,
        capabilities,
        http_endpoints,
        http_schema_artifact_id: meta.get("http_schema_artifact_id").cloned(),
        http_schema_version: meta.get("http_schema_version").cloned(),
        metadata,
        is_module,
        healthy,
    }
}

fn known_meta_keys(endpoint_count: usize) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = [
        "advertised-host",
        "advertised-port",
        "version",
        "service-type",
        "http_endpoint_count",
        "http_schema_artifact_id",
        "http_schema_version",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    for i in 0..endpoint_count {
        keys.insert(format!("http_endpoint_{i}_scheme"));
        keys.insert(format!("http_endpoint_{i}_host"));
        keys.insert(format!("http_endpoint_{i}_port"));
        keys.insert(format!("http_endpoint_{i}_base_path"));
        keys.insert(format!("http_endpoint_{i}_health_path"));
        keys.insert(format!("http_endpoint_{i}_tls_enabled"));
    }
    keys
}

/// A health check to register alongside a service. Either HTTP-based
/// (preferred, when at least one HTTP endpoint is declared) or gRPC-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckSpec {
    Http { url: String },
    Grpc { target: String },
}

/// Derive the health check for a registration per the HTTP-first rule: use
/// the first declared HTTP endpoint if any, else fall back to a gRPC check
/// against the internal (or advertised) host/port.
#[must_use]
pub fn build_health_check(request: &RegisterRequest) -> HealthCheckSpec {
    if let Some(ep) = request.http_endpoints.first() {
        let url = format!("{}://{}:{}{}", ep.scheme, ep.host, ep.port, ep.health_path);
        return HealthCheckSpec::Http { url };
    }
    let (host, port) = request.connectivity.probe_host_port();
    HealthCheckSpec::Grpc { target: format!("{host}:{port}") }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use broker_contracts::model::Connectivity;

    use super::*;

    fn sample_request() -> RegisterRequest {
        RegisterRequest {
            name: "nodes-registry".to_string(),
            kind: broker_contracts::model::RegistrantKind::Service,
            connectivity: Connectivity {
                advertised_host: "10.0.0.5".to_string(),
                advertised_port: 8080,
                internal_host: None,
                internal_port: None,
                tls_enabled: false,
            },
            version: "1.2.3".to_string(),
            metadata: BTreeMap::new(),
            tags: ["team:platform".to_string()].into_iter().collect(),
            capabilities: ["search".to_string()].into_iter().collect(),
            http_endpoints: vec![HttpEndpoint {
                scheme: "http".to_string(),
                host: "10.0.0.5".to_string(),
                port: 8080,
                base_path: String::new(),
                health_path: "/healthz".to_string(),
                tls_enabled: false,
            }],
            http_schema: None,
            http_schema_artifact_id: None,
            http_schema_version: None,
        }
    }

    #[test]
    fn tags_include_capability_prefix() {
        let tags = build_tags(&sample_request());
        assert!(tags.contains(&"capability:search".to_string()));
        assert!(tags.contains(&"team:platform".to_string()));
        assert!(!tags.contains(&"module".to_string()));
    }

    #[test]
    fn module_kind_adds_module_tag() {
        let mut req = sample_request();
        req.kind = broker_contracts::model::RegistrantKind::Module;
        let tags = build_tags(&req);
        assert!(tags.contains(&"module".to_string()));
    }

    #[test]
    fn meta_writes_version_verbatim() {
        let meta = build_meta(&sample_request());
        assert_eq!(meta.get("version").map(String::as_str), Some("1.2.3"));
    }

    #[test]
    fn meta_writes_http_schema_version_verbatim() {
        let mut req = sample_request();
        req.http_schema_version = Some("v1_beta".to_string());
        let meta = build_meta(&req);
        assert_eq!(meta.get("http_schema_version").map(String::as_str), Some("v1_beta"));
    }

    #[test]
    fn meta_encodes_single_http_endpoint_flat() {
        let meta = build_meta(&sample_request());
        assert_eq!(meta.get("http_endpoint_count").map(String::as_str), Some("1"));
        assert_eq!(meta.get("http_endpoint_0_scheme").map(String::as_str), Some("http"));
        assert_eq!(meta.get("http_endpoint_0_health_path").map(String::as_str), Some("/healthz"));
        assert!(!meta.contains_key("http_endpoint_0_base_path"));
    }

    #[test]
    fn health_check_prefers_http_when_endpoint_present() {
        let spec = build_health_check(&sample_request());
        assert_eq!(spec, HealthCheckSpec::Http { url: "http://10.0.0.5:8080/healthz".to_string() });
    }

    #[test]
    fn health_check_falls_back_to_grpc_without_endpoints() {
        let mut req = sample_request();
        req.http_endpoints.clear();
        req.connectivity.internal_host = Some("10.1.1.1".to_string());
        req.connectivity.internal_port = Some(9090);
        let spec = build_health_check(&req);
        assert_eq!(spec, HealthCheckSpec::Grpc { target: "10.1.1.1:9090".to_string() });
    }

    #[test]
    fn decode_round_trips_encoded_entry() {
        let request = sample_request();
        let meta = build_meta(&request);
        let tags = build_tags(&request);
        let entry = decode_catalog_entry("nodes-registry-10.0.0.5-8080", &request.name, "10.0.0.5", 8080, &tags, &meta, true);

        assert_eq!(entry.host, "10.0.0.5");
        assert_eq!(entry.port, 8080);
        assert_eq!(entry.version.as_deref(), Some("1.2.3"));
        assert!(entry.capabilities.contains("search"));
        assert!(!entry.is_module);
        assert_eq!(entry.http_endpoints.len(), 1);
        assert_eq!(entry.http_endpoints[0].health_path, "/healthz");
        assert_eq!(entry.tags, BTreeSet::from(["team:platform".to_string()]));
    }

    #[test]
    fn decode_reconstructs_multiple_endpoints_despite_their_underscored_keys() {
        let mut request = sample_request();
        request.http_endpoints.push(HttpEndpoint {
            scheme: "https".to_string(),
            host: "10.0.0.6".to_string(),
            port: 8443,
            base_path: "/api".to_string(),
            health_path: "/healthz".to_string(),
            tls_enabled: true,
        });
        let meta = build_meta(&request);
        let tags = build_tags(&request);
        let entry = decode_catalog_entry("nodes-registry-10.0.0.5-8080", &request.name, "10.0.0.5", 8080, &tags, &meta, true);

        assert_eq!(entry.http_endpoints.len(), 2, "structural http_endpoint_* keys must not be dot-desanitized away");
        assert_eq!(entry.http_endpoints[1].host, "10.0.0.6");
        assert_eq!(entry.http_endpoints[1].base_path, "/api");
        assert!(entry.http_endpoints[1].tls_enabled);
    }

    #[test]
    fn decode_preserves_underscores_natively_present_in_version() {
        let mut request = sample_request();
        request.version = "v1_beta".to_string();
        request.http_schema_version = Some("v2_beta".to_string());
        let meta = build_meta(&request);
        let tags = build_tags(&request);
        let entry = decode_catalog_entry("nodes-registry-10.0.0.5-8080", &request.name, "10.0.0.5", 8080, &tags, &meta, true);

        assert_eq!(entry.version.as_deref(), Some("v1_beta"));
        assert_eq!(entry.http_schema_version.as_deref(), Some("v2_beta"));
    }

    #[test]
    fn decode_desanitizes_only_user_supplied_metadata_keys() {
        let mut request = sample_request();
        request.metadata.insert("region.zone".to_string(), "us-east-1a".to_string());
        let meta = build_meta(&request);
        let tags = build_tags(&request);
        let entry = decode_catalog_entry("nodes-registry-10.0.0.5-8080", &request.name, "10.0.0.5", 8080, &tags, &meta, true);

        assert_eq!(entry.metadata.get("region.zone").map(String::as_str), Some("us-east-1a"));
        assert!(!entry.metadata.contains_key("http_endpoint_count"), "structural keys must not leak into user metadata");
    }
}
