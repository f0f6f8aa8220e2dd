//! Artifact id derivation shared by every `create_or_update*` variant.

/// Sanitize a version string for embedding in an artifact id: replace `.`
/// with `_`. Blank input yields an empty string (callers substitute `"v1"`
/// themselves via [`version_segment`]).
#[must_use]
fn sanitize_version(version: &str) -> String {
    version.replace('.', "_")
}

/// The `"v{sanitized}"` segment of an artifact id, or the literal `"v1"`
/// when `version` is blank.
#[must_use]
pub fn version_segment(version: &str) -> String {
    if version.trim().is_empty() {
        "v1".to_string()
    } else {
        format!("v{}", sanitize_version(version))
    }
}

/// `"{artifact_base}-config-{version_segment}"`.
#[must_use]
pub fn derive_artifact_id(artifact_base: &str, version: &str) -> String {
    format!("{artifact_base}-config-{}", version_segment(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_id_from_dotted_version() {
        assert_eq!(derive_artifact_id("nodes-registry", "1.2.3"), "nodes-registry-config-v1_2_3");
    }

    #[test]
    fn blank_version_substitutes_v1() {
        assert_eq!(derive_artifact_id("nodes-registry", ""), "nodes-registry-config-v1");
        assert_eq!(derive_artifact_id("nodes-registry", "   "), "nodes-registry-config-v1");
    }

    #[test]
    fn http_schema_path_uses_http_suffixed_base() {
        let base = "nodes-registry-http";
        assert_eq!(derive_artifact_id(base, "2.0.0"), "nodes-registry-http-config-v2_0_0");
    }
}
