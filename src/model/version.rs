use serde_json::Value;

use crate::error::CleanupError;
use crate::model::manifest::Manifest;
use crate::model::{ArtifactType, Digest};

/// A single entry in a GitHub package repository: ingest fields plus the
/// derived forest-node fields (`parent`, `children`, `artifact_type`), which
/// collapse onto Version rather than a separate Node type.
#[derive(Clone, Debug)]
pub struct Version {
    pub id: i32,
    pub name: Digest,
    pub url: String,
    pub package_html_url: String,
    pub html_url: String,
    pub created_at: String,
    pub updated_at: String,
    pub tags: Vec<String>,
    pub manifest: Manifest,

    pub parent: Option<Digest>,
    pub children: Vec<Digest>,
    pub artifact_type: ArtifactType,
}

impl Version {
    /// Decodes the package-version envelope (everything the GitHub Packages
    /// API returns except the manifest body, which is fetched separately
    /// through the registry gateway and supplied by the caller).
    pub fn decode(text: &str, manifest: Manifest) -> Result<Version, CleanupError> {
        let value: Value = serde_json::from_str(text).map_err(|source| CleanupError::InvalidJson {
            context: "version".to_string(),
            detail: source.to_string(),
        })?;

        let invalid = |detail: &str| CleanupError::InvalidJson {
            context: "version".to_string(),
            detail: detail.to_string(),
        };

        let obj = value.as_object().ok_or_else(|| invalid("top-level value is not an object"))?;

        let id = obj
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("id is missing or not an integer"))?;
        let id = i32::try_from(id).map_err(|_| invalid("id does not fit in a signed 32-bit integer"))?;

        let name = require_str(obj, "name", &invalid)?;
        let url = require_str(obj, "url", &invalid)?;
        let package_html_url = require_str(obj, "package_html_url", &invalid)?;
        let html_url = require_str(obj, "html_url", &invalid)?;
        let created_at = require_str(obj, "created_at", &invalid)?;
        let updated_at = require_str(obj, "updated_at", &invalid)?;

        let metadata = obj
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("metadata is missing or not an object"))?;
        let _package_type = metadata
            .get("package_type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("metadata.package_type is missing or not a string"))?;

        let container = metadata
            .get("container")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("metadata.container is missing or not an object"))?;
        let tags_value = container
            .get("tags")
            .ok_or_else(|| invalid("metadata.container.tags is missing"))?;
        let tags = tags_value
            .as_array()
            .ok_or_else(|| invalid("metadata.container.tags is not an array"))?
            .iter()
            .map(|t| {
                t.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("metadata.container.tags contains a non-string element"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Version {
            id,
            name: Digest::new(name),
            url,
            package_html_url,
            html_url,
            created_at,
            updated_at,
            tags,
            manifest,
            parent: None,
            children: Vec::new(),
            artifact_type: ArtifactType::Unknown,
        })
    }
}

fn require_str(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
    invalid: &impl Fn(&str) -> CleanupError,
) -> Result<String, CleanupError> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid(&format!("{field} is missing or not a string")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tags: &str) -> String {
        format!(
            r#"{{
                "id": 42,
                "name": "sha256:aaaa",
                "url": "https://api.github.com/x",
                "package_html_url": "https://github.com/x/packages/y",
                "html_url": "https://github.com/x/packages/y/42",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-02T00:00:00Z",
                "metadata": {{
                    "package_type": "container",
                    "container": {{ "tags": {tags} }}
                }}
            }}"#
        )
    }

    #[test]
    fn decodes_valid_envelope() {
        let version = Version::decode(&sample(r#"["v1", "latest"]"#), Manifest::unknown_placeholder())
            .expect("decode");
        assert_eq!(version.id, 42);
        assert_eq!(version.name.as_str(), "sha256:aaaa");
        assert_eq!(version.tags, vec!["v1".to_string(), "latest".to_string()]);
    }

    #[test]
    fn rejects_float_id() {
        let text = sample("[]").replace("\"id\": 42", "\"id\": 42.5");
        assert!(Version::decode(&text, Manifest::unknown_placeholder()).is_err());
    }

    #[test]
    fn rejects_non_array_tags() {
        let text = sample("null");
        assert!(Version::decode(&text, Manifest::unknown_placeholder()).is_err());
    }

    #[test]
    fn accepts_empty_tags() {
        let version = Version::decode(&sample("[]"), Manifest::unknown_placeholder()).expect("decode");
        assert!(version.tags.is_empty());
    }
}
