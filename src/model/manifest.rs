use serde_json::Value;

use crate::error::CleanupError;
use crate::model::Digest;

const OCI_MANIFEST_V1: &str = "application/vnd.oci.image.manifest.v1+json";
const OCI_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";
const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifestKind {
    OciImageManifestV1,
    OciImageIndexV1,
    DockerManifestV2,
    DockerManifestListV2,
}

impl ManifestKind {
    fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            OCI_MANIFEST_V1 => Some(Self::OciImageManifestV1),
            OCI_INDEX_V1 => Some(Self::OciImageIndexV1),
            DOCKER_MANIFEST_V2 => Some(Self::DockerManifestV2),
            DOCKER_MANIFEST_LIST_V2 => Some(Self::DockerManifestListV2),
            _ => None,
        }
    }
}

/// A reference to another manifest: a layer, an index entry, or a subject.
/// Unknown sibling fields are preserved in `extra` for round-tripping.
#[derive(Clone, Debug)]
pub struct ManifestRef {
    pub media_type: String,
    pub digest: Option<Digest>,
    pub extra: serde_json::Map<String, Value>,
}

/// A decoded manifest, tagged by `mediaType`. `raw` retains the full
/// original document so re-serialization (tag-deletion ghost rewrite)
/// preserves unknown fields exactly.
#[derive(Clone, Debug)]
pub struct Manifest {
    pub kind: ManifestKind,
    pub media_type: String,
    pub layers: Vec<ManifestRef>,
    pub manifests: Vec<ManifestRef>,
    pub subject: Option<ManifestRef>,
    pub raw: Value,
}

impl Manifest {
    /// A placeholder substituted when the registry reports `ManifestNotFound`
    /// for a version that still appears in the package listing. Carries no
    /// relationships and classifies as `unknown`.
    pub fn unknown_placeholder() -> Self {
        Manifest {
            kind: ManifestKind::OciImageManifestV1,
            media_type: "unknown/unknown".to_string(),
            layers: Vec::new(),
            manifests: Vec::new(),
            subject: None,
            raw: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn decode(text: &str) -> Result<Manifest, CleanupError> {
        let value: Value = serde_json::from_str(text).map_err(|source| CleanupError::InvalidJson {
            context: "manifest".to_string(),
            detail: source.to_string(),
        })?;

        let invalid = |detail: &str| CleanupError::InvalidJson {
            context: "manifest".to_string(),
            detail: detail.to_string(),
        };

        let obj = value.as_object().ok_or_else(|| invalid("top-level value is not an object"))?;

        let media_type = obj
            .get("mediaType")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing mediaType"))?;
        let kind = ManifestKind::from_media_type(media_type)
            .ok_or_else(|| invalid(&format!("unsupported mediaType: {media_type}")))?;

        let layers = parse_ref_array(obj.get("layers"))?;
        let manifests = parse_ref_array(obj.get("manifests"))?;
        let subject = obj.get("subject").filter(|v| !v.is_null()).map(parse_ref).transpose()?;

        Ok(Manifest {
            kind,
            media_type: media_type.to_string(),
            layers,
            manifests,
            subject,
            raw: value,
        })
    }

    /// Clones this manifest and detaches it from everything it pointed at,
    /// per the tag-deletion ghost-manifest protocol (§4.8): the `manifests`
    /// array is cleared if non-empty, else `layers` is cleared.
    pub fn as_ghost(&self) -> Manifest {
        let mut ghost = self.clone();
        if !ghost.manifests.is_empty() {
            ghost.manifests.clear();
            if let Some(obj) = ghost.raw.as_object_mut() {
                obj.insert("manifests".to_string(), Value::Array(Vec::new()));
            }
        } else {
            ghost.layers.clear();
            if let Some(obj) = ghost.raw.as_object_mut() {
                obj.insert("layers".to_string(), Value::Array(Vec::new()));
            }
        }
        ghost
    }
}

fn parse_ref_array(value: Option<&Value>) -> Result<Vec<ManifestRef>, CleanupError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(parse_ref).collect(),
        Some(_) => Err(CleanupError::InvalidJson {
            context: "manifest".to_string(),
            detail: "expected an array of manifest refs".to_string(),
        }),
    }
}

fn parse_ref(value: &Value) -> Result<ManifestRef, CleanupError> {
    let obj = value.as_object().ok_or_else(|| CleanupError::InvalidJson {
        context: "manifest".to_string(),
        detail: "manifest ref is not an object".to_string(),
    })?;

    let media_type = obj
        .get("mediaType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let digest = match obj.get("digest") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(Digest::new(raw.clone())),
        Some(_) => {
            return Err(CleanupError::InvalidJson {
                context: "manifest".to_string(),
                detail: "digest field is not a string".to_string(),
            });
        }
    };

    let mut extra = obj.clone();
    extra.remove("mediaType");
    extra.remove("digest");

    Ok(ManifestRef {
        media_type,
        digest,
        extra,
    })
}
