mod manifest;
mod version;

pub use manifest::{Manifest, ManifestKind, ManifestRef};
pub use version::Version;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Digest(pub String);

impl Digest {
    pub fn new(raw: impl Into<String>) -> Self {
        Digest(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `sha256-<hex>` referrer tag shape, transformed into `sha256:<hex>` by
    /// replacing the first `-` with `:`.
    pub fn from_referrer_tag(tag: &str) -> Option<Digest> {
        let idx = tag.find('-')?;
        let mut transformed = String::with_capacity(tag.len());
        transformed.push_str(&tag[..idx]);
        transformed.push(':');
        transformed.push_str(&tag[idx + 1..]);
        Some(Digest(transformed))
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactType {
    MultiArchImage,
    SingleArchImage,
    Attestation,
    Unknown,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultiArchImage => "multi-arch image",
            Self::SingleArchImage => "single-arch image",
            Self::Attestation => "attestation",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referrer_tag_replaces_first_dash_only() {
        let digest = Digest::from_referrer_tag("sha256-aaaa-bbbb").expect("digest");
        assert_eq!(digest.as_str(), "sha256:aaaa-bbbb");
    }

    #[test]
    fn referrer_tag_without_dash_is_none() {
        assert!(Digest::from_referrer_tag("v1").is_none());
    }
}
