use std::collections::BTreeMap;

use crate::error::CleanupError;
use crate::forest::KeyIndex;
use crate::model::{ArtifactType, Digest, Version};

const IN_TOTO_MEDIA_TYPE: &str = "application/vnd.in-toto+json";

/// Pass 1 — index→manifest children. Distinct parents are permitted to
/// share a child: two tags whose multi-arch indices both reference an
/// identical per-platform build are common in real repositories, so this
/// pass does not enforce single ownership (see `link_shared`).
pub fn pass1_manifest_children(
    versions: &BTreeMap<Digest, Version>,
    index: &KeyIndex,
) -> Vec<(Digest, Digest)> {
    let mut edges = Vec::new();
    for (parent_digest, version) in versions {
        for child_ref in &version.manifest.manifests {
            let Some(digest) = &child_ref.digest else {
                continue;
            };
            if let Some(child_digest) = index.resolve(versions, digest.as_str())
                && &child_digest != parent_digest
            {
                edges.push((parent_digest.clone(), child_digest));
            }
        }
    }
    edges
}

/// Pass 2 — referrer→subject via OCI 1.1 `subject`. `v` becomes a child of
/// the version its `subject` points at.
pub fn pass2_referrer_subject(
    versions: &BTreeMap<Digest, Version>,
    index: &KeyIndex,
) -> Vec<(Digest, Digest)> {
    let mut edges = Vec::new();
    for (child_digest, version) in versions {
        let Some(subject) = &version.manifest.subject else {
            continue;
        };
        let Some(digest) = &subject.digest else {
            continue;
        };
        if let Some(parent_digest) = index.resolve(versions, digest.as_str())
            && &parent_digest != child_digest
        {
            edges.push((parent_digest, child_digest.clone()));
        }
    }
    edges
}

/// Pass 3 — referrer→subject via the OCI 1.0 `sha256-<hex>` tag fallback.
pub fn pass3_referrer_tag(
    versions: &BTreeMap<Digest, Version>,
    index: &KeyIndex,
) -> Vec<(Digest, Digest)> {
    let mut edges = Vec::new();
    for (child_digest, version) in versions {
        for tag in &version.tags {
            let Some(transformed) = Digest::from_referrer_tag(tag) else {
                continue;
            };
            if let Some(parent_digest) = index.resolve(versions, transformed.as_str())
                && &parent_digest != child_digest
            {
                edges.push((parent_digest, child_digest.clone()));
            }
        }
    }
    edges
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkMode {
    /// Multiple parents may claim the same child (pass 1 shared per-platform
    /// builds). The child's `parent` field records the first owner only.
    AllowSharedChildren,
    /// A child already claimed by an earlier pass with a different parent
    /// is a `GraphInconsistency` (pass 2 / pass 3 should never collide with
    /// pass 1 in a well-formed repository).
    Strict,
}

pub fn apply_edges(
    versions: &mut BTreeMap<Digest, Version>,
    edges: &[(Digest, Digest)],
    mode: LinkMode,
) -> Result<(), CleanupError> {
    for (parent, child) in edges {
        match mode {
            LinkMode::AllowSharedChildren => link_shared(versions, parent, child),
            LinkMode::Strict => link_strict(versions, parent, child)?,
        }
    }
    Ok(())
}

fn link_shared(versions: &mut BTreeMap<Digest, Version>, parent: &Digest, child: &Digest) {
    if let Some(p) = versions.get_mut(parent)
        && !p.children.iter().any(|c| c == child)
    {
        p.children.push(child.clone());
    }
    if let Some(c) = versions.get_mut(child)
        && c.parent.is_none()
    {
        c.parent = Some(parent.clone());
    }
}

fn link_strict(
    versions: &mut BTreeMap<Digest, Version>,
    parent: &Digest,
    child: &Digest,
) -> Result<(), CleanupError> {
    if let Some(existing) = versions.get(child).and_then(|v| v.parent.clone()) {
        if &existing != parent {
            return Err(CleanupError::GraphInconsistency {
                detail: format!("{child} already linked to {existing}, cannot also link to {parent}"),
            });
        }
        return Ok(());
    }

    if let Some(p) = versions.get_mut(parent)
        && !p.children.iter().any(|c| c == child)
    {
        p.children.push(child.clone());
    }
    if let Some(c) = versions.get_mut(child) {
        c.parent = Some(parent.clone());
    }
    Ok(())
}

/// Artifact-type classification, run after all three passes. Attestation
/// checks precede single/multi checks so attestations carrying layers are
/// not mis-classified as single-arch images.
pub fn classify(versions: &mut BTreeMap<Digest, Version>) {
    for version in versions.values_mut() {
        version.artifact_type = classify_one(version);
    }
}

fn classify_one(version: &Version) -> ArtifactType {
    let manifest = &version.manifest;

    let all_in_toto = !manifest.layers.is_empty()
        && manifest.layers.iter().all(|l| l.media_type == IN_TOTO_MEDIA_TYPE);
    if all_in_toto {
        return ArtifactType::Attestation;
    }

    if manifest.subject.is_some() {
        return ArtifactType::Attestation;
    }

    if version.tags.iter().any(|t| is_referrer_tag_shape(t)) {
        return ArtifactType::Attestation;
    }

    if !manifest.layers.is_empty() {
        return ArtifactType::SingleArchImage;
    }

    if !manifest.manifests.is_empty() {
        return ArtifactType::MultiArchImage;
    }

    ArtifactType::Unknown
}

fn is_referrer_tag_shape(tag: &str) -> bool {
    match tag.strip_prefix("sha256-") {
        Some(hex) => hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referrer_tag_shape_requires_64_lowercase_hex() {
        assert!(is_referrer_tag_shape(&format!("sha256-{}", "a".repeat(64))));
        assert!(!is_referrer_tag_shape(&format!("sha256-{}", "A".repeat(64))));
        assert!(!is_referrer_tag_shape("sha256-short"));
        assert!(!is_referrer_tag_shape("v1"));
    }
}
