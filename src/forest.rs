use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::CleanupError;
use crate::model::{Digest, Version};
use crate::resolver::{self, LinkMode};

/// Resolves any of {digest, numeric id, tag} to the unique version that
/// owns it. Digests resolve directly against the version map; `by_tag` and
/// `by_id` cover the other two key shapes.
pub struct KeyIndex {
    by_tag: HashMap<String, Digest>,
    by_id: HashMap<i32, Digest>,
}

impl KeyIndex {
    fn build(versions: &BTreeMap<Digest, Version>) -> Self {
        let mut by_tag = HashMap::new();
        let mut by_id = HashMap::new();

        for (digest, version) in versions {
            for tag in &version.tags {
                by_tag.insert(tag.clone(), digest.clone());
            }
            by_id.insert(version.id, digest.clone());
        }

        KeyIndex { by_tag, by_id }
    }

    pub fn resolve(&self, versions: &BTreeMap<Digest, Version>, key: &str) -> Option<Digest> {
        let digest = Digest::new(key);
        if versions.contains_key(&digest) {
            return Some(digest);
        }
        if let Some(d) = self.by_tag.get(key) {
            return Some(d.clone());
        }
        if let Ok(id) = key.parse::<i32>()
            && let Some(d) = self.by_id.get(&id)
        {
            return Some(d.clone());
        }
        None
    }

    pub fn resolve_tag(&self, tag: &str) -> Option<&Digest> {
        self.by_tag.get(tag)
    }

    /// Removes a tag from the index after it's been stripped from its
    /// owning version's in-memory tag list, keeping `resolve`/`resolve_tag`
    /// consistent until the next `Forest::build` rebuild.
    pub fn remove_tag(&mut self, tag: &str) {
        self.by_tag.remove(tag);
    }
}

/// The full version set plus its derived root set and key index. Pure
/// construction: same input versions always yield the same forest.
pub struct Forest {
    pub versions: BTreeMap<Digest, Version>,
    pub roots: BTreeSet<Digest>,
    pub index: KeyIndex,
}

impl Forest {
    pub fn build(mut versions: BTreeMap<Digest, Version>) -> Result<Forest, CleanupError> {
        for version in versions.values_mut() {
            version.parent = None;
            version.children.clear();
            version.artifact_type = crate::model::ArtifactType::Unknown;
        }

        let index = KeyIndex::build(&versions);

        let pass1 = resolver::pass1_manifest_children(&versions, &index);
        resolver::apply_edges(&mut versions, &pass1, LinkMode::AllowSharedChildren)?;

        let pass2 = resolver::pass2_referrer_subject(&versions, &index);
        resolver::apply_edges(&mut versions, &pass2, LinkMode::Strict)?;

        let pass3 = resolver::pass3_referrer_tag(&versions, &index);
        resolver::apply_edges(&mut versions, &pass3, LinkMode::Strict)?;

        let roots: BTreeSet<Digest> = versions
            .iter()
            .filter(|(_, v)| v.parent.is_none())
            .map(|(d, _)| d.clone())
            .collect();

        resolver::classify(&mut versions);

        Ok(Forest {
            versions,
            roots,
            index,
        })
    }

    /// `closure(V)`: V together with every proper descendant transitively
    /// reachable through the child relation. Traverses children only.
    pub fn closure(&self, seeds: impl IntoIterator<Item = Digest>) -> BTreeSet<Digest> {
        let mut result = BTreeSet::new();
        crate::tree::visit(
            &seeds.into_iter().collect::<Vec<_>>(),
            |d| {
                self.versions
                    .get(d)
                    .map(|v| v.children.clone())
                    .unwrap_or_default()
            },
            |d| {
                result.insert(d.clone());
            },
        );
        result
    }
}
