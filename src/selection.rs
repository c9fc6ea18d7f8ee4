use std::collections::BTreeSet;

use regex::Regex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::forest::Forest;
use crate::model::{ArtifactType, Digest};

#[derive(Clone, Debug, Default)]
pub struct SelectionConfig {
    pub include_tags: Option<Regex>,
    pub exclude_tags: Option<Regex>,
    pub keep_n_tagged: Option<u32>,
    pub keep_n_untagged: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub tags_delete: BTreeSet<String>,
    pub versions_delete: BTreeSet<Digest>,
}

/// Computes the deletion plan (§4.7). `X_tag`, the universe this engine
/// partitions, is taken as the tags owned by *root* versions: a referrer
/// tag on a non-root attestation (the OCI 1.0 `sha256-<hex>` fallback
/// schema) is a linking artifact, not a user-facing retention signal, and
/// must not independently protect that attestation from its subject's
/// deletion closure (open question, decided in DESIGN.md).
pub fn compute(forest: &Forest, config: &SelectionConfig) -> Plan {
    let root_tags: Vec<(String, Digest)> = forest
        .roots
        .iter()
        .flat_map(|digest| {
            forest.versions[digest]
                .tags
                .iter()
                .map(move |tag| (tag.clone(), digest.clone()))
        })
        .collect();

    let a_tag: BTreeSet<String> = match &config.include_tags {
        Some(re) => root_tags.iter().filter(|(t, _)| re.is_match(t)).map(|(t, _)| t.clone()).collect(),
        None => BTreeSet::new(),
    };
    let b_tag: BTreeSet<String> = match &config.exclude_tags {
        Some(re) => root_tags.iter().filter(|(t, _)| re.is_match(t)).map(|(t, _)| t.clone()).collect(),
        None => BTreeSet::new(),
    };

    let mut tags_rest: Vec<(String, Digest)> = root_tags
        .into_iter()
        .filter(|(t, _)| !a_tag.contains(t) && !b_tag.contains(t))
        .collect();
    tags_rest.sort_by(|(_, da), (_, db)| updated_at_of(forest, db).cmp(&updated_at_of(forest, da)));

    let (c_slice, d_slice): (Vec<_>, Vec<_>) = match config.keep_n_tagged {
        Some(n) => {
            let split = (n as usize).min(tags_rest.len());
            (tags_rest[..split].to_vec(), tags_rest[split..].to_vec())
        }
        None => (tags_rest, Vec::new()),
    };

    let c_tag: BTreeSet<String> = c_slice.into_iter().map(|(t, _)| t).collect();
    let d_tag: BTreeSet<String> = d_slice.into_iter().map(|(t, _)| t).collect();

    let versions_of = |tags: &BTreeSet<String>| -> Vec<Digest> {
        tags.iter().filter_map(|t| forest.index.resolve_tag(t).cloned()).collect()
    };

    let a_dig = forest.closure(versions_of(&a_tag));
    let b_dig = forest.closure(versions_of(&b_tag));
    let c_dig = forest.closure(versions_of(&c_tag));
    let d_dig = forest.closure(versions_of(&d_tag));

    let claimed: BTreeSet<Digest> = union_all([&a_dig, &b_dig, &c_dig, &d_dig]);

    let mut images_rest: Vec<Digest> = forest
        .roots
        .iter()
        .filter(|r| !claimed.contains(*r) && forest.versions[*r].artifact_type != ArtifactType::Attestation)
        .cloned()
        .collect();
    images_rest.sort_by(|a, b| updated_at_of(forest, b).cmp(&updated_at_of(forest, a)));

    let e_seed: Vec<Digest> = match config.keep_n_untagged {
        Some(n) => images_rest.iter().take(n as usize).cloned().collect(),
        None => images_rest.clone(),
    };
    let e_dig = forest.closure(e_seed);

    let f_dig: BTreeSet<Digest> = images_rest.into_iter().filter(|r| !e_dig.contains(r)).collect();

    let tags_delete: BTreeSet<String> = a_tag.difference(&b_tag).cloned().collect::<BTreeSet<_>>()
        .union(&d_tag)
        .cloned()
        .collect();

    let union_adf = union_all([&a_dig, &d_dig, &f_dig]);
    let union_bce = union_all([&b_dig, &c_dig, &e_dig]);
    let versions_delete: BTreeSet<Digest> = union_adf.difference(&union_bce).cloned().collect();

    Plan {
        tags_delete,
        versions_delete,
    }
}

fn union_all<const N: usize>(sets: [&BTreeSet<Digest>; N]) -> BTreeSet<Digest> {
    sets.into_iter().flatten().cloned().collect()
}

fn updated_at_of(forest: &Forest, digest: &Digest) -> OffsetDateTime {
    forest
        .versions
        .get(digest)
        .and_then(|v| OffsetDateTime::parse(&v.updated_at, &Rfc3339).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Manifest, Version};
    use std::collections::BTreeMap;

    fn version(id: i32, digest: &str, tags: Vec<&str>, updated_at: &str, manifest: Manifest) -> Version {
        Version {
            id,
            name: Digest::new(digest),
            url: String::new(),
            package_html_url: String::new(),
            html_url: String::new(),
            created_at: updated_at.to_string(),
            updated_at: updated_at.to_string(),
            tags: tags.into_iter().map(str::to_string).collect(),
            manifest,
            parent: None,
            children: Vec::new(),
            artifact_type: crate::model::ArtifactType::Unknown,
        }
    }

    fn single_arch() -> Manifest {
        Manifest::decode(
            r#"{"mediaType": "application/vnd.oci.image.manifest.v1+json", "layers": [{"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:layer"}]}"#,
        )
        .unwrap()
    }

    fn in_toto_manifest() -> Manifest {
        Manifest::decode(
            r#"{"mediaType": "application/vnd.oci.image.manifest.v1+json", "layers": [{"mediaType": "application/vnd.in-toto+json", "digest": "sha256:attestation-layer"}]}"#,
        )
        .unwrap()
    }

    fn in_toto_manifest_with_subject(subject_digest: &str) -> Manifest {
        let text = format!(
            r#"{{"mediaType": "application/vnd.oci.image.manifest.v1+json",
                "layers": [{{"mediaType": "application/vnd.in-toto+json", "digest": "sha256:attestation-layer"}}],
                "subject": {{"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "{subject_digest}"}}}}"#
        );
        Manifest::decode(&text).unwrap()
    }

    #[test]
    fn empty_repo_yields_empty_plan() {
        let forest = Forest::build(BTreeMap::new()).expect("build");
        let plan = compute(&forest, &SelectionConfig::default());
        assert!(plan.tags_delete.is_empty());
        assert!(plan.versions_delete.is_empty());
    }

    #[test]
    fn include_single_tag_deletes_only_that_root() {
        let mut versions = BTreeMap::new();
        versions.insert(
            Digest::new("sha256:aaa"),
            version(1, "sha256:aaa", vec!["v1"], "2024-01-01T00:00:00Z", single_arch()),
        );
        versions.insert(
            Digest::new("sha256:bbb"),
            version(2, "sha256:bbb", vec!["v2"], "2024-01-02T00:00:00Z", single_arch()),
        );

        let forest = Forest::build(versions).expect("build");
        let config = SelectionConfig {
            include_tags: Some(Regex::new("^v1$").unwrap()),
            ..Default::default()
        };
        let plan = compute(&forest, &config);

        assert_eq!(plan.tags_delete, BTreeSet::from(["v1".to_string()]));
        assert_eq!(plan.versions_delete, BTreeSet::from([Digest::new("sha256:aaa")]));
    }

    #[test]
    fn keep_n_tagged_orders_by_updated_at_desc() {
        let mut versions = BTreeMap::new();
        for i in 0..10 {
            versions.insert(
                Digest::new(format!("sha256:{i:064}")),
                version(
                    i,
                    &format!("sha256:{i:064}"),
                    vec![Box::leak(format!("t{i}").into_boxed_str())],
                    &format!("2024-01-{:02}T00:00:00Z", i + 1),
                    single_arch(),
                ),
            );
        }

        let forest = Forest::build(versions).expect("build");
        let config = SelectionConfig {
            keep_n_tagged: Some(3),
            ..Default::default()
        };
        let plan = compute(&forest, &config);

        let expected: BTreeSet<String> = (0..=6).map(|i| format!("t{i}")).collect();
        assert_eq!(plan.tags_delete, expected);
    }

    #[test]
    fn referrer_tag_attestation_is_deleted_with_its_root_subject() {
        let root_hex = "1".repeat(64);
        let child_hex = "2".repeat(64);
        let root_digest = format!("sha256:{root_hex}");
        let child_digest = format!("sha256:{child_hex}");
        let child_tag = format!("sha256-{root_hex}");

        let mut versions = BTreeMap::new();
        versions.insert(
            Digest::new(root_digest.clone()),
            version(1, &root_digest, vec!["v1"], "2024-01-01T00:00:00Z", single_arch()),
        );
        versions.insert(
            Digest::new(child_digest.clone()),
            version(2, &child_digest, vec![&child_tag], "2024-01-01T00:00:00Z", in_toto_manifest()),
        );

        let forest = Forest::build(versions).expect("build");
        // The referrer tag wires B under A as its attestation child; it must
        // not surface as a root-owned tag in its own right.
        assert_eq!(forest.roots, BTreeSet::from([Digest::new(root_digest.clone())]));
        assert_eq!(
            forest.versions[&Digest::new(child_digest.clone())].artifact_type,
            ArtifactType::Attestation
        );

        let config = SelectionConfig {
            include_tags: Some(Regex::new("^v1$").unwrap()),
            ..Default::default()
        };
        let plan = compute(&forest, &config);

        assert_eq!(plan.tags_delete, BTreeSet::from(["v1".to_string()]));
        assert_eq!(
            plan.versions_delete,
            BTreeSet::from([Digest::new(root_digest), Digest::new(child_digest)])
        );
    }

    #[test]
    fn subject_attestation_survives_within_kept_untagged_root_closure() {
        let mut versions = BTreeMap::new();
        versions.insert(
            Digest::new("sha256:aaa"),
            version(1, "sha256:aaa", vec![], "2024-01-01T00:00:00Z", single_arch()),
        );
        versions.insert(
            Digest::new("sha256:bbb"),
            version(
                2,
                "sha256:bbb",
                vec![],
                "2024-01-02T00:00:00Z",
                in_toto_manifest_with_subject("sha256:aaa"),
            ),
        );

        let forest = Forest::build(versions).expect("build");
        assert_eq!(forest.roots, BTreeSet::from([Digest::new("sha256:aaa")]));
        assert_eq!(
            forest.versions[&Digest::new("sha256:bbb")].artifact_type,
            ArtifactType::Attestation
        );

        let config = SelectionConfig {
            keep_n_untagged: Some(1),
            ..Default::default()
        };
        let plan = compute(&forest, &config);

        assert!(plan.tags_delete.is_empty());
        assert!(plan.versions_delete.is_empty());
    }

    #[test]
    fn conflicting_tag_in_both_include_and_exclude_is_kept() {
        let mut versions = BTreeMap::new();
        versions.insert(
            Digest::new("sha256:aaa"),
            version(1, "sha256:aaa", vec!["v1"], "2024-01-01T00:00:00Z", single_arch()),
        );
        let forest = Forest::build(versions).expect("build");
        let config = SelectionConfig {
            include_tags: Some(Regex::new("^v1$").unwrap()),
            exclude_tags: Some(Regex::new("^v1$").unwrap()),
            ..Default::default()
        };
        let plan = compute(&forest, &config);
        assert!(!plan.tags_delete.contains("v1"));
    }
}
