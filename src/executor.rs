use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::CleanupError;
use crate::forest::Forest;
use crate::model::Digest;
use crate::registry::{PackagesApi, RegistryGateway};
use crate::selection::Plan;

const VERSION_DELETE_CONCURRENCY: usize = 3;

#[derive(Clone, Debug, Default)]
pub struct ExecutionReport {
    pub tags_deleted: Vec<String>,
    pub versions_deleted: Vec<Digest>,
    pub version_delete_failures: Vec<(Digest, String)>,
}

/// Applies a computed plan against the registry. Tag deletions run
/// sequentially (each mutates the version list and requires a re-list);
/// version deletions run with a bounded worker pool of 3. In dry-run mode
/// no mutating calls are issued; only the report is populated.
pub async fn apply<P>(
    forest: &mut Forest,
    plan: &Plan,
    registry: &mut impl RegistryGateway,
    packages: &mut P,
    dry_run: bool,
) -> Result<ExecutionReport, CleanupError>
where
    P: PackagesApi + Clone + Send + 'static,
{
    let mut report = ExecutionReport::default();

    for tag in &plan.tags_delete {
        delete_tag(forest, tag, registry, packages, dry_run).await?;
        report.tags_deleted.push(tag.clone());
    }

    let version_ids: Vec<(Digest, i32)> = plan
        .versions_delete
        .iter()
        .filter_map(|digest| forest.versions.get(digest).map(|v| (digest.clone(), v.id)))
        .collect();

    let (deleted, failed) = delete_versions_bounded(&version_ids, packages, dry_run).await;
    report.versions_deleted = deleted.clone();
    report.version_delete_failures = failed;

    let remaining: std::collections::BTreeMap<Digest, crate::model::Version> = forest
        .versions
        .iter()
        .filter(|(digest, _)| !deleted.contains(digest))
        .map(|(d, v)| (d.clone(), v.clone()))
        .collect();

    *forest = Forest::build(remaining)?;

    Ok(report)
}

/// Tag-deletion ghost-manifest protocol (§4.8): ghcr.io has no DELETE-tag
/// API, so the tag is detached by rewriting a manifest clone under the same
/// tag (stealing it into a brand-new version) and then deleting that new
/// version. Fatal on failure — a failed step here leaves the in-memory
/// model diverged from the registry.
async fn delete_tag(
    forest: &mut Forest,
    tag: &str,
    registry: &mut impl RegistryGateway,
    packages: &mut impl PackagesApi,
    dry_run: bool,
) -> Result<(), CleanupError> {
    let Some(owner_digest) = forest.index.resolve_tag(tag).cloned() else {
        warn!(tag, "tag not present in key index, skipping");
        return Ok(());
    };

    if dry_run {
        info!(tag, owner = %owner_digest, "dry-run: would detach tag via ghost manifest rewrite");
        if let Some(version) = forest.versions.get_mut(&owner_digest) {
            version.tags.retain(|t| t != tag);
        }
        forest.index.remove_tag(tag);
        return Ok(());
    }

    let manifest = forest
        .versions
        .get(&owner_digest)
        .map(|v| v.manifest.clone())
        .ok_or_else(|| CleanupError::GraphInconsistency {
            detail: format!("tag {tag} resolved to a digest not present in the forest"),
        })?;

    let ghost = manifest.as_ghost();
    registry.put_manifest(tag, &ghost).await?;

    let envelopes = packages.list_versions().await?;
    let mut stolen_id = None;
    for envelope in envelopes {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&envelope)
            && value
                .get("metadata")
                .and_then(|m| m.get("container"))
                .and_then(|c| c.get("tags"))
                .and_then(|t| t.as_array())
                .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(tag)))
        {
            stolen_id = value.get("id").and_then(|v| v.as_i64());
            break;
        }
    }

    let stolen_id = stolen_id.ok_or_else(|| CleanupError::PlanApplyFailure {
        item: format!("tag {tag}"),
        detail: "ghost manifest version not found after re-list".to_string(),
    })?;

    packages
        .delete_version(stolen_id as i32)
        .await
        .map_err(|source| CleanupError::PlanApplyFailure {
            item: format!("tag {tag}"),
            detail: source.to_string(),
        })?;

    if let Some(version) = forest.versions.get_mut(&owner_digest) {
        version.tags.retain(|t| t != tag);
    }
    forest.index.remove_tag(tag);
    info!(tag, owner = %owner_digest, "tag deleted");

    Ok(())
}

/// Bounded-concurrency version deletion. Each spawned task owns a clone of
/// the packages client (cheap: it wraps a shared `reqwest::Client`) so the
/// worker pool needs no locking around the HTTP layer; a `Semaphore` caps
/// how many run at once.
async fn delete_versions_bounded<P>(
    version_ids: &[(Digest, i32)],
    packages: &P,
    dry_run: bool,
) -> (Vec<Digest>, Vec<(Digest, String)>)
where
    P: PackagesApi + Clone + Send + 'static,
{
    if dry_run {
        for (digest, _) in version_ids {
            info!(version = %digest, "dry-run: would delete version");
        }
        return (version_ids.iter().map(|(d, _)| d.clone()).collect(), Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(VERSION_DELETE_CONCURRENCY));
    let mut tasks = JoinSet::new();

    for (digest, id) in version_ids.iter().cloned() {
        let semaphore = Arc::clone(&semaphore);
        let mut client = packages.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            match client.delete_version(id).await {
                Ok(()) => Ok(digest),
                Err(source) => Err((digest, source.to_string())),
            }
        });
    }

    let mut deleted = Vec::new();
    let mut failed = Vec::new();

    while let Some(outcome) = tasks.join_next().await {
        match outcome {
            Ok(Ok(digest)) => {
                info!(version = %digest, "version deleted");
                deleted.push(digest);
            }
            Ok(Err((digest, detail))) => {
                warn!(version = %digest, error = %detail, "version delete failed");
                failed.push((digest, detail));
            }
            Err(join_error) => {
                warn!(error = %join_error, "version delete task panicked");
            }
        }
    }

    (deleted, failed)
}
