mod cli;
mod config;
mod error;
mod executor;
mod forest;
mod model;
mod registry;
mod resolver;
mod selection;
mod tree;

mod logging;

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::model::{Digest, Manifest, Version};
use crate::registry::{GhcrRegistryGateway, GithubPackagesClient, PackagesApi, RegistryGateway};
use crate::selection::SelectionConfig;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %err, "command failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load().context("failed to load configuration")?;
    logging::init(config.log_level, cli.verbose).context("failed to initialize logging")?;

    let dry_run = config.dry_run || cli.dry_run;
    log_run_start(&config, dry_run);

    let mut packages = GithubPackagesClient::new(
        config.token.clone(),
        config.owner.clone(),
        config.repository.clone(),
        config.package.clone(),
    )
    .context("failed to build GitHub Packages client")?;
    let mut registry = GhcrRegistryGateway::new(config.owner.clone(), config.package.clone(), config.token.clone())
        .context("failed to build ghcr.io registry client")?;

    let started = Instant::now();
    let versions = load_versions(&mut packages, &mut registry).await?;
    info!(count = versions.len(), elapsed_ms = started.elapsed().as_millis() as u64, "loaded package versions");

    let started = Instant::now();
    let mut forest = crate::forest::Forest::build(versions).context("failed to build artifact forest")?;
    info!(
        roots = forest.roots.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "resolved artifact relationships"
    );

    let selection_config = SelectionConfig {
        include_tags: config.include_tags.clone(),
        exclude_tags: config.exclude_tags.clone(),
        keep_n_tagged: config.keep_n_tagged,
        keep_n_untagged: config.keep_n_untagged,
    };

    let started = Instant::now();
    let plan = selection::compute(&forest, &selection_config);
    info!(
        tags_to_delete = plan.tags_delete.len(),
        versions_to_delete = plan.versions_delete.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "computed deletion plan"
    );

    log_plan_tree(&forest, &plan);

    let started = Instant::now();
    let report = executor::apply(&mut forest, &plan, &mut registry, &mut packages, dry_run)
        .await
        .context("failed to apply deletion plan")?;
    info!(
        tags_deleted = report.tags_deleted.len(),
        versions_deleted = report.versions_deleted.len(),
        failures = report.version_delete_failures.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "applied deletion plan"
    );

    for (digest, detail) in &report.version_delete_failures {
        warn!(version = %digest, error = %detail, "version delete failed, continuing");
    }

    Ok(())
}

fn log_run_start(config: &Config, dry_run: bool) {
    info!(
        owner = %config.owner,
        repository = %config.repository,
        package = %config.package,
        dry_run,
        log_level = config.log_level.as_str(),
        "starting ghcr-prune run"
    );
}

/// Lists package versions, fetches each version's manifest, and decodes
/// both into the `Version` model. A manifest GET that 404s/400s is
/// recovered by substituting an unknown placeholder and logging a
/// warning, rather than aborting the whole run (spec.md §7).
async fn load_versions(
    packages: &mut impl PackagesApi,
    registry: &mut impl RegistryGateway,
) -> anyhow::Result<BTreeMap<Digest, Version>> {
    let envelopes = packages.list_versions().await.context("failed to list package versions")?;

    let mut versions = BTreeMap::new();
    for envelope in envelopes {
        let digest = envelope_digest(&envelope).context("package version envelope missing a usable name/digest")?;

        let manifest = match registry.fetch_manifest(&digest).await {
            Ok(manifest) => manifest,
            Err(crate::error::CleanupError::ManifestNotFound { .. }) => {
                warn!(version = %digest, "manifest not found, substituting unknown placeholder");
                Manifest::unknown_placeholder()
            }
            Err(source) => return Err(source).context("failed to fetch manifest"),
        };

        let version = Version::decode(&envelope, manifest).context("failed to decode package version envelope")?;
        versions.insert(digest, version);
    }

    Ok(versions)
}

fn envelope_digest(envelope: &str) -> Option<Digest> {
    let value: serde_json::Value = serde_json::from_str(envelope).ok()?;
    value.get("name").and_then(|v| v.as_str()).map(Digest::new)
}

fn log_plan_tree(forest: &crate::forest::Forest, plan: &crate::selection::Plan) {
    let roots: Vec<Digest> = forest.roots.iter().cloned().collect();
    let rendered = crate::tree::render(
        &roots,
        |d| forest.versions.get(d).map(|v| v.children.clone()).unwrap_or_default(),
        |d| {
            let marked = plan.versions_delete.contains(d);
            let tags = forest.versions.get(d).map(|v| v.tags.join(",")).unwrap_or_default();
            if marked {
                format!("{d} [{tags}] (delete)")
            } else {
                format!("{d} [{tags}]")
            }
        },
    );
    info!("deletion plan:\n{rendered}");
}
