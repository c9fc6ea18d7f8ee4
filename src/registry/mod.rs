mod auth;
mod ghcr;
mod packages_api;

pub use auth::BearerChallenge;
pub use ghcr::GhcrRegistryGateway;
pub use packages_api::{GithubPackagesClient, OwnerKind};

use crate::error::CleanupError;
use crate::model::{Digest, Manifest};

/// Interface consumed by the core engine: fetch a manifest, and rewrite one
/// via PUT for the tag-deletion ghost protocol (§4.8). Retried internally
/// up to three times on transient failure and re-authenticated once on 401.
pub trait RegistryGateway {
    async fn fetch_manifest(&mut self, digest: &Digest) -> Result<Manifest, CleanupError>;
    async fn put_manifest(&mut self, tag: &str, manifest: &Manifest) -> Result<(), CleanupError>;
}

/// Interface consumed by the core engine for package-version bookkeeping.
pub trait PackagesApi {
    async fn list_versions(&mut self) -> Result<Vec<String>, CleanupError>;
    async fn delete_version(&mut self, id: i32) -> Result<(), CleanupError>;
}
