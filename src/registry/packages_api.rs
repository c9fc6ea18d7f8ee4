use serde::Deserialize;

use crate::error::CleanupError;
use crate::registry::PackagesApi;

const PER_PAGE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerKind {
    User,
    Organization,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
    Organization,
    UserPublic,
    UserPrivate,
}

#[derive(Debug, Deserialize)]
struct OwnerLookup {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryLookup {
    private: bool,
}

/// GitHub Packages REST client: lists package versions and deletes them.
/// The endpoint family depends on the owner's type (`User` vs
/// `Organization`, discovered once via `GET /users/{owner}`) and, for
/// `User` owners, on the named repository's visibility (discovered via
/// `GET /repos/{owner}/{repository}`): private user-owned packages live
/// under `/user/packages/...` (the authenticated-user endpoint), public
/// ones under `/users/{owner}/packages/...`.
#[derive(Clone)]
pub struct GithubPackagesClient {
    http: reqwest::Client,
    token: String,
    owner: String,
    repository: String,
    package: String,
    endpoint: Option<Endpoint>,
}

impl GithubPackagesClient {
    pub fn new(token: String, owner: String, repository: String, package: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("ghcr-prune/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GithubPackagesClient {
            http,
            token,
            owner,
            repository,
            package,
            endpoint: None,
        })
    }

    async fn owner_kind(&self) -> Result<OwnerKind, CleanupError> {
        let url = format!("https://api.github.com/users/{}", self.owner);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| CleanupError::RegistryTransport {
                endpoint: url.clone(),
                detail: source.to_string(),
            })?;

        let lookup: OwnerLookup = response
            .error_for_status()
            .map_err(|source| CleanupError::RegistryTransport {
                endpoint: url.clone(),
                detail: source.to_string(),
            })?
            .json()
            .await
            .map_err(|source| CleanupError::InvalidJson {
                context: "owner lookup".to_string(),
                detail: source.to_string(),
            })?;

        Ok(match lookup.kind.as_str() {
            "Organization" => OwnerKind::Organization,
            _ => OwnerKind::User,
        })
    }

    async fn repository_is_private(&self) -> Result<bool, CleanupError> {
        let url = format!("https://api.github.com/repos/{}/{}", self.owner, self.repository);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| CleanupError::RegistryTransport {
                endpoint: url.clone(),
                detail: source.to_string(),
            })?;

        let lookup: RepositoryLookup = response
            .error_for_status()
            .map_err(|source| CleanupError::RegistryTransport {
                endpoint: url.clone(),
                detail: source.to_string(),
            })?
            .json()
            .await
            .map_err(|source| CleanupError::InvalidJson {
                context: "repository visibility lookup".to_string(),
                detail: source.to_string(),
            })?;

        Ok(lookup.private)
    }

    async fn endpoint(&mut self) -> Result<Endpoint, CleanupError> {
        if let Some(endpoint) = self.endpoint {
            return Ok(endpoint);
        }

        let endpoint = match self.owner_kind().await? {
            OwnerKind::Organization => Endpoint::Organization,
            OwnerKind::User if self.repository_is_private().await? => Endpoint::UserPrivate,
            OwnerKind::User => Endpoint::UserPublic,
        };
        self.endpoint = Some(endpoint);
        Ok(endpoint)
    }

    fn versions_base_url(&self, endpoint: Endpoint) -> String {
        match endpoint {
            Endpoint::Organization => format!(
                "https://api.github.com/orgs/{}/packages/container/{}/versions",
                self.owner, self.package
            ),
            Endpoint::UserPublic => format!(
                "https://api.github.com/users/{}/packages/container/{}/versions",
                self.owner, self.package
            ),
            Endpoint::UserPrivate => {
                format!("https://api.github.com/user/packages/container/{}/versions", self.package)
            }
        }
    }
}

impl PackagesApi for GithubPackagesClient {
    /// Paginated listing, `per_page=100`, `state=active`,
    /// `package_type=container`. Returns each version's raw JSON envelope
    /// for `model::Version::decode`.
    async fn list_versions(&mut self) -> Result<Vec<String>, CleanupError> {
        let endpoint = self.endpoint().await?;
        let base_url = self.versions_base_url(endpoint);

        let mut envelopes = Vec::new();
        let mut page = 1;

        loop {
            let url = format!("{base_url}?per_page={PER_PAGE}&state=active&page={page}");
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|source| CleanupError::RegistryTransport {
                    endpoint: url.clone(),
                    detail: source.to_string(),
                })?
                .error_for_status()
                .map_err(|source| CleanupError::RegistryTransport {
                    endpoint: url.clone(),
                    detail: source.to_string(),
                })?;

            let batch: Vec<serde_json::Value> =
                response.json().await.map_err(|source| CleanupError::InvalidJson {
                    context: "package version listing".to_string(),
                    detail: source.to_string(),
                })?;

            if batch.is_empty() {
                break;
            }

            let fetched = batch.len();
            for entry in batch {
                envelopes.push(entry.to_string());
            }

            if fetched < PER_PAGE as usize {
                break;
            }
            page += 1;
        }

        Ok(envelopes)
    }

    async fn delete_version(&mut self, id: i32) -> Result<(), CleanupError> {
        let endpoint = self.endpoint().await?;
        let base_url = self.versions_base_url(endpoint);
        let url = format!("{base_url}/{id}");

        self.http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| CleanupError::PlanApplyFailure {
                item: format!("version {id}"),
                detail: source.to_string(),
            })?
            .error_for_status()
            .map_err(|source| CleanupError::PlanApplyFailure {
                item: format!("version {id}"),
                detail: source.to_string(),
            })?;

        Ok(())
    }
}
