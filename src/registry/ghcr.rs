use crate::error::CleanupError;
use crate::model::{Digest, Manifest};
use crate::registry::auth::BearerChallenge;
use crate::registry::RegistryGateway;

const ACCEPT_MEDIA_TYPES: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json";

const MAX_TRANSIENT_RETRIES: u32 = 3;

/// ghcr.io HTTP client. Caches the exchanged Bearer token for the lifetime
/// of the gateway instance; a 401 triggers one re-authentication attempt.
pub struct GhcrRegistryGateway {
    http: reqwest::Client,
    owner: String,
    package: String,
    github_token: String,
    bearer_token: Option<String>,
}

impl GhcrRegistryGateway {
    pub fn new(owner: String, package: String, github_token: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("ghcr-prune/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GhcrRegistryGateway {
            http,
            owner,
            package,
            github_token,
            bearer_token: None,
        })
    }

    fn manifest_url(&self, reference: &str) -> String {
        format!("https://ghcr.io/v2/{}/{}/manifests/{reference}", self.owner, self.package)
    }

    async fn authenticate(&mut self, challenge_header: &str) -> Result<(), CleanupError> {
        let challenge = BearerChallenge::parse(challenge_header)?;

        let response = self
            .http
            .get(&challenge.realm)
            .query(&[("service", &challenge.service), ("scope", &challenge.scope)])
            .basic_auth("token", Some(&self.github_token))
            .send()
            .await
            .map_err(|source| CleanupError::AuthFailed {
                detail: source.to_string(),
            })?;

        let body: serde_json::Value =
            response
                .error_for_status()
                .map_err(|source| CleanupError::AuthFailed {
                    detail: source.to_string(),
                })?
                .json()
                .await
                .map_err(|source| CleanupError::AuthFailed {
                    detail: source.to_string(),
                })?;

        let token = body
            .get("token")
            .or_else(|| body.get("access_token"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| CleanupError::AuthFailed {
                detail: "token endpoint response had no usable token".to_string(),
            })?;

        self.bearer_token = Some(token.to_string());
        Ok(())
    }
}

impl RegistryGateway for GhcrRegistryGateway {
    async fn fetch_manifest(&mut self, digest: &Digest) -> Result<Manifest, CleanupError> {
        let url = self.manifest_url(digest.as_str());
        let mut attempts = 0;
        let mut reauthenticated = false;

        loop {
            let mut request = self.http.get(&url).header("Accept", ACCEPT_MEDIA_TYPES);
            if let Some(token) = &self.bearer_token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|source| CleanupError::RegistryTransport {
                endpoint: url.clone(),
                detail: source.to_string(),
            })?;

            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED && !reauthenticated {
                reauthenticated = true;
                let challenge = response
                    .headers()
                    .get(reqwest::header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| CleanupError::AuthChallengeInvalid {
                        detail: "401 response carried no WWW-Authenticate header".to_string(),
                    })?
                    .to_string();
                self.authenticate(&challenge).await?;
                continue;
            }

            // Observed inconsistently as 400 in one path and 404 in another;
            // both are treated as ManifestNotFound.
            if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
                return Err(CleanupError::ManifestNotFound {
                    digest: digest.to_string(),
                });
            }

            if status.is_server_error() && attempts < MAX_TRANSIENT_RETRIES {
                attempts += 1;
                continue;
            }

            let text = response.text().await.map_err(|source| CleanupError::RegistryTransport {
                endpoint: url.clone(),
                detail: source.to_string(),
            })?;

            if !status.is_success() {
                return Err(CleanupError::RegistryTransport {
                    endpoint: url,
                    detail: format!("unexpected status {status}"),
                });
            }

            return Manifest::decode(&text);
        }
    }

    async fn put_manifest(&mut self, tag: &str, manifest: &Manifest) -> Result<(), CleanupError> {
        let url = self.manifest_url(tag);
        let mut reauthenticated = false;

        loop {
            let mut request = self
                .http
                .put(&url)
                .header("Content-Type", manifest.media_type.clone())
                .body(manifest.raw.to_string());
            if let Some(token) = &self.bearer_token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|source| CleanupError::RegistryTransport {
                endpoint: url.clone(),
                detail: source.to_string(),
            })?;

            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED && !reauthenticated {
                reauthenticated = true;
                let challenge = response
                    .headers()
                    .get(reqwest::header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| CleanupError::AuthChallengeInvalid {
                        detail: "401 response carried no WWW-Authenticate header".to_string(),
                    })?
                    .to_string();
                self.authenticate(&challenge).await?;
                continue;
            }

            if !status.is_success() {
                return Err(CleanupError::PlanApplyFailure {
                    item: format!("put manifest for tag {tag}"),
                    detail: format!("unexpected status {status}"),
                });
            }

            return Ok(());
        }
    }
}
