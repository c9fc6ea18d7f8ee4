use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("invalid JSON while decoding {context}: {detail}")]
    InvalidJson { context: String, detail: String },

    #[error("manifest not found for digest {digest}")]
    ManifestNotFound { digest: String },

    #[error("WWW-Authenticate challenge invalid or missing required attributes: {detail}")]
    AuthChallengeInvalid { detail: String },

    #[error("authentication failed: {detail}")]
    AuthFailed { detail: String },

    #[error("graph inconsistency: {detail}")]
    GraphInconsistency { detail: String },

    #[error("registry transport error calling {endpoint}: {detail}")]
    RegistryTransport { endpoint: String, detail: String },

    #[error("failed to apply plan item {item}: {detail}")]
    PlanApplyFailure { item: String, detail: String },

    #[error("missing required config value: {0}")]
    MissingToken(&'static str),

    #[error("invalid regular expression for {field}: {source}")]
    InvalidRegex {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("invalid non-negative integer for {field}: {value}")]
    InvalidKeepCount { field: &'static str, value: String },

    #[error("invalid log level: {0} (expected one of: error, warn, info, debug)")]
    InvalidLogLevel(String),

    #[error("self-link: a node cannot be linked as its own parent")]
    SelfLink,

    #[error("conflicting parent: child already linked to a different parent")]
    ConflictingParent,
}
