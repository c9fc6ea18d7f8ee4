use regex::Regex;

use crate::error::CleanupError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn parse(value: &str) -> Result<Self, CleanupError> {
        match value {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(CleanupError::InvalidLogLevel(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub token: String,
    pub owner: String,
    pub repository: String,
    pub package: String,
    pub include_tags: Option<Regex>,
    pub exclude_tags: Option<Regex>,
    pub keep_n_tagged: Option<u32>,
    pub keep_n_untagged: Option<u32>,
    pub dry_run: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Default)]
struct PartialConfig {
    token: Option<String>,
    owner: Option<String>,
    repository: Option<String>,
    package: Option<String>,
    include_tags: Option<String>,
    exclude_tags: Option<String>,
    keep_n_tagged: Option<String>,
    keep_n_untagged: Option<String>,
    dry_run: Option<String>,
    log_level: Option<String>,
}

/// Loads configuration from the process environment, following the
/// GitHub Actions convention: each `with:` entry in `action.yml` surfaces
/// as `INPUT_<NAME>` (upper-cased, `-` replaced with `_`). Owner and
/// repository fall back to the runner's ambient `GITHUB_REPOSITORY_OWNER`
/// / `GITHUB_REPOSITORY` when not supplied explicitly.
pub fn load() -> Result<Config, CleanupError> {
    merge_config(partial_from_env())
}

fn partial_from_env() -> PartialConfig {
    PartialConfig {
        token: std::env::var("INPUT_TOKEN").ok(),
        owner: std::env::var("INPUT_OWNER").ok(),
        repository: std::env::var("INPUT_REPOSITORY").ok(),
        package: std::env::var("INPUT_PACKAGE").ok(),
        include_tags: std::env::var("INPUT_INCLUDE_TAGS").ok(),
        exclude_tags: std::env::var("INPUT_EXCLUDE_TAGS").ok(),
        keep_n_tagged: std::env::var("INPUT_KEEP_N_TAGGED").ok(),
        keep_n_untagged: std::env::var("INPUT_KEEP_N_UNTAGGED").ok(),
        dry_run: std::env::var("INPUT_DRY_RUN").ok(),
        log_level: std::env::var("INPUT_LOG_LEVEL").ok(),
    }
}

fn default_owner() -> Option<String> {
    std::env::var("GITHUB_REPOSITORY_OWNER").ok()
}

fn default_repository() -> Option<String> {
    std::env::var("GITHUB_REPOSITORY")
        .ok()
        .and_then(|full| full.split_once('/').map(|(_, name)| name.to_string()))
}

fn parse_keep_count(field: &'static str, raw: &str) -> Result<u32, CleanupError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| CleanupError::InvalidKeepCount {
            field,
            value: raw.to_string(),
        })
}

fn compile_regex(field: &'static str, raw: &str) -> Result<Regex, CleanupError> {
    Regex::new(raw).map_err(|source| CleanupError::InvalidRegex { field, source })
}

fn merge_config(partial: PartialConfig) -> Result<Config, CleanupError> {
    let token = partial
        .token
        .filter(|t| !t.is_empty())
        .ok_or(CleanupError::MissingToken("INPUT_TOKEN"))?;

    let owner = partial
        .owner
        .filter(|o| !o.is_empty())
        .or_else(default_owner)
        .unwrap_or_default();

    let repository = partial
        .repository
        .filter(|r| !r.is_empty())
        .or_else(default_repository)
        .unwrap_or_default();

    let package = partial.package.filter(|p| !p.is_empty()).unwrap_or_default();

    let include_tags = partial
        .include_tags
        .filter(|v| !v.is_empty())
        .map(|raw| compile_regex("INPUT_INCLUDE_TAGS", &raw))
        .transpose()?;

    let exclude_tags = partial
        .exclude_tags
        .filter(|v| !v.is_empty())
        .map(|raw| compile_regex("INPUT_EXCLUDE_TAGS", &raw))
        .transpose()?;

    let keep_n_tagged = partial
        .keep_n_tagged
        .filter(|v| !v.is_empty())
        .map(|raw| parse_keep_count("INPUT_KEEP_N_TAGGED", &raw))
        .transpose()?;

    let keep_n_untagged = partial
        .keep_n_untagged
        .filter(|v| !v.is_empty())
        .map(|raw| parse_keep_count("INPUT_KEEP_N_UNTAGGED", &raw))
        .transpose()?;

    let dry_run = partial.dry_run.is_some_and(|v| !v.is_empty());

    let log_level = partial
        .log_level
        .filter(|v| !v.is_empty())
        .map(|raw| LogLevel::parse(&raw))
        .transpose()?
        .unwrap_or(LogLevel::Warn);

    Ok(Config {
        token,
        owner,
        repository,
        package,
        include_tags,
        exclude_tags,
        keep_n_tagged,
        keep_n_untagged,
        dry_run,
        log_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(token: Option<&str>) -> PartialConfig {
        PartialConfig {
            token: token.map(str::to_string),
            ..PartialConfig::default()
        }
    }

    #[test]
    fn missing_token_is_an_error() {
        let result = merge_config(partial(None));
        assert!(matches!(result, Err(CleanupError::MissingToken(_))));
    }

    #[test]
    fn dry_run_any_nonempty_string_is_true() {
        let mut p = partial(Some("ghp_x"));
        p.dry_run = Some("false".to_string());
        let config = merge_config(p).unwrap();
        assert!(config.dry_run);
    }

    #[test]
    fn default_log_level_is_warn() {
        let config = merge_config(partial(Some("ghp_x"))).unwrap();
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn invalid_keep_count_is_rejected() {
        let mut p = partial(Some("ghp_x"));
        p.keep_n_tagged = Some("not-a-number".to_string());
        let result = merge_config(p);
        assert!(matches!(result, Err(CleanupError::InvalidKeepCount { .. })));
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let mut p = partial(Some("ghp_x"));
        p.include_tags = Some("(unclosed".to_string());
        let result = merge_config(p);
        assert!(matches!(result, Err(CleanupError::InvalidRegex { .. })));
    }
}
