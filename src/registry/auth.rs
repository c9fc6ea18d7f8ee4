use crate::error::CleanupError;

/// A parsed `WWW-Authenticate: Bearer realm="…",service="…",scope="…"`
/// challenge. All three attributes are required; values may be quoted or
/// bare and are comma-separated with tolerant whitespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

impl BearerChallenge {
    pub fn parse(header: &str) -> Result<BearerChallenge, CleanupError> {
        let invalid = |detail: &str| CleanupError::AuthChallengeInvalid {
            detail: detail.to_string(),
        };

        let rest = header
            .trim()
            .strip_prefix("Bearer ")
            .ok_or_else(|| invalid("missing Bearer scheme prefix"))?;

        let mut realm = None;
        let mut service = None;
        let mut scope = None;

        for param in split_params(rest) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"');

            match key {
                "realm" => realm = Some(value.to_string()),
                "service" => service = Some(value.to_string()),
                "scope" => scope = Some(value.to_string()),
                _ => {}
            }
        }

        match (realm, service, scope) {
            (Some(realm), Some(service), Some(scope)) => Ok(BearerChallenge { realm, service, scope }),
            _ => Err(invalid("missing realm, service, or scope attribute")),
        }
    }
}

/// Splits on commas outside of quoted strings.
fn split_params(rest: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in rest.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_challenge() {
        let header = r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:owner/pkg:pull""#;
        let challenge = BearerChallenge::parse(header).expect("parse");
        assert_eq!(challenge.realm, "https://ghcr.io/token");
        assert_eq!(challenge.service, "ghcr.io");
        assert_eq!(challenge.scope, "repository:owner/pkg:pull");
    }

    #[test]
    fn parses_with_extra_whitespace_and_bare_values() {
        let header = r#"Bearer realm="https://ghcr.io/token", service=ghcr.io ,  scope="repository:owner/pkg:pull""#;
        let challenge = BearerChallenge::parse(header).expect("parse");
        assert_eq!(challenge.service, "ghcr.io");
    }

    #[test]
    fn missing_scope_is_invalid() {
        let header = r#"Bearer realm="https://ghcr.io/token",service="ghcr.io""#;
        assert!(BearerChallenge::parse(header).is_err());
    }

    #[test]
    fn non_bearer_scheme_is_invalid() {
        assert!(BearerChallenge::parse("Basic realm=\"x\"").is_err());
    }
}
