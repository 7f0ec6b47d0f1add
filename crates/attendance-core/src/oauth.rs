use serde_json::{json, Value};

use crate::models::TokenSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthErrorFields {
    pub error: String,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthTokenParseError {
    /// The provider returned an explicit error payload (sometimes with HTTP 200).
    ProviderError(OAuthErrorFields),

    /// The body was parseable but did not carry an access token or a provider error.
    MissingAccessToken,

    /// An access token came back without the identity token we key the session on.
    MissingIdToken,

    /// The body could not be parsed as JSON or x-www-form-urlencoded.
    InvalidFormat,
}

impl std::fmt::Display for OAuthTokenParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OAuthTokenParseError::ProviderError(err) => {
                write!(f, "token endpoint returned error '{}'", err.error)?;
                if let Some(desc) = &err.error_description {
                    if !desc.is_empty() {
                        write!(f, ": {desc}")?;
                    }
                }
                if let Some(uri) = &err.error_uri {
                    if !uri.is_empty() {
                        write!(f, " ({uri})")?;
                    }
                }
                Ok(())
            }
            OAuthTokenParseError::MissingAccessToken => {
                write!(f, "token endpoint response missing access_token")
            }
            OAuthTokenParseError::MissingIdToken => {
                write!(f, "token endpoint response missing id_token")
            }
            OAuthTokenParseError::InvalidFormat => {
                write!(f, "token endpoint response had an unrecognized format")
            }
        }
    }
}

impl std::error::Error for OAuthTokenParseError {}

/// Parse a token endpoint response body into a [`TokenSet`].
///
/// Supports JSON (preferred) and `application/x-www-form-urlencoded` bodies.
/// `access_token` and `id_token` are required; `refresh_token` is optional
/// because refresh grants do not return one.
///
/// Never returns the raw body on error, so tokens cannot leak into logs.
pub fn parse_token_set_from_token_exchange_body(body: &str) -> Result<TokenSet, OAuthTokenParseError> {
    let fields = if let Ok(v) = serde_json::from_str::<Value>(body) {
        let field = |name: &str| v.get(name).and_then(|v| v.as_str()).map(|s| s.to_string());
        ResponseFields {
            access_token: field("access_token"),
            id_token: field("id_token"),
            refresh_token: field("refresh_token"),
            error: field("error"),
            error_description: field("error_description"),
            error_uri: field("error_uri"),
        }
    } else {
        let pairs = parse_form_urlencoded(body);
        if pairs.is_empty() {
            return Err(OAuthTokenParseError::InvalidFormat);
        }

        let mut fields = ResponseFields::default();
        for (k, v) in pairs {
            match k.as_str() {
                "access_token" => fields.access_token = Some(v),
                "id_token" => fields.id_token = Some(v),
                "refresh_token" => fields.refresh_token = Some(v),
                "error" => fields.error = Some(v),
                "error_description" => fields.error_description = Some(v),
                "error_uri" => fields.error_uri = Some(v),
                _ => {}
            }
        }
        fields
    };

    fields.into_token_set()
}

#[derive(Default)]
struct ResponseFields {
    access_token: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    error_uri: Option<String>,
}

impl ResponseFields {
    fn into_token_set(self) -> Result<TokenSet, OAuthTokenParseError> {
        let Some(access_token) = self.access_token else {
            if let Some(error) = self.error {
                return Err(OAuthTokenParseError::ProviderError(OAuthErrorFields {
                    error,
                    error_description: self.error_description,
                    error_uri: self.error_uri,
                }));
            }
            return Err(OAuthTokenParseError::MissingAccessToken);
        };

        if self.id_token.is_none() {
            return Err(OAuthTokenParseError::MissingIdToken);
        }

        Ok(TokenSet {
            access_token: Some(access_token),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
        })
    }
}

fn parse_form_urlencoded(body: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();

    // Avoid treating arbitrary strings as form bodies.
    if !body.contains('=') {
        return out;
    }

    for part in body.split('&') {
        if part.is_empty() {
            continue;
        }
        let (k, v) = part.split_once('=').unwrap_or((part, ""));

        // Form encoding uses '+' for spaces; urlencoding only handles %XX.
        let k = k.replace('+', " ");
        let v = v.replace('+', " ");
        let k = urlencoding::decode(&k)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| k.clone());
        let v = urlencoding::decode(&v)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| v.clone());

        out.push((k, v));
    }

    out
}

pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    // `str` slicing must happen on UTF-8 boundaries.
    let mut end = max_len.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    let mut out = s[..end].to_string();
    out.push_str("…(truncated)");
    out
}

const TOKEN_FIELDS: [&str; 3] = ["access_token", "id_token", "refresh_token"];

/// Best-effort redaction of a token endpoint body for error logs.
pub fn redact_token_body_for_log(body: &str) -> String {
    if let Ok(mut v) = serde_json::from_str::<Value>(body) {
        for field in TOKEN_FIELDS {
            if v.get(field).is_some() {
                v[field] = json!("[REDACTED]");
            }
        }
        return truncate_for_log(&v.to_string(), 2048);
    }

    if TOKEN_FIELDS.iter().any(|f| body.contains(f)) {
        return "<redacted token response>".to_string();
    }

    truncate_for_log(body, 2048)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_success() {
        let body = r#"{"access_token":"at","id_token":"it","refresh_token":"rt","token_type":"Bearer"}"#;
        let tokens = parse_token_set_from_token_exchange_body(body).unwrap();
        assert_eq!(tokens, TokenSet::new("at", "it", "rt"));
    }

    #[test]
    fn parse_json_refresh_grant_without_refresh_token() {
        let body = r#"{"access_token":"at","id_token":"it","expires_in":3600}"#;
        let tokens = parse_token_set_from_token_exchange_body(body).unwrap();
        assert_eq!(tokens.id_token.as_deref(), Some("it"));
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn parse_json_error_payload() {
        let body = r#"{"error":"invalid_grant","error_description":"Code expired"}"#;
        let err = parse_token_set_from_token_exchange_body(body).unwrap_err();
        match err {
            OAuthTokenParseError::ProviderError(fields) => {
                assert_eq!(fields.error, "invalid_grant");
                assert!(fields.error_description.unwrap().contains("expired"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_json_missing_id_token() {
        let body = r#"{"access_token":"at"}"#;
        assert_eq!(
            parse_token_set_from_token_exchange_body(body).unwrap_err(),
            OAuthTokenParseError::MissingIdToken
        );
    }

    #[test]
    fn parse_form_success_and_error() {
        let body = "access_token=at&id_token=it&refresh_token=r%2Bt";
        let tokens = parse_token_set_from_token_exchange_body(body).unwrap();
        assert_eq!(tokens.refresh_token.as_deref(), Some("r+t"));

        let body = "error=invalid_grant&error_description=The+code+has+expired";
        let err = parse_token_set_from_token_exchange_body(body).unwrap_err();
        assert_eq!(
            err.to_string(),
            "token endpoint returned error 'invalid_grant': The code has expired"
        );
    }

    #[test]
    fn parse_garbage() {
        assert_eq!(
            parse_token_set_from_token_exchange_body("<html>bad gateway</html>").unwrap_err(),
            OAuthTokenParseError::InvalidFormat
        );
    }

    #[test]
    fn redaction_hides_tokens() {
        let body = r#"{"access_token":"secret-at","id_token":"secret-it","error":"x"}"#;
        let safe = redact_token_body_for_log(body);
        assert!(!safe.contains("secret"));
        assert!(safe.contains("[REDACTED]"));

        assert_eq!(
            redact_token_body_for_log("refresh_token=secret"),
            "<redacted token response>"
        );
    }
}
