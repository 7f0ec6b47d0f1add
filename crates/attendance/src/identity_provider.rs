use async_trait::async_trait;
use attendance_core::{
    error::Result,
    oauth::{parse_token_set_from_token_exchange_body, redact_token_body_for_log, OAuthTokenParseError},
    AccessError, IdentityProvider, RefreshedTokens, TokenSet,
};
use url::Url;

use crate::config::Settings;

/// Hosted-UI endpoints of an authorization-code OAuth2 provider.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub domain: Url,
    pub client_id: String,
    pub redirect_uri: String,
    pub logout_uri: String,
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    /// `None` when the domain or client id is not configured.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let (Some(domain), Some(client_id)) = (&settings.idp_domain, &settings.client_id) else {
            return Ok(None);
        };

        let domain = domain.trim().trim_end_matches('/');
        // Hosted domains are often configured without a scheme.
        let domain = if domain.contains("://") {
            Url::parse(domain)?
        } else {
            Url::parse(&format!("https://{domain}"))?
        };

        Ok(Some(Self {
            domain,
            client_id: client_id.trim().to_string(),
            redirect_uri: settings.redirect_uri.clone(),
            logout_uri: settings.logout_uri.clone(),
            scopes: settings.scope_list(),
        }))
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.domain.clone();
        url.set_path(path);
        url
    }

    pub fn authorize_url(&self) -> Url {
        let mut url = self.endpoint("/oauth2/authorize");
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("redirect_uri", &self.redirect_uri);
        url
    }

    pub fn token_url(&self) -> Url {
        self.endpoint("/oauth2/token")
    }

    pub fn logout_url(&self) -> Url {
        let mut url = self.endpoint("/logout");
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("logout_uri", &self.logout_uri);
        url
    }
}

/// Token endpoint client for the hosted identity provider.
pub struct HostedIdentityProvider {
    http: reqwest::Client,
    config: OAuthClientConfig,
}

impl HostedIdentityProvider {
    pub fn new(config: OAuthClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet> {
        let token_url = self.config.token_url();
        let resp = self
            .http
            .post(token_url.clone())
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| AccessError::Exchange(format!("token request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AccessError::Exchange(format!("failed to read token response: {e}")))?;

        if !status.is_success() {
            log::warn!(
                "Token endpoint {} returned {}: {}",
                token_url,
                status,
                redact_token_body_for_log(&body)
            );
            return Err(AccessError::Exchange(format!(
                "token endpoint returned {status}"
            )));
        }

        match parse_token_set_from_token_exchange_body(&body) {
            Ok(tokens) => Ok(tokens),
            Err(OAuthTokenParseError::ProviderError(e)) => Err(AccessError::Exchange(format!(
                "provider returned error '{}': {} (check client id and redirect URI: {})",
                e.error,
                e.error_description.unwrap_or_default(),
                self.config.redirect_uri
            ))),
            Err(other) => {
                log::warn!(
                    "Unusable token response ({}): {}",
                    other,
                    redact_token_body_for_log(&body)
                );
                Err(AccessError::Exchange(other.to_string()))
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for HostedIdentityProvider {
    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        log::debug!("Exchanging authorization code at {}", self.config.token_url());
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("client_id", &self.config.client_id),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        let tokens = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("client_id", &self.config.client_id),
                ("refresh_token", refresh_token),
            ])
            .await?;

        match (tokens.access_token, tokens.id_token) {
            (Some(access_token), Some(id_token)) => Ok(RefreshedTokens {
                access_token,
                id_token,
            }),
            _ => Err(AccessError::Exchange(
                "refresh response missing tokens".to_string(),
            )),
        }
    }
}

/// Stand-in used when no provider is configured, so local commands
/// (status, enroll, open) still work.
pub struct UnconfiguredIdentityProvider;

#[async_trait]
impl IdentityProvider for UnconfiguredIdentityProvider {
    async fn exchange_code(&self, _code: &str) -> Result<TokenSet> {
        Err(AccessError::Exchange(
            "identity provider is not configured (set COGNITO_DOMAIN and COGNITO_CLIENT_ID)"
                .to_string(),
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedTokens> {
        Err(AccessError::Exchange(
            "identity provider is not configured (set COGNITO_DOMAIN and COGNITO_CLIENT_ID)"
                .to_string(),
        ))
    }
}
