use serde::{Deserialize, Serialize};

/// Token triplet returned by the identity provider's token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenSet {
    pub fn new(
        access_token: impl Into<String>,
        id_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            id_token: Some(id_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }
}

/// Result of a refresh-token grant. The provider does not rotate the
/// refresh token, so only these two come back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub id_token: String,
}

/// Claims read out of the identity token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySubject {
    /// Subject (provider user id)
    pub sub: String,

    #[serde(default)]
    pub email: Option<String>,
}

impl IdentitySubject {
    /// Name shown by the platform authenticator; the email when we have one.
    pub fn user_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.sub)
    }
}
