//! Platform authenticator capability (WebAuthn-shaped).
//!
//! The option structs serialize to the camelCase JSON a browser's
//! `navigator.credentials` API expects, with binary fields as base64url, so
//! a bridge can hand them over unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// COSE algorithm identifiers, in preference order.
pub const ES256: i64 = -7;
pub const RS256: i64 = -257;

pub const CHALLENGE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticatorError {
    #[error("the user cancelled the prompt")]
    Cancelled,

    #[error("the ceremony timed out")]
    Timeout,

    #[error("no matching credential on this device")]
    UnknownCredential,

    #[error("platform rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingParty {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    #[serde(with = "b64url")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialParameter {
    #[serde(rename = "type")]
    pub kind: String,
    pub alg: i64,
}

impl CredentialParameter {
    pub fn public_key(alg: i64) -> Self {
        Self {
            kind: "public-key".to_string(),
            alg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub authenticator_attachment: String,
    pub user_verification: UserVerification,
    pub resident_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    #[serde(with = "b64url")]
    pub challenge: Vec<u8>,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub authenticator_selection: AuthenticatorSelection,
    /// Milliseconds
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "b64url")]
    pub id: Vec<u8>,
    pub transports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionOptions {
    #[serde(with = "b64url")]
    pub challenge: Vec<u8>,
    pub rp_id: String,
    /// Milliseconds
    pub timeout: u64,
    pub user_verification: UserVerification,
    pub allow_credentials: Vec<CredentialDescriptor>,
}

/// Newly created credential. Only the raw id is kept locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub raw_id: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub raw_id: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Device-local biometric ceremony provider.
///
/// Every call to `create`/`get` is a one-shot, human-present prompt. Callers
/// must never retry them on their own.
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Whether the platform has a credential API at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// Whether a user-verifying platform authenticator is usable right now.
    async fn is_available(&self) -> bool;

    async fn create(&self, options: &RegistrationOptions) -> Result<Credential, AuthenticatorError>;

    async fn get(&self, options: &AssertionOptions) -> Result<Assertion, AuthenticatorError>;
}

pub fn new_challenge() -> Vec<u8> {
    rand::random::<[u8; CHALLENGE_LEN]>().to_vec()
}

mod b64url {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        URL_SAFE_NO_PAD
            .decode(raw.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
