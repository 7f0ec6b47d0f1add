//! Software stand-in for a platform authenticator.
//!
//! Holds one ES256 key per state directory and asks for user presence on
//! the terminal before every ceremony.

use std::fs;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use attendance_core::authenticator::{
    Assertion, AssertionOptions, AuthenticatorError, Credential, PlatformAuthenticator,
    RegistrationOptions, ES256,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, Utc};
use p256::{
    ecdsa::{signature::Signer, Signature, SigningKey},
    elliptic_curve::rand_core::OsRng,
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

const CREDENTIAL_ID_LEN: usize = 16;

/// How user presence is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Prompt on stderr and read the answer from stdin.
    Terminal,
    /// Treat every prompt as approved.
    Assume,
}

impl Presence {
    fn is_available(self) -> bool {
        match self {
            Presence::Terminal => std::io::stdin().is_terminal(),
            Presence::Assume => true,
        }
    }

    async fn confirm(self, prompt: &str) -> bool {
        match self {
            Presence::Assume => true,
            Presence::Terminal => {
                eprint!("{prompt} [Y/n] ");
                let _ = std::io::stderr().flush();

                let mut line = String::new();
                let mut stdin = BufReader::new(tokio::io::stdin());
                match stdin.read_line(&mut line).await {
                    Ok(0) | Err(_) => false,
                    Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "" | "y" | "yes"),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    /// base64url
    credential_id: String,
    rp_id: String,
    /// base64url
    user_id: String,
    user_name: String,
    /// base64 PKCS#8 DER
    private_key: String,
    created_at: DateTime<Utc>,
    sign_count: u32,
}

impl StoredCredential {
    fn raw_id(&self) -> Result<Vec<u8>, AuthenticatorError> {
        URL_SAFE_NO_PAD
            .decode(self.credential_id.as_bytes())
            .map_err(|e| AuthenticatorError::Rejected(format!("corrupt credential id: {e}")))
    }

    fn signing_key(&self) -> Result<SigningKey, AuthenticatorError> {
        let der = STANDARD
            .decode(self.private_key.as_bytes())
            .map_err(|e| AuthenticatorError::Rejected(format!("corrupt key: {e}")))?;
        SigningKey::from_pkcs8_der(&der)
            .map_err(|e| AuthenticatorError::Rejected(format!("corrupt key: {e}")))
    }
}

pub struct SoftwareAuthenticator {
    path: PathBuf,
    presence: Presence,
}

impl SoftwareAuthenticator {
    pub fn new(path: impl Into<PathBuf>, presence: Presence) -> Self {
        Self {
            path: path.into(),
            presence,
        }
    }

    fn load(&self) -> Result<Option<StoredCredential>, AuthenticatorError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AuthenticatorError::Rejected(e.to_string())),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AuthenticatorError::Rejected(format!("corrupt authenticator file: {e}")))
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), AuthenticatorError> {
        let raw = serde_json::to_string_pretty(credential)
            .map_err(|e| AuthenticatorError::Rejected(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| AuthenticatorError::Rejected(e.to_string()))?;
            }
        }
        fs::write(&self.path, raw).map_err(|e| AuthenticatorError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl PlatformAuthenticator for SoftwareAuthenticator {
    async fn is_available(&self) -> bool {
        self.presence.is_available()
    }

    async fn create(&self, options: &RegistrationOptions) -> Result<Credential, AuthenticatorError> {
        if !options.pub_key_cred_params.iter().any(|p| p.alg == ES256) {
            return Err(AuthenticatorError::Rejected(
                "no supported public key algorithm offered".to_string(),
            ));
        }

        let prompt = format!(
            "Register a biometric credential for {} on {}?",
            options.user.display_name, options.rp.id
        );
        if !self.presence.confirm(&prompt).await {
            return Err(AuthenticatorError::Cancelled);
        }

        let signing_key = SigningKey::random(&mut OsRng);
        let pkcs8_der = signing_key
            .to_pkcs8_der()
            .map_err(|e| AuthenticatorError::Rejected(e.to_string()))?;
        let raw_id = rand::random::<[u8; CREDENTIAL_ID_LEN]>().to_vec();

        // One credential per device; a new registration replaces the old key.
        self.save(&StoredCredential {
            credential_id: URL_SAFE_NO_PAD.encode(&raw_id),
            rp_id: options.rp.id.clone(),
            user_id: URL_SAFE_NO_PAD.encode(&options.user.id),
            user_name: options.user.name.clone(),
            private_key: STANDARD.encode(pkcs8_der.as_bytes()),
            created_at: Utc::now(),
            sign_count: 0,
        })?;

        log::info!("Created platform credential for {}", options.user.name);
        Ok(Credential { raw_id })
    }

    async fn get(&self, options: &AssertionOptions) -> Result<Assertion, AuthenticatorError> {
        let Some(mut stored) = self.load()? else {
            return Err(AuthenticatorError::UnknownCredential);
        };
        let raw_id = stored.raw_id()?;

        if stored.rp_id != options.rp_id {
            return Err(AuthenticatorError::UnknownCredential);
        }
        if !options.allow_credentials.is_empty()
            && !options.allow_credentials.iter().any(|c| c.id == raw_id)
        {
            return Err(AuthenticatorError::UnknownCredential);
        }

        let prompt = format!("Verify as {} on {}?", stored.user_name, options.rp_id);
        if !self.presence.confirm(&prompt).await {
            return Err(AuthenticatorError::Cancelled);
        }

        let signing_key = stored.signing_key()?;
        let mut message = options.rp_id.as_bytes().to_vec();
        message.extend_from_slice(&options.challenge);
        let signature: Signature = signing_key.sign(&message);

        stored.sign_count = stored.sign_count.saturating_add(1);
        self.save(&stored)?;

        Ok(Assertion {
            raw_id,
            signature: signature.to_der().as_bytes().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendance_core::authenticator::{
        new_challenge, AuthenticatorSelection, CredentialDescriptor, CredentialParameter,
        RelyingParty, UserEntity, UserVerification, RS256,
    };
    use p256::ecdsa::{signature::Verifier, VerifyingKey};

    fn registration(algs: &[i64]) -> RegistrationOptions {
        RegistrationOptions {
            challenge: new_challenge(),
            rp: RelyingParty {
                name: "Attendance App".to_string(),
                id: "localhost".to_string(),
            },
            user: UserEntity {
                id: b"sub-1".to_vec(),
                name: "admin@example.com".to_string(),
                display_name: "Admin User".to_string(),
            },
            pub_key_cred_params: algs.iter().map(|a| CredentialParameter::public_key(*a)).collect(),
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: "platform".to_string(),
                user_verification: UserVerification::Required,
                resident_key: "preferred".to_string(),
            },
            timeout: 60_000,
        }
    }

    fn assertion(rp_id: &str, allow: Vec<Vec<u8>>) -> AssertionOptions {
        AssertionOptions {
            challenge: new_challenge(),
            rp_id: rp_id.to_string(),
            timeout: 60_000,
            user_verification: UserVerification::Required,
            allow_credentials: allow
                .into_iter()
                .map(|id| CredentialDescriptor {
                    kind: "public-key".to_string(),
                    id,
                    transports: vec!["internal".to_string()],
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn signs_challenge_with_registered_key() {
        let dir = tempfile::tempdir().unwrap();
        let auth = SoftwareAuthenticator::new(dir.path().join("authenticator.json"), Presence::Assume);
        assert!(auth.is_available().await);

        let credential = auth.create(&registration(&[ES256, RS256])).await.unwrap();
        assert_eq!(credential.raw_id.len(), CREDENTIAL_ID_LEN);

        let options = assertion("localhost", vec![credential.raw_id.clone()]);
        let result = auth.get(&options).await.unwrap();
        assert_eq!(result.raw_id, credential.raw_id);

        let stored = auth.load().unwrap().unwrap();
        assert_eq!(stored.sign_count, 1);
        let verifying_key = VerifyingKey::from(&stored.signing_key().unwrap());
        let signature = Signature::from_der(&result.signature).unwrap();
        let mut message = b"localhost".to_vec();
        message.extend_from_slice(&options.challenge);
        assert!(verifying_key.verify(&message, &signature).is_ok());
    }

    #[tokio::test]
    async fn unknown_credential_cases() {
        let dir = tempfile::tempdir().unwrap();
        let auth = SoftwareAuthenticator::new(dir.path().join("authenticator.json"), Presence::Assume);

        assert_eq!(
            auth.get(&assertion("localhost", vec![])).await.unwrap_err(),
            AuthenticatorError::UnknownCredential
        );

        let credential = auth.create(&registration(&[ES256])).await.unwrap();
        assert_eq!(
            auth.get(&assertion("other.example", vec![credential.raw_id.clone()]))
                .await
                .unwrap_err(),
            AuthenticatorError::UnknownCredential
        );
        assert_eq!(
            auth.get(&assertion("localhost", vec![b"stale".to_vec()]))
                .await
                .unwrap_err(),
            AuthenticatorError::UnknownCredential
        );
    }

    #[tokio::test]
    async fn rejects_unsupported_algorithms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authenticator.json");
        let auth = SoftwareAuthenticator::new(&path, Presence::Assume);
        assert!(matches!(
            auth.create(&registration(&[RS256])).await,
            Err(AuthenticatorError::Rejected(_))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn reregistration_replaces_credential() {
        let dir = tempfile::tempdir().unwrap();
        let auth = SoftwareAuthenticator::new(dir.path().join("authenticator.json"), Presence::Assume);
        let first = auth.create(&registration(&[ES256])).await.unwrap();
        let second = auth.create(&registration(&[ES256])).await.unwrap();
        assert_ne!(first.raw_id, second.raw_id);
        assert_eq!(
            auth.get(&assertion("localhost", vec![first.raw_id])).await.unwrap_err(),
            AuthenticatorError::UnknownCredential
        );
    }
}
