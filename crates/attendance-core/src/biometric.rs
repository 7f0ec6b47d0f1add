use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};

use crate::authenticator::{
    new_challenge, AssertionOptions, AuthenticatorError, AuthenticatorSelection, CredentialDescriptor,
    CredentialParameter, PlatformAuthenticator, RegistrationOptions, RelyingParty, UserEntity,
    UserVerification, ES256, RS256,
};
use crate::clock::{parse_millis, Clock};
use crate::error::{AccessError, Result};
use crate::models::IdentitySubject;
use crate::protected_area::ProtectedAreaCoordinator;
use crate::store::{keys, remove_all, KeyValueStore};

/// How long a device enrollment may be used before re-registration.
pub const ENROLLMENT_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// How long one successful biometric check counts.
pub const VERIFICATION_TTL_MS: i64 = 30 * 60 * 1000;

pub const CEREMONY_TIMEOUT: Duration = Duration::from_secs(60);

const ENROLLMENT_KEYS: [&str; 5] = [
    keys::CREDENTIAL_ID,
    keys::REGISTERED,
    keys::REGISTRATION_TIME,
    keys::VERIFIED,
    keys::VERIFICATION_TIME,
];

#[derive(Debug, Clone)]
pub struct BiometricConfig {
    pub rp_id: String,
    pub rp_name: String,
    pub timeout: Duration,
}

impl Default for BiometricConfig {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Attendance App".to_string(),
            timeout: CEREMONY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStatus {
    Unsupported,
    Unenrolled,
    Enrolled {
        registered_at: DateTime<Utc>,
        expired: bool,
        verified_until: Option<DateTime<Utc>>,
    },
}

/// One platform credential per device, plus the "verified recently" mark.
///
/// Two independent clocks: the enrollment (30 days) gates whether a
/// verification may be attempted at all, the verification mark (30 minutes)
/// says whether a previous check still counts now.
pub struct BiometricCredentialManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    authenticator: Arc<dyn PlatformAuthenticator>,
    protected_area: ProtectedAreaCoordinator,
    config: BiometricConfig,
}

impl BiometricCredentialManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        authenticator: Arc<dyn PlatformAuthenticator>,
        protected_area: ProtectedAreaCoordinator,
        config: BiometricConfig,
    ) -> Self {
        Self {
            store,
            clock,
            authenticator,
            protected_area,
            config,
        }
    }

    pub fn config(&self) -> &BiometricConfig {
        &self.config
    }

    pub async fn check_support(&self) -> Result<()> {
        if !self.authenticator.is_supported() {
            return Err(AccessError::Unsupported(
                "WebAuthn is not supported in this browser".to_string(),
            ));
        }

        if !self.authenticator.is_available().await {
            return Err(AccessError::Unavailable(
                "Biometric authentication is not available on this device".to_string(),
            ));
        }

        Ok(())
    }

    pub fn registration_options(&self, subject: &IdentitySubject, display_label: &str) -> RegistrationOptions {
        RegistrationOptions {
            challenge: new_challenge(),
            rp: RelyingParty {
                name: self.config.rp_name.clone(),
                id: self.config.rp_id.clone(),
            },
            user: UserEntity {
                id: subject.sub.as_bytes().to_vec(),
                name: subject.user_name().to_string(),
                display_name: display_label.to_string(),
            },
            pub_key_cred_params: vec![
                CredentialParameter::public_key(ES256),
                CredentialParameter::public_key(RS256),
            ],
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: "platform".to_string(),
                user_verification: UserVerification::Required,
                resident_key: "required".to_string(),
            },
            timeout: self.timeout_millis(),
        }
    }

    /// Enroll this device. Any failure wipes the previous enrollment too.
    pub async fn register(&self, subject: &IdentitySubject, display_label: &str) -> Result<()> {
        match self.try_register(subject, display_label).await {
            Ok(()) => {
                log::info!("Biometric credential registered for subject {}", subject.sub);
                Ok(())
            }
            Err(e) => {
                log::error!("Registration failed: {e}");
                self.revoke();
                Err(e)
            }
        }
    }

    async fn try_register(&self, subject: &IdentitySubject, display_label: &str) -> Result<()> {
        self.check_support().await?;

        let options = self.registration_options(subject, display_label);
        let credential = self
            .ceremony(self.authenticator.create(&options))
            .await
            .map_err(|e| AccessError::Registration(e.to_string()))?;

        if credential.raw_id.is_empty() {
            return Err(AccessError::Registration(
                "platform returned an empty credential id".to_string(),
            ));
        }

        // A new credential starts unverified.
        remove_all(self.store.as_ref(), &[keys::VERIFIED, keys::VERIFICATION_TIME])?;

        let now = self.clock.now_millis();
        self.store.set(keys::CREDENTIAL_ID, &BASE64.encode(&credential.raw_id))?;
        self.store.set(keys::REGISTERED, "true")?;
        self.store.set(keys::REGISTRATION_TIME, &now.to_string())?;
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.store
            .get(keys::CREDENTIAL_ID)
            .is_some_and(|id| !id.is_empty())
    }

    fn registered_at_millis(&self) -> Option<i64> {
        parse_millis(self.store.get(keys::REGISTRATION_TIME))
    }

    fn enrollment_expired(&self, now_ms: i64) -> bool {
        match self.registered_at_millis() {
            Some(at) => now_ms - at > ENROLLMENT_TTL_MS,
            // No timestamp counts as infinitely old.
            None => true,
        }
    }

    pub fn assertion_options(&self) -> Result<AssertionOptions> {
        let stored = self
            .store
            .get(keys::CREDENTIAL_ID)
            .filter(|id| !id.is_empty())
            .ok_or(AccessError::EnrollmentExpired)?;
        let credential_id = BASE64
            .decode(stored.as_bytes())
            .map_err(|e| AccessError::Verification(format!("stored credential id is corrupt: {e}")))?;

        Ok(AssertionOptions {
            challenge: new_challenge(),
            rp_id: self.config.rp_id.clone(),
            timeout: self.timeout_millis(),
            user_verification: UserVerification::Required,
            allow_credentials: vec![CredentialDescriptor {
                kind: "public-key".to_string(),
                id: credential_id,
                transports: vec!["internal".to_string()],
            }],
        })
    }

    /// Run the step-up check and, on success, activate the protected area
    /// for this tab.
    ///
    /// Fail-closed: every error, including a cancelled prompt, clears the
    /// enrollment and the protected-area flag.
    pub async fn verify(&self) -> Result<()> {
        match self.try_verify().await {
            Ok(()) => {
                log::info!("Biometric verification succeeded");
                Ok(())
            }
            Err(e) => {
                log::error!("Verification failed: {e}");
                self.revoke();
                Err(e)
            }
        }
    }

    async fn try_verify(&self) -> Result<()> {
        self.check_support().await?;

        // Cheap local check before the human-present prompt.
        if !self.is_registered() || self.enrollment_expired(self.clock.now_millis()) {
            return Err(AccessError::EnrollmentExpired);
        }

        let options = self.assertion_options()?;
        let expected = options
            .allow_credentials
            .first()
            .map(|c| c.id.clone())
            .unwrap_or_default();

        let assertion = self
            .ceremony(self.authenticator.get(&options))
            .await
            .map_err(|e| AccessError::Verification(e.to_string()))?;

        if assertion.raw_id != expected {
            return Err(AccessError::Verification(
                "assertion came from a different credential".to_string(),
            ));
        }

        let now = self.clock.now_millis();
        self.store.set(keys::VERIFIED, "true")?;
        self.store.set(keys::VERIFICATION_TIME, &now.to_string())?;
        self.protected_area.activate()?;
        Ok(())
    }

    /// Computed on read; an expired mark is left in place.
    pub fn is_verification_valid(&self) -> bool {
        match parse_millis(self.store.get(keys::VERIFICATION_TIME)) {
            Some(at) => self.clock.now_millis() - at < VERIFICATION_TTL_MS,
            None => false,
        }
    }

    pub fn clear_registration(&self) -> Result<()> {
        remove_all(self.store.as_ref(), &ENROLLMENT_KEYS)?;
        Ok(())
    }

    pub async fn status(&self) -> RegistrationStatus {
        if self.check_support().await.is_err() {
            return RegistrationStatus::Unsupported;
        }
        if !self.is_registered() {
            return RegistrationStatus::Unenrolled;
        }

        let millis = |ms: i64| Utc.timestamp_millis_opt(ms).single();
        let registered_at = self
            .registered_at_millis()
            .and_then(millis)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let verified_until = if self.is_verification_valid() {
            parse_millis(self.store.get(keys::VERIFICATION_TIME))
                .and_then(|at| millis(at + VERIFICATION_TTL_MS))
        } else {
            None
        };

        RegistrationStatus::Enrolled {
            registered_at,
            expired: self.enrollment_expired(self.clock.now_millis()),
            verified_until,
        }
    }

    fn timeout_millis(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn revoke(&self) {
        if let Err(e) = self.clear_registration() {
            log::error!("Failed to clear biometric registration: {e}");
        }
        if let Err(e) = self.protected_area.clear() {
            log::error!("Failed to clear protected area state: {e}");
        }
    }

    async fn ceremony<T>(
        &self,
        prompt: impl Future<Output = std::result::Result<T, AuthenticatorError>>,
    ) -> std::result::Result<T, AuthenticatorError> {
        match tokio::time::timeout(self.config.timeout, prompt).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthenticatorError::Timeout),
        }
    }
}
