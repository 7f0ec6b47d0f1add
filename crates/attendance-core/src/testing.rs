//! Scripted collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::authenticator::{
    Assertion, AssertionOptions, AuthenticatorError, Credential, PlatformAuthenticator,
    RegistrationOptions,
};
use crate::error::{AccessError, Result};
use crate::models::{RefreshedTokens, TokenSet};
use crate::session::IdentityProvider;

#[derive(Default)]
pub struct FakeIdentityProvider {
    exchange: Option<std::result::Result<TokenSet, String>>,
    refresh: Option<RefreshedTokens>,
    codes: Mutex<Vec<String>>,
}

impl FakeIdentityProvider {
    pub fn issuing(tokens: TokenSet) -> Self {
        Self {
            exchange: Some(Ok(tokens)),
            ..Default::default()
        }
    }

    pub fn rejecting(error: &str) -> Self {
        Self {
            exchange: Some(Err(error.to_string())),
            ..Default::default()
        }
    }

    pub fn with_refresh(mut self, refreshed: RefreshedTokens) -> Self {
        self.refresh = Some(refreshed);
        self
    }

    pub fn codes_seen(&self) -> Vec<String> {
        self.codes.lock().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        self.codes.lock().push(code.to_string());
        match &self.exchange {
            Some(Ok(tokens)) => Ok(tokens.clone()),
            Some(Err(e)) => Err(AccessError::Exchange(e.clone())),
            None => Err(AccessError::Exchange("no exchange scripted".to_string())),
        }
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedTokens> {
        self.refresh
            .clone()
            .ok_or_else(|| AccessError::Exchange("refresh rejected".to_string()))
    }
}

/// Authenticator stub that hands back `credential_id` from `create` and
/// echoes it (or a scripted failure) from `get`.
pub struct FakeAuthenticator {
    pub supported: bool,
    available: Mutex<bool>,
    credential_id: Vec<u8>,
    next_create: Mutex<Option<AuthenticatorError>>,
    next_get: Mutex<Option<GetScript>>,
    create_calls: AtomicUsize,
    get_calls: AtomicUsize,
    last_assertion: Mutex<Option<AssertionOptions>>,
    last_registration: Mutex<Option<RegistrationOptions>>,
}

pub enum GetScript {
    Fail(AuthenticatorError),
    Echo(Vec<u8>),
    Hang,
}

impl FakeAuthenticator {
    pub fn new(credential_id: &[u8]) -> Self {
        Self {
            supported: true,
            available: Mutex::new(true),
            credential_id: credential_id.to_vec(),
            next_create: Mutex::new(None),
            next_get: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            last_assertion: Mutex::new(None),
            last_registration: Mutex::new(None),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(b"unused")
        }
    }

    pub fn set_available(&self, available: bool) {
        *self.available.lock() = available;
    }

    pub fn fail_next_create(&self, err: AuthenticatorError) {
        *self.next_create.lock() = Some(err);
    }

    pub fn script_next_get(&self, script: GetScript) {
        *self.next_get.lock() = Some(script);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn last_assertion(&self) -> Option<AssertionOptions> {
        self.last_assertion.lock().clone()
    }

    pub fn last_registration(&self) -> Option<RegistrationOptions> {
        self.last_registration.lock().clone()
    }
}

#[async_trait]
impl PlatformAuthenticator for FakeAuthenticator {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn is_available(&self) -> bool {
        *self.available.lock()
    }

    async fn create(&self, options: &RegistrationOptions) -> std::result::Result<Credential, AuthenticatorError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_registration.lock() = Some(options.clone());
        if let Some(err) = self.next_create.lock().take() {
            return Err(err);
        }
        Ok(Credential {
            raw_id: self.credential_id.clone(),
        })
    }

    async fn get(&self, options: &AssertionOptions) -> std::result::Result<Assertion, AuthenticatorError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_assertion.lock() = Some(options.clone());

        let script = self.next_get.lock().take();
        let raw_id = match script {
            Some(GetScript::Fail(err)) => return Err(err),
            Some(GetScript::Echo(id)) => id,
            Some(GetScript::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => self.credential_id.clone(),
        };
        Ok(Assertion {
            raw_id,
            signature: vec![0u8; 64],
        })
    }
}
