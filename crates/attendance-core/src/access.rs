use std::sync::Arc;

use crate::biometric::{BiometricConfig, BiometricCredentialManager};
use crate::clock::Clock;
use crate::authenticator::PlatformAuthenticator;
use crate::error::{AccessError, Result};
use crate::protected_area::ProtectedAreaCoordinator;
use crate::session::{IdentityProvider, SessionManager};
use crate::store::KeyValueStore;

/// What a screen needs before it may render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Public,
    /// Owner-gated landing page. Entering it drops the protected-area flag.
    Landing,
    /// Needs a session only.
    OwnerGated,
    /// Needs a session plus a biometric step-up in this tab.
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    Login,
    RegisterBiometric,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect {
        to: RedirectTarget,
        /// Surfaced to the user on the target screen.
        error: Option<AccessError>,
    },
}

impl Decision {
    pub fn redirect(to: RedirectTarget) -> Self {
        Decision::Redirect { to, error: None }
    }

    pub fn redirect_with(to: RedirectTarget, error: AccessError) -> Self {
        Decision::Redirect {
            to,
            error: Some(error),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Composes session, biometric and protected-area state into the single
/// decision every route guard uses.
///
/// Constructed once at startup and passed by reference to whatever needs it.
pub struct AccessGate {
    session: SessionManager,
    biometric: BiometricCredentialManager,
    protected_area: ProtectedAreaCoordinator,
}

impl AccessGate {
    pub fn new(
        session: SessionManager,
        biometric: BiometricCredentialManager,
        protected_area: ProtectedAreaCoordinator,
    ) -> Self {
        Self {
            session,
            biometric,
            protected_area,
        }
    }

    /// Wire every component over one persistent store, one tab store and one clock.
    pub fn assemble(
        persistent: Arc<dyn KeyValueStore>,
        tab: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn IdentityProvider>,
        authenticator: Arc<dyn PlatformAuthenticator>,
        config: BiometricConfig,
    ) -> Self {
        let protected_area = ProtectedAreaCoordinator::new(persistent.clone(), tab);
        let session = SessionManager::new(persistent.clone(), provider);
        let biometric = BiometricCredentialManager::new(
            persistent,
            clock,
            authenticator,
            protected_area.clone(),
            config,
        );
        Self::new(session, biometric, protected_area)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn biometric(&self) -> &BiometricCredentialManager {
        &self.biometric
    }

    pub fn protected_area(&self) -> &ProtectedAreaCoordinator {
        &self.protected_area
    }

    /// The protected flag only counts while a session exists.
    pub fn is_in_protected_area(&self) -> bool {
        self.session.has_session() && self.protected_area.is_active()
    }

    pub async fn decide(&self, area: Area) -> Decision {
        if !self.session.has_session() {
            log::debug!("No session; redirecting to login");
            return Decision::redirect(RedirectTarget::Login);
        }

        match area {
            Area::Public | Area::OwnerGated => Decision::Allow,
            Area::Landing => {
                if let Err(e) = self.protected_area.clear() {
                    log::error!("Failed to clear protected area on landing: {e}");
                }
                Decision::Allow
            }
            Area::Protected => self.step_up().await,
        }
    }

    async fn step_up(&self) -> Decision {
        if self.protected_area.is_active() {
            return Decision::Allow;
        }

        if let Err(e) = self.biometric.check_support().await {
            log::warn!("Access failed: {e}");
            return Decision::redirect_with(RedirectTarget::Login, e);
        }

        if !self.biometric.is_registered() {
            return Decision::redirect(RedirectTarget::RegisterBiometric);
        }

        match self.biometric.verify().await {
            Ok(()) => Decision::Allow,
            Err(e @ (AccessError::EnrollmentExpired | AccessError::Verification(_))) => {
                Decision::redirect_with(RedirectTarget::RegisterBiometric, e)
            }
            Err(e) => {
                log::warn!("Access failed: {e}");
                Decision::redirect_with(RedirectTarget::Login, e)
            }
        }
    }

    /// Callback screen: finish the code exchange. `Ok` means land on the
    /// welcome page, `Err` on the login page.
    pub async fn complete_login(&self, code: &str) -> Result<()> {
        self.session.acquire(code).await.map_err(|e| {
            log::error!("Auth callback error: {e}");
            e
        })
    }

    /// Registration screen: enroll this device for the signed-in subject.
    pub async fn enroll(&self, display_label: &str) -> Result<()> {
        if !self.session.has_session() {
            return Err(AccessError::MalformedToken("no identity token present".to_string()));
        }
        let subject = self.session.current_identity_subject()?;
        self.biometric.register(&subject, display_label).await
    }

    /// Logout: tokens go and the protected flag is dropped whoever owns it.
    /// The device enrollment stays.
    pub fn sign_out(&self) -> Result<()> {
        let session = self.session.clear();
        let area = self.protected_area.clear_all().map_err(AccessError::from);
        log::info!("Signed out");
        session.and(area)
    }
}
