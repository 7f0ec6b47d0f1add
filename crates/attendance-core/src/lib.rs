//! Credential and session state machine behind the attendance app's
//! administrative screens.
//!
//! Access to a protected screen needs three things: a bearer-token session
//! from the identity provider, a recent biometric step-up on this device,
//! and a protected-area flag owned by the current tab. [`AccessGate`] turns
//! those into one [`Decision`] per navigation.
//!
//! Browser capabilities (storage, platform authenticator, time) are injected
//! through [`KeyValueStore`], [`PlatformAuthenticator`] and [`Clock`].

pub mod access;
pub mod authenticator;
pub mod biometric;
pub mod clock;
pub mod error;
pub mod models;
pub mod oauth;
pub mod protected_area;
pub mod routes;
pub mod session;
pub mod store;
pub mod token;

#[cfg(test)]
mod testing;

pub use access::{AccessGate, Area, Decision, RedirectTarget};
pub use authenticator::PlatformAuthenticator;
pub use biometric::{BiometricConfig, BiometricCredentialManager, RegistrationStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AccessError, StoreError};
pub use models::{IdentitySubject, RefreshedTokens, TokenSet};
pub use protected_area::{ProtectedAreaCoordinator, TabSession};
pub use routes::{guard, Navigation, Route};
pub use session::{IdentityProvider, SessionManager};
pub use store::{KeyValueStore, MemoryStore};
