use std::sync::Arc;

use attendance_core::{
    AccessGate, BiometricConfig, IdentityProvider, KeyValueStore, MemoryStore, SystemClock,
    TabSession,
};

use crate::config::Settings;
use crate::file_store::JsonFileStore;
use crate::identity_provider::{HostedIdentityProvider, OAuthClientConfig, UnconfiguredIdentityProvider};
use crate::software_authenticator::{Presence, SoftwareAuthenticator};

/// One CLI process is one tab: a fresh tab store over the shared
/// persistent store. Dropping the app runs the tab's unload hook.
pub struct App {
    pub gate: AccessGate,
    pub oauth: Option<OAuthClientConfig>,
    tab: TabSession,
}

impl App {
    pub fn open(settings: &Settings) -> anyhow::Result<Self> {
        let persistent: Arc<dyn KeyValueStore> =
            Arc::new(JsonFileStore::open(settings.store_path())?);
        let tab: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let oauth = OAuthClientConfig::from_settings(settings)?;
        let provider: Arc<dyn IdentityProvider> = match &oauth {
            Some(config) => Arc::new(HostedIdentityProvider::new(config.clone())),
            None => {
                log::debug!("No identity provider configured");
                Arc::new(UnconfiguredIdentityProvider)
            }
        };

        let presence = if settings.assume_present {
            Presence::Assume
        } else {
            Presence::Terminal
        };
        let authenticator = Arc::new(SoftwareAuthenticator::new(
            settings.authenticator_path(),
            presence,
        ));

        let gate = AccessGate::assemble(
            persistent,
            tab,
            Arc::new(SystemClock),
            provider,
            authenticator,
            BiometricConfig {
                rp_id: settings.rp_id.clone(),
                rp_name: settings.rp_name.clone(),
                ..BiometricConfig::default()
            },
        );

        let tab = gate.protected_area().attach()?;
        log::debug!("Attached tab {}", tab.tab_id());

        Ok(Self { gate, oauth, tab })
    }

    pub fn tab_id(&self) -> &str {
        self.tab.tab_id()
    }
}
