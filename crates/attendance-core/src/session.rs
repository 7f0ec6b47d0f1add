use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AccessError, Result};
use crate::models::{IdentitySubject, RefreshedTokens, TokenSet};
use crate::store::{keys, remove_all, KeyValueStore};
use crate::token::decode_identity_subject;

const TOKEN_KEYS: [&str; 3] = [keys::ACCESS_TOKEN, keys::ID_TOKEN, keys::REFRESH_TOKEN];

/// Authorization-code OAuth2 identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<TokenSet>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens>;
}

/// Owns the bearer-token triplet in the persistent store.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    provider: Arc<dyn IdentityProvider>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { store, provider }
    }

    /// Local read only; says nothing about whether the token is still accepted upstream.
    pub fn has_session(&self) -> bool {
        self.store
            .get(keys::ID_TOKEN)
            .is_some_and(|t| !t.is_empty())
    }

    pub fn tokens(&self) -> TokenSet {
        TokenSet {
            access_token: self.store.get(keys::ACCESS_TOKEN),
            id_token: self.store.get(keys::ID_TOKEN),
            refresh_token: self.store.get(keys::REFRESH_TOKEN),
        }
    }

    /// Swap an authorization code for tokens and persist them.
    ///
    /// On failure nothing from this exchange is left in the store. Not retried.
    pub async fn acquire(&self, code: &str) -> Result<()> {
        if code.trim().is_empty() {
            return Err(AccessError::Exchange("empty authorization code".to_string()));
        }

        let tokens = self.provider.exchange_code(code).await.map_err(|e| {
            log::error!("Authentication error: {e}");
            match e {
                AccessError::Exchange(_) => e,
                other => AccessError::Exchange(other.to_string()),
            }
        })?;

        let (Some(access_token), Some(id_token)) = (&tokens.access_token, &tokens.id_token) else {
            return Err(AccessError::Exchange(
                "identity provider returned an incomplete token set".to_string(),
            ));
        };

        if let Err(e) = self.write_tokens(access_token, id_token, tokens.refresh_token.as_deref()) {
            log::error!("Failed to persist tokens, rolling back: {e}");
            if let Err(rollback) = remove_all(self.store.as_ref(), &TOKEN_KEYS) {
                log::error!("Failed to roll back partially written tokens: {rollback}");
            }
            return Err(AccessError::Exchange(format!("failed to persist tokens: {e}")));
        }

        log::info!("Session established");
        Ok(())
    }

    fn write_tokens(
        &self,
        access_token: &str,
        id_token: &str,
        refresh_token: Option<&str>,
    ) -> std::result::Result<(), crate::error::StoreError> {
        self.store.set(keys::ACCESS_TOKEN, access_token)?;
        self.store.set(keys::ID_TOKEN, id_token)?;
        match refresh_token {
            Some(rt) => self.store.set(keys::REFRESH_TOKEN, rt),
            None => self.store.remove(keys::REFRESH_TOKEN),
        }
    }

    /// Trade the stored refresh token for a new access/id pair.
    ///
    /// Any failure ends the session: all tokens are cleared.
    pub async fn refresh(&self) -> Result<()> {
        let result = self.try_refresh().await;
        if let Err(e) = &result {
            log::error!("Token refresh error: {e}");
            self.clear()?;
        }
        result
    }

    async fn try_refresh(&self) -> Result<()> {
        let refresh_token = self
            .store
            .get(keys::REFRESH_TOKEN)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AccessError::Exchange("No refresh token available".to_string()))?;

        let refreshed = self.provider.refresh(&refresh_token).await.map_err(|e| match e {
            AccessError::Exchange(_) => e,
            other => AccessError::Exchange(other.to_string()),
        })?;

        self.store.set(keys::ACCESS_TOKEN, &refreshed.access_token)?;
        self.store.set(keys::ID_TOKEN, &refreshed.id_token)?;
        log::info!("Session tokens refreshed");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        remove_all(self.store.as_ref(), &TOKEN_KEYS)?;
        Ok(())
    }

    /// Subject and email from the stored identity token. No signature check.
    pub fn current_identity_subject(&self) -> Result<IdentitySubject> {
        let id_token = self
            .store
            .get(keys::ID_TOKEN)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AccessError::MalformedToken("no identity token present".to_string()))?;
        decode_identity_subject(&id_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use crate::testing::FakeIdentityProvider;
    use crate::token::mint_id_token;

    fn manager(provider: Arc<FakeIdentityProvider>) -> (Arc<MemoryStore>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), SessionManager::new(store, provider))
    }

    #[test]
    fn fresh_profile_has_no_session() {
        let (_store, session) = manager(Arc::new(FakeIdentityProvider::default()));
        assert!(!session.has_session());
        assert!(matches!(
            session.current_identity_subject(),
            Err(AccessError::MalformedToken(_))
        ));
    }

    #[tokio::test]
    async fn acquire_persists_triplet() {
        let id_token = mint_id_token("sub-1", Some("admin@example.com"));
        let provider = Arc::new(FakeIdentityProvider::issuing(TokenSet::new(
            "at", &id_token, "rt",
        )));
        let (store, session) = manager(provider.clone());

        session.acquire("code-123").await.unwrap();

        assert!(session.has_session());
        assert_eq!(store.get(keys::ACCESS_TOKEN).as_deref(), Some("at"));
        assert_eq!(store.get(keys::REFRESH_TOKEN).as_deref(), Some("rt"));
        assert_eq!(provider.codes_seen(), vec!["code-123".to_string()]);

        let subject = session.current_identity_subject().unwrap();
        assert_eq!(subject.sub, "sub-1");
        assert_eq!(subject.email.as_deref(), Some("admin@example.com"));
    }

    /// Rejects writes to one key.
    struct RejectingStore {
        inner: MemoryStore,
        reject: &'static str,
    }

    impl KeyValueStore for RejectingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
            if key == self.reject {
                return Err(StoreError::write(key, "disk full"));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> std::result::Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn partial_token_write_is_rolled_back() {
        let id_token = mint_id_token("sub-1", None);
        let provider = Arc::new(FakeIdentityProvider::issuing(TokenSet::new(
            "at", &id_token, "rt",
        )));
        let store = Arc::new(RejectingStore {
            inner: MemoryStore::new(),
            reject: keys::REFRESH_TOKEN,
        });
        let session = SessionManager::new(store.clone(), provider);

        let err = session.acquire("code").await.unwrap_err();
        assert!(matches!(err, AccessError::Exchange(_)));
        assert!(store.inner.is_empty());
        assert!(!session.has_session());
    }

    #[tokio::test]
    async fn failed_exchange_persists_nothing() {
        let provider = Arc::new(FakeIdentityProvider::rejecting("invalid_grant"));
        let (store, session) = manager(provider);

        let err = session.acquire("bad-code").await.unwrap_err();
        assert!(matches!(err, AccessError::Exchange(_)));
        assert!(store.is_empty());
        assert!(!session.has_session());
    }

    #[tokio::test]
    async fn incomplete_token_set_is_an_exchange_error() {
        let provider = Arc::new(FakeIdentityProvider::issuing(TokenSet {
            access_token: Some("at".to_string()),
            id_token: None,
            refresh_token: None,
        }));
        let (store, session) = manager(provider);

        assert!(matches!(
            session.acquire("code").await,
            Err(AccessError::Exchange(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let id_token = mint_id_token("sub-1", None);
        let provider = Arc::new(FakeIdentityProvider::issuing(TokenSet::new("at", &id_token, "rt")));
        let (store, session) = manager(provider);
        session.acquire("code").await.unwrap();

        session.clear().unwrap();
        let once = store.snapshot();
        session.clear().unwrap();
        assert_eq!(store.snapshot(), once);
        assert!(!session.has_session());
    }

    #[tokio::test]
    async fn refresh_replaces_access_and_id_tokens() {
        let id_token = mint_id_token("sub-1", None);
        let new_id_token = mint_id_token("sub-1", Some("new@example.com"));
        let provider = Arc::new(
            FakeIdentityProvider::issuing(TokenSet::new("at", &id_token, "rt"))
                .with_refresh(RefreshedTokens {
                    access_token: "at2".to_string(),
                    id_token: new_id_token.clone(),
                }),
        );
        let (store, session) = manager(provider);
        session.acquire("code").await.unwrap();

        session.refresh().await.unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).as_deref(), Some("at2"));
        assert_eq!(store.get(keys::ID_TOKEN), Some(new_id_token));
        assert_eq!(store.get(keys::REFRESH_TOKEN).as_deref(), Some("rt"));
    }

    #[tokio::test]
    async fn failed_refresh_ends_session() {
        let id_token = mint_id_token("sub-1", None);
        let provider = Arc::new(FakeIdentityProvider::issuing(TokenSet::new("at", &id_token, "rt")));
        let (store, session) = manager(provider);
        session.acquire("code").await.unwrap();

        // No refresh result scripted: the fake rejects.
        assert!(session.refresh().await.is_err());
        assert!(!session.has_session());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let (_store, session) = manager(Arc::new(FakeIdentityProvider::default()));
        let err = session.refresh().await.unwrap_err();
        assert_eq!(
            err,
            AccessError::Exchange("No refresh token available".to_string())
        );
    }
}
