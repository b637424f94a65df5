use super::{Credentials, UserProvider, DATABASE_PROVIDER};
use crate::error::Result;
use crate::events::{AuthEvent, EventBus, EventKind};
use crate::hasher::Hasher;
use crate::resolver::{DirectoryEntry, ResolveUser};
use crate::store::{LocalUser, UserStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// User provider that mirrors directory identities into a local database
/// record. Retrieval synchronizes the directory entry into the store under
/// the configured model; validation binds against the directory, falling
/// back to the locally stored hash when the directory is unreachable.
pub struct DatabaseUserProvider {
    hasher: Arc<dyn Hasher>,
    model: String,
    resolver: Arc<dyn ResolveUser>,
    store: Arc<dyn UserStore>,
    bus: Arc<EventBus>,
}

impl DatabaseUserProvider {
    pub fn new(
        hasher: Arc<dyn Hasher>,
        model: String,
        resolver: Arc<dyn ResolveUser>,
        store: Arc<dyn UserStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { hasher, model, resolver, store, bus }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Mirror the directory entry into the local store, carrying over the
    /// lifecycle fields of an existing record.
    async fn synchronize(&self, credentials: &Credentials, entry: &DirectoryEntry) -> Result<LocalUser> {
        self.bus.dispatch(
            &AuthEvent::new(EventKind::Synchronizing, &credentials.username).with_entry(entry.clone()),
        );

        let existing = self.store.find_by_username(&self.model, &entry.username).await?;

        let mut user = match existing {
            Some(existing) => {
                let mut user = existing;
                user.email = entry.email.clone();
                user.last_modified = chrono::Utc::now().to_rfc3339();
                user
            }
            None => LocalUser::from_entry(entry),
        };

        // Keep the local credential in step with the directory password.
        user.password_hash = Some(self.hasher.hash(&credentials.password)?);

        self.store.upsert(&self.model, &user).await?;

        self.bus.dispatch(
            &AuthEvent::new(EventKind::Synchronized, &user.username)
                .with_entry(entry.clone())
                .with_user(user.clone()),
        );

        Ok(user)
    }

    fn validate_against_local_hash(&self, user: &LocalUser, credentials: &Credentials) -> Result<bool> {
        let Some(hash) = &user.password_hash else {
            debug!("No local credential stored for {}", user.username);
            self.bus.dispatch(&AuthEvent::new(EventKind::AuthenticationFailed, &user.username));
            return Ok(false);
        };

        let valid = self.hasher.verify(&credentials.password, hash);

        let kind = if valid { EventKind::Authenticated } else { EventKind::AuthenticationFailed };
        self.bus.dispatch(&AuthEvent::new(kind, &user.username).with_user(user.clone()));

        Ok(valid)
    }
}

#[async_trait]
impl UserProvider for DatabaseUserProvider {
    fn kind(&self) -> &'static str {
        DATABASE_PROVIDER
    }

    async fn retrieve_by_credentials(&self, credentials: &Credentials) -> Result<Option<LocalUser>> {
        let Some(entry) = self.resolver.find_by_username(&credentials.username).await? else {
            return Ok(None);
        };

        self.bus.dispatch(
            &AuthEvent::new(EventKind::DiscoveredWithCredentials, &credentials.username)
                .with_entry(entry.clone()),
        );

        let user = self.synchronize(credentials, &entry).await?;

        Ok(Some(user))
    }

    async fn validate_credentials(&self, user: &LocalUser, credentials: &Credentials) -> Result<bool> {
        if !user.enabled {
            self.bus.dispatch(&AuthEvent::new(EventKind::AuthenticationRejected, &user.username));
            return Ok(false);
        }

        self.bus.dispatch(&AuthEvent::new(EventKind::Authenticating, &user.username));

        let entry = match self.resolver.find_by_username(&user.username).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                // Known locally but gone from the directory.
                self.bus.dispatch(&AuthEvent::new(EventKind::AuthenticationRejected, &user.username));
                return Ok(false);
            }
            Err(e) => {
                warn!("Directory lookup failed for {}: {}; using local credential", user.username, e);
                return self.validate_against_local_hash(user, credentials);
            }
        };

        match self.resolver.authenticate(&entry, &credentials.password).await {
            Ok(true) => {
                self.bus.dispatch(
                    &AuthEvent::new(EventKind::Authenticated, &user.username)
                        .with_entry(entry)
                        .with_user(user.clone()),
                );
                Ok(true)
            }
            Ok(false) => {
                self.bus.dispatch(&AuthEvent::new(EventKind::AuthenticationFailed, &user.username));
                Ok(false)
            }
            Err(e) => {
                warn!("Directory bind failed for {}: {}; using local credential", user.username, e);
                self.validate_against_local_hash(user, credentials)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{creds, entry, MemoryStore, PlainHasher, StubResolver};
    use std::sync::Arc;

    fn provider(resolver: StubResolver, store: Arc<MemoryStore>) -> DatabaseUserProvider {
        DatabaseUserProvider::new(
            Arc::new(PlainHasher),
            "users".to_string(),
            Arc::new(resolver),
            store,
            Arc::new(EventBus::new()),
        )
    }

    #[tokio::test]
    async fn retrieval_synchronizes_a_new_local_record() {
        let store = Arc::new(MemoryStore::new());
        let provider = provider(StubResolver::with_user("jdoe", "s3cret"), store.clone());

        let user = provider.retrieve_by_credentials(&creds("jdoe", "s3cret")).await.unwrap().unwrap();

        assert_eq!(user.username, "jdoe");
        assert_eq!(user.password_hash.as_deref(), Some("plain:s3cret"));

        let stored = store.get("users", "jdoe").unwrap();
        assert_eq!(stored.email, entry("jdoe").email);
        assert!(stored.enabled);
    }

    #[tokio::test]
    async fn retrieval_preserves_existing_lifecycle_fields() {
        let store = Arc::new(MemoryStore::new());
        let mut existing = LocalUser::from_entry(&entry("jdoe"));
        existing.created_at = "2020-01-01T00:00:00+00:00".to_string();
        existing.enabled = false;
        store.put("users", existing);

        let provider = provider(StubResolver::with_user("jdoe", "s3cret"), store.clone());
        let user = provider.retrieve_by_credentials(&creds("jdoe", "s3cret")).await.unwrap().unwrap();

        assert_eq!(user.created_at, "2020-01-01T00:00:00+00:00");
        assert!(!user.enabled);
    }

    #[tokio::test]
    async fn retrieval_returns_none_for_unknown_directory_users() {
        let store = Arc::new(MemoryStore::new());
        let provider = provider(StubResolver::empty(), store);

        let user = provider.retrieve_by_credentials(&creds("ghost", "pw")).await.unwrap();

        assert!(user.is_none());
    }

    #[tokio::test]
    async fn validation_binds_against_the_directory() {
        let store = Arc::new(MemoryStore::new());
        let provider = provider(StubResolver::with_user("jdoe", "s3cret"), store);
        let user = LocalUser::from_entry(&entry("jdoe"));

        assert!(provider.validate_credentials(&user, &creds("jdoe", "s3cret")).await.unwrap());
        assert!(!provider.validate_credentials(&user, &creds("jdoe", "wrong")).await.unwrap());
    }

    #[tokio::test]
    async fn validation_falls_back_to_local_hash_when_directory_is_down() {
        let store = Arc::new(MemoryStore::new());
        let provider = provider(StubResolver::unavailable("jdoe"), store);

        let mut user = LocalUser::from_entry(&entry("jdoe"));
        user.password_hash = Some("plain:s3cret".to_string());

        assert!(provider.validate_credentials(&user, &creds("jdoe", "s3cret")).await.unwrap());
        assert!(!provider.validate_credentials(&user, &creds("jdoe", "wrong")).await.unwrap());
    }

    #[tokio::test]
    async fn disabled_users_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let provider = provider(StubResolver::with_user("jdoe", "s3cret"), store);

        let mut user = LocalUser::from_entry(&entry("jdoe"));
        user.enabled = false;

        assert!(!provider.validate_credentials(&user, &creds("jdoe", "s3cret")).await.unwrap());
    }
}
