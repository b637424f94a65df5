use super::{Credentials, UserProvider, DIRECTORY_PROVIDER};
use crate::error::Result;
use crate::events::{AuthEvent, EventBus, EventKind};
use crate::resolver::ResolveUser;
use crate::store::LocalUser;
use async_trait::async_trait;
use std::sync::Arc;

/// User provider that works purely against the directory, with no local
/// record, hasher or model. Retrieval synthesizes a transient user from the
/// directory entry.
pub struct DirectoryUserProvider {
    resolver: Arc<dyn ResolveUser>,
    bus: Arc<EventBus>,
}

impl DirectoryUserProvider {
    pub fn new(resolver: Arc<dyn ResolveUser>, bus: Arc<EventBus>) -> Self {
        Self { resolver, bus }
    }
}

#[async_trait]
impl UserProvider for DirectoryUserProvider {
    fn kind(&self) -> &'static str {
        DIRECTORY_PROVIDER
    }

    async fn retrieve_by_credentials(&self, credentials: &Credentials) -> Result<Option<LocalUser>> {
        let Some(entry) = self.resolver.find_by_username(&credentials.username).await? else {
            return Ok(None);
        };

        self.bus.dispatch(
            &AuthEvent::new(EventKind::DiscoveredWithCredentials, &credentials.username)
                .with_entry(entry.clone()),
        );

        Ok(Some(LocalUser::from_entry(&entry)))
    }

    async fn validate_credentials(&self, user: &LocalUser, credentials: &Credentials) -> Result<bool> {
        self.bus.dispatch(&AuthEvent::new(EventKind::Authenticating, &user.username));

        let Some(entry) = self.resolver.find_by_username(&user.username).await? else {
            self.bus.dispatch(&AuthEvent::new(EventKind::AuthenticationRejected, &user.username));
            return Ok(false);
        };

        let valid = self.resolver.authenticate(&entry, &credentials.password).await?;

        if valid {
            self.bus.dispatch(
                &AuthEvent::new(EventKind::Authenticated, &user.username)
                    .with_entry(entry)
                    .with_user(user.clone()),
            );
        } else {
            self.bus.dispatch(&AuthEvent::new(EventKind::AuthenticationFailed, &user.username));
        }

        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{creds, StubResolver};

    fn provider(resolver: StubResolver) -> DirectoryUserProvider {
        DirectoryUserProvider::new(Arc::new(resolver), Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn synthesizes_a_user_from_the_directory_entry() {
        let provider = provider(StubResolver::with_user("jdoe", "s3cret"));

        let user = provider.retrieve_by_credentials(&creds("jdoe", "s3cret")).await.unwrap().unwrap();

        assert_eq!(user.username, "jdoe");
        assert!(user.password_hash.is_none());
    }

    #[tokio::test]
    async fn validates_by_binding_as_the_user() {
        let provider = provider(StubResolver::with_user("jdoe", "s3cret"));
        let user = provider.retrieve_by_credentials(&creds("jdoe", "s3cret")).await.unwrap().unwrap();

        assert!(provider.validate_credentials(&user, &creds("jdoe", "s3cret")).await.unwrap());
        assert!(!provider.validate_credentials(&user, &creds("jdoe", "wrong")).await.unwrap());
    }
}
