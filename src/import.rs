use crate::error::Result;
use crate::events::{AuthEvent, EventBus, EventKind};
use crate::resolver::ResolveUser;
use crate::store::{LocalUser, UserStore};
use tracing::info;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

/// Import every directory entry matched by the configured filter into the
/// local identity store. Existing records keep their credential and
/// lifecycle fields; only the directory-sourced attributes are refreshed.
pub async fn import_directory(
    resolver: &dyn ResolveUser,
    store: &dyn UserStore,
    bus: &EventBus,
    model: &str,
) -> Result<ImportSummary> {
    let entries = resolver.list().await?;

    info!("Importing {} directory entries into {}", entries.len(), model);

    let mut summary = ImportSummary::default();

    for entry in entries {
        bus.dispatch(
            &AuthEvent::new(EventKind::Importing, &entry.username).with_entry(entry.clone()),
        );

        let user = match store.find_by_username(model, &entry.username).await? {
            Some(mut user) => {
                user.email = entry.email.clone();
                user.last_modified = chrono::Utc::now().to_rfc3339();
                summary.updated += 1;
                user
            }
            None => {
                summary.created += 1;
                LocalUser::from_entry(&entry)
            }
        };

        store.upsert(model, &user).await?;

        bus.dispatch(
            &AuthEvent::new(EventKind::Synchronized, &user.username)
                .with_entry(entry)
                .with_user(user),
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, MemoryStore, StubResolver};

    #[tokio::test]
    async fn imports_every_directory_entry() {
        let resolver = StubResolver::with_users(&["jdoe", "asmith", "bjones"], "pw");
        let store = MemoryStore::new();
        let bus = EventBus::new();

        let summary = import_directory(&resolver, &store, &bus, "users").await.unwrap();

        assert_eq!(summary.created, 3);
        assert_eq!(summary.updated, 0);
        assert_eq!(store.len(), 3);
        assert!(store.get("users", "asmith").is_some());
    }

    #[tokio::test]
    async fn existing_records_keep_their_credential() {
        let resolver = StubResolver::with_users(&["jdoe"], "pw");
        let store = MemoryStore::new();
        let bus = EventBus::new();

        let mut existing = LocalUser::from_entry(&entry("jdoe"));
        existing.password_hash = Some("plain:old".to_string());
        store.put("users", existing);

        let summary = import_directory(&resolver, &store, &bus, "users").await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(
            store.get("users", "jdoe").unwrap().password_hash.as_deref(),
            Some("plain:old")
        );
    }

    #[tokio::test]
    async fn empty_directory_imports_nothing() {
        let resolver = StubResolver::empty();
        let store = MemoryStore::new();
        let bus = EventBus::new();

        let summary = import_directory(&resolver, &store, &bus, "users").await.unwrap();

        assert_eq!(summary.total(), 0);
        assert_eq!(store.len(), 0);
    }
}
