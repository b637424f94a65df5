use crate::error::{Error, Result};
use crate::events::{AuthEvent, EventListener};
use crate::resolver::DirectoryEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Directory entries attached to local users after authentication. The
/// application reads these back to reach the directory-side identity of a
/// logged-in user.
#[derive(Default)]
pub struct IdentityBindings {
    inner: Mutex<HashMap<String, DirectoryEntry>>,
}

impl IdentityBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<DirectoryEntry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).get(username).cloned()
    }

    fn insert(&self, username: String, entry: DirectoryEntry) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).insert(username, entry);
    }
}

/// Attaches the directory-derived identity onto the local user record when
/// a login or authenticated event fires.
pub struct BindDirectoryIdentity {
    bindings: Arc<IdentityBindings>,
}

impl BindDirectoryIdentity {
    pub fn new(bindings: Arc<IdentityBindings>) -> Self {
        Self { bindings }
    }
}

impl EventListener for BindDirectoryIdentity {
    fn handle(&self, event: &AuthEvent) -> Result<()> {
        if let Some(entry) = &event.entry {
            debug!("Binding directory entry {} to user {}", entry.dn, event.username);
            self.bindings.insert(event.username.clone(), entry.clone());
        }
        Ok(())
    }
}

/// Resolves a configured listener identifier to a listener instance.
/// Unknown identifiers are a configuration error.
pub fn resolve(name: &str) -> Result<Arc<dyn EventListener>> {
    match name {
        "log-authentication" => Ok(Arc::new(LogAuthentication)),
        "log-authentication-success" => Ok(Arc::new(LogAuthenticationSuccess)),
        "log-authentication-failure" => Ok(Arc::new(LogAuthenticationFailure)),
        "log-authentication-rejection" => Ok(Arc::new(LogAuthenticationRejection)),
        "log-discovery" => Ok(Arc::new(LogDiscovery)),
        "log-import" => Ok(Arc::new(LogImport)),
        "log-synchronized" => Ok(Arc::new(LogSynchronized)),
        _ => Err(Error::UnknownListener { name: name.to_string() }),
    }
}

pub struct LogAuthentication;

impl EventListener for LogAuthentication {
    fn handle(&self, event: &AuthEvent) -> Result<()> {
        info!("Authenticating user {} against the directory", event.username);
        Ok(())
    }
}

pub struct LogAuthenticationSuccess;

impl EventListener for LogAuthenticationSuccess {
    fn handle(&self, event: &AuthEvent) -> Result<()> {
        info!("User {} successfully authenticated", event.username);
        Ok(())
    }
}

pub struct LogAuthenticationFailure;

impl EventListener for LogAuthenticationFailure {
    fn handle(&self, event: &AuthEvent) -> Result<()> {
        warn!("Authentication failed for user {}", event.username);
        Ok(())
    }
}

pub struct LogAuthenticationRejection;

impl EventListener for LogAuthenticationRejection {
    fn handle(&self, event: &AuthEvent) -> Result<()> {
        warn!("Authentication rejected for user {}", event.username);
        Ok(())
    }
}

pub struct LogDiscovery;

impl EventListener for LogDiscovery {
    fn handle(&self, event: &AuthEvent) -> Result<()> {
        if let Some(entry) = &event.entry {
            debug!("Discovered directory entry {} for user {}", entry.dn, event.username);
        }
        Ok(())
    }
}

pub struct LogImport;

impl EventListener for LogImport {
    fn handle(&self, event: &AuthEvent) -> Result<()> {
        info!("Importing directory user {}", event.username);
        Ok(())
    }
}

pub struct LogSynchronized;

impl EventListener for LogSynchronized {
    fn handle(&self, event: &AuthEvent) -> Result<()> {
        debug!("Synchronized local record for user {}", event.username);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn entry() -> DirectoryEntry {
        DirectoryEntry {
            dn: "uid=jdoe,dc=example,dc=com".to_string(),
            username: "jdoe".to_string(),
            email: Some("jdoe@example.com".to_string()),
            display_name: Some("Jane Doe".to_string()),
        }
    }

    #[test]
    fn binds_entry_on_authenticated_event() {
        let bindings = Arc::new(IdentityBindings::new());
        let listener = BindDirectoryIdentity::new(bindings.clone());

        let event = AuthEvent::new(EventKind::Authenticated, "jdoe").with_entry(entry());
        listener.handle(&event).unwrap();

        assert_eq!(bindings.get("jdoe").unwrap().dn, "uid=jdoe,dc=example,dc=com");
    }

    #[test]
    fn ignores_events_without_an_entry() {
        let bindings = Arc::new(IdentityBindings::new());
        let listener = BindDirectoryIdentity::new(bindings.clone());

        listener.handle(&AuthEvent::new(EventKind::Authenticated, "jdoe")).unwrap();

        assert!(bindings.get("jdoe").is_none());
    }

    #[test]
    fn resolves_known_listener_identifiers() {
        assert!(resolve("log-authentication").is_ok());
        assert!(resolve("log-import").is_ok());
        assert!(matches!(
            resolve("log-everything"),
            Err(Error::UnknownListener { .. })
        ));
    }
}
