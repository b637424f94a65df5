use crate::error::{Error, Result};
use crate::resolver::DirectoryEntry;
use crate::store::LocalUser;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Authentication lifecycle events published by the providers and the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LoginSucceeded,
    Authenticating,
    Authenticated,
    AuthenticationFailed,
    AuthenticationRejected,
    DiscoveredWithCredentials,
    Synchronizing,
    Synchronized,
    Importing,
}

impl EventKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "login-succeeded" => Ok(EventKind::LoginSucceeded),
            "authenticating" => Ok(EventKind::Authenticating),
            "authenticated" => Ok(EventKind::Authenticated),
            "authentication-failed" => Ok(EventKind::AuthenticationFailed),
            "authentication-rejected" => Ok(EventKind::AuthenticationRejected),
            "discovered-with-credentials" => Ok(EventKind::DiscoveredWithCredentials),
            "synchronizing" => Ok(EventKind::Synchronizing),
            "synchronized" => Ok(EventKind::Synchronized),
            "importing" => Ok(EventKind::Importing),
            _ => Err(Error::UnknownEvent { name: name.to_string() }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LoginSucceeded => "login-succeeded",
            EventKind::Authenticating => "authenticating",
            EventKind::Authenticated => "authenticated",
            EventKind::AuthenticationFailed => "authentication-failed",
            EventKind::AuthenticationRejected => "authentication-rejected",
            EventKind::DiscoveredWithCredentials => "discovered-with-credentials",
            EventKind::Synchronizing => "synchronizing",
            EventKind::Synchronized => "synchronized",
            EventKind::Importing => "importing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: EventKind,
    pub username: String,
    pub entry: Option<DirectoryEntry>,
    pub user: Option<LocalUser>,
}

impl AuthEvent {
    pub fn new(kind: EventKind, username: impl Into<String>) -> Self {
        Self {
            kind,
            username: username.into(),
            entry: None,
            user: None,
        }
    }

    pub fn with_entry(mut self, entry: DirectoryEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn with_user(mut self, user: LocalUser) -> Self {
        self.user = Some(user);
        self
    }
}

pub trait EventListener: Send + Sync {
    fn handle(&self, event: &AuthEvent) -> Result<()>;
}

/// Synchronous publish/subscribe table for authentication events.
///
/// Dispatch is fire-and-forget: a failing listener is logged and never
/// interrupts the other listeners or the dispatcher.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<HashMap<EventKind, Vec<Arc<dyn EventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe one listener to each of the given event kinds.
    pub fn listen(&self, kinds: &[EventKind], listener: Arc<dyn EventListener>) {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        for kind in kinds {
            subscriptions.entry(*kind).or_default().push(listener.clone());
        }
    }

    pub fn dispatch(&self, event: &AuthEvent) {
        // Clone the listener list so no lock is held during invocation.
        let listeners: Vec<Arc<dyn EventListener>> = {
            let subscriptions = self.subscriptions.read().unwrap_or_else(|e| e.into_inner());
            subscriptions.get(&event.kind).cloned().unwrap_or_default()
        };

        for listener in listeners {
            if let Err(e) = listener.handle(event) {
                warn!("Listener for {} event failed: {}", event.kind.as_str(), e);
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        let subscriptions = self.subscriptions.read().unwrap_or_else(|e| e.into_inner());
        subscriptions.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        hits: AtomicUsize,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self { hits: AtomicUsize::new(0) })
        }
    }

    impl EventListener for Counting {
        fn handle(&self, _event: &AuthEvent) -> Result<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl EventListener for Failing {
        fn handle(&self, _event: &AuthEvent) -> Result<()> {
            Err(Error::Config("boom".to_string()))
        }
    }

    #[test]
    fn dispatch_reaches_subscribed_kinds_only() {
        let bus = EventBus::new();
        let counting = Counting::new();
        bus.listen(&[EventKind::Authenticated], counting.clone());

        bus.dispatch(&AuthEvent::new(EventKind::Authenticated, "jdoe"));
        bus.dispatch(&AuthEvent::new(EventKind::AuthenticationFailed, "jdoe"));

        assert_eq!(counting.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_subscription_covers_multiple_kinds() {
        let bus = EventBus::new();
        let counting = Counting::new();
        bus.listen(&[EventKind::LoginSucceeded, EventKind::Authenticated], counting.clone());

        assert_eq!(bus.listener_count(EventKind::LoginSucceeded), 1);
        assert_eq!(bus.listener_count(EventKind::Authenticated), 1);

        bus.dispatch(&AuthEvent::new(EventKind::LoginSucceeded, "jdoe"));
        bus.dispatch(&AuthEvent::new(EventKind::Authenticated, "jdoe"));

        assert_eq!(counting.hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let bus = EventBus::new();
        let counting = Counting::new();
        bus.listen(&[EventKind::Authenticated], Arc::new(Failing));
        bus.listen(&[EventKind::Authenticated], counting.clone());

        bus.dispatch(&AuthEvent::new(EventKind::Authenticated, "jdoe"));

        assert_eq!(counting.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_names_round_trip() {
        for kind in [
            EventKind::LoginSucceeded,
            EventKind::Authenticating,
            EventKind::Authenticated,
            EventKind::AuthenticationFailed,
            EventKind::AuthenticationRejected,
            EventKind::DiscoveredWithCredentials,
            EventKind::Synchronizing,
            EventKind::Synchronized,
            EventKind::Importing,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()).unwrap(), kind);
        }

        assert!(matches!(
            EventKind::parse("no-such-event"),
            Err(Error::UnknownEvent { .. })
        ));
    }
}
