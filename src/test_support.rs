//! In-memory doubles for the directory, store and hasher collaborators.

use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::hasher::Hasher;
use crate::provider::{Credentials, ProviderContext};
use crate::resolver::{DirectoryEntry, ResolveUser};
use crate::store::{LocalUser, UserStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn entry(username: &str) -> DirectoryEntry {
    DirectoryEntry {
        dn: format!("uid={username},dc=example,dc=com"),
        username: username.to_string(),
        email: Some(format!("{username}@example.com")),
        display_name: Some(username.to_string()),
    }
}

pub fn creds(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }
}

/// Directory double. `password: None` makes bind attempts fail with an
/// error, simulating an unreachable directory.
pub struct StubResolver {
    entries: Vec<DirectoryEntry>,
    password: Option<String>,
}

impl StubResolver {
    pub fn with_user(username: &str, password: &str) -> Self {
        Self {
            entries: vec![entry(username)],
            password: Some(password.to_string()),
        }
    }

    pub fn with_users(usernames: &[&str], password: &str) -> Self {
        Self {
            entries: usernames.iter().map(|u| entry(u)).collect(),
            password: Some(password.to_string()),
        }
    }

    pub fn empty() -> Self {
        Self { entries: Vec::new(), password: Some(String::new()) }
    }

    pub fn unavailable(username: &str) -> Self {
        Self { entries: vec![entry(username)], password: None }
    }
}

#[async_trait]
impl ResolveUser for StubResolver {
    async fn find_by_username(&self, username: &str) -> Result<Option<DirectoryEntry>> {
        Ok(self.entries.iter().find(|e| e.username == username).cloned())
    }

    async fn authenticate(&self, _entry: &DirectoryEntry, password: &str) -> Result<bool> {
        match &self.password {
            Some(expected) => Ok(!password.is_empty() && password == expected.as_str()),
            None => Err(Error::Config("directory unavailable".to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<DirectoryEntry>> {
        Ok(self.entries.clone())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, String), LocalUser>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model: &str, username: &str) -> Option<LocalUser> {
        self.records.lock().unwrap().get(&(model.to_string(), username.to_string())).cloned()
    }

    pub fn put(&self, model: &str, user: LocalUser) {
        self.records
            .lock()
            .unwrap()
            .insert((model.to_string(), user.username.clone()), user);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_username(&self, model: &str, username: &str) -> Result<Option<LocalUser>> {
        Ok(self.get(model, username))
    }

    async fn upsert(&self, model: &str, user: &LocalUser) -> Result<()> {
        self.put(model, user.clone());
        Ok(())
    }
}

/// Reversible stand-in for the real hashers.
pub struct PlainHasher;

impl Hasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        hash == format!("plain:{password}")
    }
}

pub fn context() -> ProviderContext {
    ProviderContext {
        hasher: Arc::new(PlainHasher),
        resolver: Arc::new(StubResolver::with_user("jdoe", "s3cret")),
        store: Arc::new(MemoryStore::new()),
        bus: Arc::new(EventBus::new()),
    }
}
