use crate::config::{GuardConfig, Settings};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::hasher::Hasher;
use crate::resolver::ResolveUser;
use crate::store::{LocalUser, UserStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod database;
pub mod directory;

pub use database::DatabaseUserProvider;
pub use directory::DirectoryUserProvider;

/// Kind identifier of the database-backed provider, the default.
pub const DATABASE_PROVIDER: &str = "database";
/// Kind identifier of the directory-only provider.
pub const DIRECTORY_PROVIDER: &str = "directory";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Looks up and validates a local credential-holder on behalf of the host's
/// authentication subsystem.
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Kind identifier of this provider, used in log output.
    fn kind(&self) -> &'static str;

    /// Resolve the user the credentials belong to, or None when the
    /// directory knows no such user.
    async fn retrieve_by_credentials(&self, credentials: &Credentials) -> Result<Option<LocalUser>>;

    /// Verify the credentials for a previously retrieved user.
    async fn validate_credentials(&self, user: &LocalUser, credentials: &Credentials) -> Result<bool>;
}

/// Collaborators handed to the provider factory by the host at construction
/// time. Everything a provider needs is passed in here explicitly; nothing
/// is resolved through ambient state.
#[derive(Clone)]
pub struct ProviderContext {
    pub hasher: Arc<dyn Hasher>,
    pub resolver: Arc<dyn ResolveUser>,
    pub store: Arc<dyn UserStore>,
    pub bus: Arc<EventBus>,
}

type VariantFactory = Box<dyn Fn(&ProviderContext) -> Arc<dyn UserProvider> + Send + Sync>;

/// Registry of provider kinds constructible without per-variant parameters.
/// The database-backed kind is not registered here; it is special-cased by
/// the selector because it alone takes the hasher and model.
pub struct ProviderRegistry {
    factories: HashMap<String, VariantFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// A registry populated with the built-in provider kinds.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DIRECTORY_PROVIDER, |ctx| {
            Arc::new(DirectoryUserProvider::new(ctx.resolver.clone(), ctx.bus.clone()))
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderContext) -> Arc<dyn UserProvider> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

/// Resolves the model identifier for the database-backed provider. The
/// crate-level setting wins over the guard mapping; absence of both is a
/// fatal configuration error naming the provider kind.
fn resolve_model<'a>(settings: &'a Settings, guard: &'a GuardConfig, kind: &str) -> Result<&'a str> {
    settings
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .or_else(|| guard.model.as_deref().filter(|m| !m.is_empty()))
        .ok_or_else(|| Error::MissingModel { provider: kind.to_string() })
}

/// Construct the configured user provider. Builds a fresh instance on every
/// call from the given arguments alone.
pub fn make_user_provider(
    registry: &ProviderRegistry,
    ctx: &ProviderContext,
    settings: &Settings,
    guard: &GuardConfig,
) -> Result<Arc<dyn UserProvider>> {
    let kind = settings.provider.as_deref().unwrap_or(DATABASE_PROVIDER);

    if kind == DATABASE_PROVIDER {
        let model = resolve_model(settings, guard, kind)?;

        return Ok(Arc::new(DatabaseUserProvider::new(
            ctx.hasher.clone(),
            model.to_string(),
            ctx.resolver.clone(),
            ctx.store.clone(),
            ctx.bus.clone(),
        )));
    }

    match registry.factories.get(kind) {
        Some(factory) => Ok(factory(ctx)),
        None => Err(Error::UnknownProvider { name: kind.to_string() }),
    }
}
