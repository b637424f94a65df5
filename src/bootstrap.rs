use crate::config::{GuardConfig, Settings};
use crate::error::Result;
use crate::events::{EventBus, EventKind};
use crate::listeners::{self, BindDirectoryIdentity, IdentityBindings};
use crate::provider::{make_user_provider, ProviderContext, ProviderRegistry, UserProvider};
use std::sync::Arc;

/// Name under which the factory is registered with the host.
pub const PROVIDER_NAME: &str = "ldap";

/// Factory closure invoked by the host each time it needs a provider of a
/// registered name.
pub type ProviderFactory =
    Box<dyn Fn(&ProviderContext, &GuardConfig) -> Result<Arc<dyn UserProvider>> + Send + Sync>;

/// The host authentication subsystem's extension point.
pub trait ProviderRegistrar {
    fn register_provider(&mut self, name: &str, factory: ProviderFactory);
}

/// Wire this crate into the host: register the `ldap` provider factory and
/// subscribe the authentication event listeners. Run once at process start.
pub fn boot(
    registrar: &mut dyn ProviderRegistrar,
    bus: &EventBus,
    bindings: Arc<IdentityBindings>,
    settings: &Settings,
) -> Result<()> {
    let registry = ProviderRegistry::with_builtins();
    let factory_settings = settings.clone();

    registrar.register_provider(
        PROVIDER_NAME,
        Box::new(move |ctx, guard| make_user_provider(&registry, ctx, &factory_settings, guard)),
    );

    wire_events(bus, bindings, settings)
}

/// Subscribe the identity-binding listener, plus the configured logging
/// listeners when logging is enabled.
pub fn wire_events(bus: &EventBus, bindings: Arc<IdentityBindings>, settings: &Settings) -> Result<()> {
    bus.listen(
        &[EventKind::LoginSucceeded, EventKind::Authenticated],
        Arc::new(BindDirectoryIdentity::new(bindings)),
    );

    if settings.logging.enabled {
        for (event, listener) in &settings.logging.events {
            let kind = EventKind::parse(event)?;
            bus.listen(&[kind], listeners::resolve(listener)?);
        }
    }

    Ok(())
}
