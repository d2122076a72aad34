//! Type-keyed registry of channel factories and the services their
//! configuration callbacks need.
//!
//! Design goals:
//! - One channel factory per contract type, built once and shared read-only.
//! - First registration wins: registering the same contract again never
//!   replaces an existing factory or recipe.
//! - Configuration callbacks run exactly once, while the factory is built.
//! - No ambient globals: the registry is an explicit object passed by
//!   reference to whoever needs it.
//!
//! Implementation details:
//! - Key = `type_name::<C>()`, which works for `C = dyn Contract`.
//! - Value = `Arc<Mutex<Registration<C>>>` stored as `Box<dyn Any + Send + Sync>`
//!   (downcast on read). The map lock is never held while a factory is built.
//! - Callbacks run without any registry lock held. A callback may resolve
//!   other contracts or services; resolving its own contract returns
//!   [`ChannelError::FactoryUnavailable`] instead of waiting on itself.
//! - A callback that panics leaves the contract failed, never half configured.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};

use crate::address::EndpointAddress;
use crate::binding::Binding;
use crate::channel::ClientChannel;
use crate::endpoint::ServiceEndpoint;
use crate::error::ChannelError;
use crate::factory::ChannelFactory;
use crate::handle::ChannelHandle;

/// Stable type key for contracts and services.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
struct TypeKey(&'static str);

impl TypeKey {
    #[inline]
    fn of<T: ?Sized + 'static>() -> Self {
        TypeKey(std::any::type_name::<T>())
    }

    fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Endpoint configuration callback, run once when the factory is built.
pub type ConfigureEndpoint = Arc<dyn Fn(&ChannelRegistry, &mut ServiceEndpoint) + Send + Sync>;

/// Wrap a closure as a [`ConfigureEndpoint`].
pub fn configure_endpoint<F>(f: F) -> ConfigureEndpoint
where
    F: Fn(&ChannelRegistry, &mut ServiceEndpoint) + Send + Sync + 'static,
{
    Arc::new(f)
}

type Boxed = Box<dyn Any + Send + Sync>;

struct Recipe<C: ?Sized> {
    binding: Arc<dyn Binding<C>>,
    address: EndpointAddress,
}

enum FactorySlot<C: ?Sized> {
    Pending,
    /// Callbacks are running on the given thread.
    Building(ThreadId),
    Built(Arc<ChannelFactory<C>>),
    Failed(String),
}

struct Registration<C: ?Sized> {
    recipe: Option<Recipe<C>>,
    configure: Vec<ConfigureEndpoint>,
    factory: FactorySlot<C>,
}

impl<C: ?Sized + 'static> Registration<C> {
    fn shared(
        recipe: Option<Recipe<C>>,
        configure: Vec<ConfigureEndpoint>,
        factory: FactorySlot<C>,
    ) -> Shared<C> {
        Arc::new(RegistrationCell {
            state: Mutex::new(Self {
                recipe,
                configure,
                factory,
            }),
            build: Mutex::new(()),
        })
    }

    fn push_configure(&mut self, contract: &'static str, configure: ConfigureEndpoint) -> bool {
        if matches!(self.factory, FactorySlot::Pending) {
            self.configure.push(configure);
            true
        } else {
            tracing::warn!(
                contract,
                "channel factory already built, configuration callback ignored"
            );
            false
        }
    }

    /// Outcome of an earlier build, if there is one this caller may use.
    fn settled(&self, contract: &'static str) -> Option<Result<Arc<ChannelFactory<C>>, ChannelError>> {
        match &self.factory {
            FactorySlot::Built(factory) => Some(Ok(Arc::clone(factory))),
            FactorySlot::Failed(reason) => Some(Err(ChannelError::FactoryUnavailable {
                contract,
                reason: reason.clone(),
            })),
            FactorySlot::Building(owner) if *owner == thread::current().id() => {
                Some(Err(ChannelError::FactoryUnavailable {
                    contract,
                    reason: "resolved from its own configuration callback".to_owned(),
                }))
            }
            FactorySlot::Building(_) | FactorySlot::Pending => None,
        }
    }
}

/// `state` is only locked briefly; `build` is held for the whole factory
/// build so that concurrent resolvers wait for its outcome.
struct RegistrationCell<C: ?Sized> {
    state: Mutex<Registration<C>>,
    build: Mutex<()>,
}

type Shared<C> = Arc<RegistrationCell<C>>;

/// Marks the contract failed if the build unwinds before recording a result.
struct BuildGuard<'a, C: ?Sized + 'static> {
    cell: &'a RegistrationCell<C>,
    contract: &'static str,
    armed: bool,
}

impl<C: ?Sized + 'static> BuildGuard<'_, C> {
    fn finish(mut self, slot: FactorySlot<C>) {
        self.cell.state.lock().factory = slot;
        self.armed = false;
    }
}

impl<C: ?Sized + 'static> Drop for BuildGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            tracing::error!(contract = self.contract, "channel factory build panicked");
            self.cell.state.lock().factory =
                FactorySlot::Failed("configuration callback panicked".to_owned());
        }
    }
}

/// Registry of channel factories keyed by contract type.
pub struct ChannelRegistry {
    clients: RwLock<HashMap<TypeKey, Boxed>>,
    services: RwLock<HashMap<TypeKey, Boxed>>,
}

impl ChannelRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            services: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// Register contract `C` to be served by `binding` at `address`.
    ///
    /// The factory itself is built lazily, on first resolution. Registering
    /// a contract that already has a factory (or a recipe for one) keeps the
    /// existing one; only `configure` is appended, and only while the factory
    /// has not been built yet.
    ///
    /// # Errors
    /// Returns [`ChannelError::InvalidArgument`] for a missing or malformed
    /// address, at registration time.
    pub fn register_client<C>(
        &self,
        binding: Arc<dyn Binding<C>>,
        address: &str,
        configure: Option<ConfigureEndpoint>,
    ) -> Result<&Self, ChannelError>
    where
        C: ?Sized + ClientChannel,
    {
        let address = EndpointAddress::parse(address)?;
        let key = TypeKey::of::<C>();

        let mut clients = self.clients.write();
        match clients.entry(key) {
            Entry::Occupied(entry) => {
                let registration = Self::downcast::<C>(key, entry.get())?;
                tracing::debug!(contract = key.name(), "client already registered, keeping first registration");
                if let Some(configure) = configure {
                    registration.state.lock().push_configure(key.name(), configure);
                }
            }
            Entry::Vacant(entry) => {
                tracing::debug!(contract = key.name(), binding = binding.name(), %address, "client registered");
                let registration = Registration::shared(
                    Some(Recipe { binding, address }),
                    configure.into_iter().collect(),
                    FactorySlot::Pending,
                );
                entry.insert(Box::new(registration));
            }
        }
        Ok(self)
    }

    /// Append a configuration callback for contract `C`.
    ///
    /// Returns `false` if `C` is not registered or its factory has already
    /// been built (or is being built), in which case the callback is dropped.
    pub fn configure_client<C>(&self, configure: ConfigureEndpoint) -> bool
    where
        C: ?Sized + ClientChannel,
    {
        let key = TypeKey::of::<C>();
        let Ok(registration) = self.registration::<C>() else {
            return false;
        };
        registration.state.lock().push_configure(key.name(), configure)
    }

    /// Pre-register an already built factory for contract `C`.
    ///
    /// Returns `false` (and keeps the existing entry) if `C` is already
    /// registered.
    pub fn add_channel_factory<C>(&self, factory: Arc<ChannelFactory<C>>) -> bool
    where
        C: ?Sized + ClientChannel,
    {
        let key = TypeKey::of::<C>();
        let mut clients = self.clients.write();
        match clients.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let registration =
                    Registration::shared(None, Vec::new(), FactorySlot::Built(factory));
                entry.insert(Box::new(registration));
                true
            }
        }
    }

    #[must_use]
    pub fn is_registered<C>(&self) -> bool
    where
        C: ?Sized + ClientChannel,
    {
        self.clients.read().contains_key(&TypeKey::of::<C>())
    }

    /// Resolve the factory for contract `C`, building it on first use.
    ///
    /// Building runs every configuration callback exactly once against the
    /// endpoint description, then applies the endpoint's behaviors. A failed
    /// build is remembered and reported on every later resolution.
    ///
    /// # Errors
    /// [`ChannelError::NotRegistered`] or [`ChannelError::FactoryUnavailable`].
    pub fn channel_factory<C>(&self) -> Result<Arc<ChannelFactory<C>>, ChannelError>
    where
        C: ?Sized + ClientChannel,
    {
        let contract = TypeKey::of::<C>().name();
        let cell = self.registration::<C>()?;
        if let Some(settled) = cell.state.lock().settled(contract) {
            return settled;
        }

        let _build = cell.build.lock();
        let (binding, mut endpoint, callbacks) = {
            let mut registration = cell.state.lock();
            if let Some(settled) = registration.settled(contract) {
                return settled;
            }
            let Some(recipe) = registration.recipe.as_ref() else {
                return Err(ChannelError::NotRegistered { contract });
            };
            let binding = Arc::clone(&recipe.binding);
            let endpoint = ServiceEndpoint::new(contract, binding.name(), recipe.address.clone());
            let callbacks = std::mem::take(&mut registration.configure);
            registration.factory = FactorySlot::Building(thread::current().id());
            (binding, endpoint, callbacks)
        };

        let guard = BuildGuard {
            cell: &cell,
            contract,
            armed: true,
        };
        for configure in callbacks {
            configure(self, &mut endpoint);
        }

        match ChannelFactory::from_endpoint(binding, endpoint) {
            Ok(factory) => {
                let factory = Arc::new(factory);
                guard.finish(FactorySlot::Built(Arc::clone(&factory)));
                Ok(factory)
            }
            Err(e) => {
                tracing::error!(contract, error = %e, "channel factory build failed");
                let reason = e.to_string();
                guard.finish(FactorySlot::Failed(reason.clone()));
                Err(ChannelError::FactoryUnavailable { contract, reason })
            }
        }
    }

    /// Create a new, independent handle for contract `C`.
    ///
    /// # Errors
    /// See [`channel_factory`](Self::channel_factory).
    pub fn create_client<C>(&self) -> Result<ChannelHandle<C>, ChannelError>
    where
        C: ?Sized + ClientChannel,
    {
        Ok(ChannelHandle::new(self.channel_factory::<C>()?))
    }

    fn registration<C>(&self) -> Result<Shared<C>, ChannelError>
    where
        C: ?Sized + ClientChannel,
    {
        let key = TypeKey::of::<C>();
        let clients = self.clients.read();
        let boxed = clients
            .get(&key)
            .ok_or(ChannelError::NotRegistered {
                contract: key.name(),
            })?;
        Self::downcast::<C>(key, boxed)
    }

    fn downcast<C: ?Sized + 'static>(key: TypeKey, boxed: &Boxed) -> Result<Shared<C>, ChannelError> {
        boxed
            .downcast_ref::<Shared<C>>()
            .cloned()
            .ok_or(ChannelError::NotRegistered {
                contract: key.name(),
            })
    }

    /// Provide a collaborator service under type `T`, replacing any previous
    /// one. `T` can be a trait object.
    pub fn provide<T>(&self, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .write()
            .insert(TypeKey::of::<T>(), Box::new(service));
    }

    /// Provide `service` only if nothing is provided under `T` yet.
    pub fn try_provide<T>(&self, service: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.services.write().entry(TypeKey::of::<T>()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Box::new(service));
                true
            }
        }
    }

    /// # Errors
    /// Returns [`ChannelError::ServiceNotProvided`] if nothing is provided
    /// under `T`.
    pub fn resolve<T>(&self) -> Result<Arc<T>, ChannelError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let services = self.services.read();
        services
            .get(&key)
            .and_then(|boxed| boxed.downcast_ref::<Arc<T>>())
            .cloned()
            .ok_or(ChannelError::ServiceNotProvided { service: key.name() })
    }

    /// Number of registered contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("clients", &self.clients.read().keys().collect::<Vec<_>>())
            .field("services", &self.services.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
