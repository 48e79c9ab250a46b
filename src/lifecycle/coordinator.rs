//! Lifecycle coordinator.
//!
//! Sequences capability registration and application init/shutdown hooks
//! as two phases:
//!
//! 1. `initialize()`: run the default factory, then each named factory in
//!    configuration order, binding every result in the registry. If any
//!    factory produces nothing, every binding made so far is undone (keys
//!    that were bound before get their old slot back) and the error is
//!    returned. Then init callbacks run first-in first-out.
//! 2. `shutdown()`: shutdown callbacks run last-in first-out, then every
//!    binding this coordinator made is withdrawn.
//!
//! Dropping an initialized coordinator shuts it down.

use std::any::type_name;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capabilities::Capability;
use crate::config::BindingConfig;
use crate::error::{BindingError, BindingResult, BoxError};
use crate::registry::capability_registry::Slot;
use crate::registry::{CapabilityFactory, CapabilityKey, CapabilityRegistry};

/// Application hook run by [`LifecycleCoordinator`].
pub type LifecycleCallback = Box<dyn FnMut() -> Result<(), BoxError> + Send>;

/// Observable phase of a [`LifecycleCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing configured.
    Unconfigured,
    /// Factories or callbacks configured, not initialized.
    Configuring,
    Initialized,
}

/// A binding made by `initialize()`.
struct Binding<C: ?Sized> {
    key: CapabilityKey,
    instance: Arc<C>,
    /// What the key held before, kept until `initialize()` succeeds.
    displaced: Option<Slot<C>>,
}

/// Registers capabilities of interface `C` and runs init/shutdown hooks.
///
/// Configuration is single-threaded: build the coordinator, then call
/// [`initialize`](Self::initialize).
///
/// ```ignore
/// let mut lifecycle = LifecycleCoordinator::<dyn Logger>::new();
/// lifecycle
///     .with_default(|| Some(Arc::new(FacadeLogger::new("app")) as Arc<dyn Logger>))
///     .with_named("audit", || Some(Arc::new(FacadeLogger::new("audit")) as Arc<dyn Logger>))
///     .on_shutdown(|| { flush_everything(); Ok(()) });
/// lifecycle.initialize()?;
/// ```
pub struct LifecycleCoordinator<C: ?Sized + Capability> {
    registry: Arc<CapabilityRegistry<C>>,
    config: BindingConfig,
    default_factory: Option<CapabilityFactory<C>>,
    named_factories: Vec<(String, CapabilityFactory<C>)>,
    init_callbacks: Vec<LifecycleCallback>,
    shutdown_callbacks: Vec<LifecycleCallback>,
    /// Bindings made by the current `initialize()`, in registration order.
    registered: Vec<Binding<C>>,
    initialized: bool,
    froze_registry: bool,
}

impl<C: ?Sized + Capability> LifecycleCoordinator<C> {
    /// A coordinator binding into the process-wide registry for `C`.
    pub fn new() -> Self {
        Self::with_registry(CapabilityRegistry::global())
    }

    /// A coordinator binding into `registry`.
    pub fn with_registry(registry: Arc<CapabilityRegistry<C>>) -> Self {
        Self {
            registry,
            config: BindingConfig::default(),
            default_factory: None,
            named_factories: Vec::new(),
            init_callbacks: Vec::new(),
            shutdown_callbacks: Vec::new(),
            registered: Vec::new(),
            initialized: false,
            froze_registry: false,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry<C>> {
        &self.registry
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Use `config` for this coordinator.
    ///
    /// `freeze_on_initialize` takes effect on the next
    /// [`initialize`](Self::initialize); the audit settings are applied to
    /// the registry's audit log immediately.
    pub fn set_config(&mut self, config: BindingConfig) -> &mut Self {
        config.apply_to(self.registry.audit_log());
        self.config = config;
        self
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Factory for the registry's default slot.
    pub fn with_default<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> Option<Arc<C>> + Send + Sync + 'static,
    {
        self.default_factory = Some(Arc::new(factory));
        self
    }

    /// Factory for the slot `name`. Configuring the same name again
    /// replaces the factory and keeps its original position.
    pub fn with_named<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Option<Arc<C>> + Send + Sync + 'static,
    {
        let name = name.into();
        let factory: CapabilityFactory<C> = Arc::new(factory);
        match self.named_factories.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory,
            None => self.named_factories.push((name, factory)),
        }
        self
    }

    /// Callback run after all capabilities are bound, in configuration order.
    pub fn on_init<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut() -> Result<(), BoxError> + Send + 'static,
    {
        self.init_callbacks.push(Box::new(callback));
        self
    }

    /// Callback run on shutdown, in reverse configuration order.
    pub fn on_shutdown<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut() -> Result<(), BoxError> + Send + 'static,
    {
        self.shutdown_callbacks.push(Box::new(callback));
        self
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Bind every configured capability, then run the init callbacks.
    ///
    /// A factory that produces nothing fails with
    /// [`BindingError::FactoryReturnedInvalid`] and leaves the registry as
    /// it was, earlier bindings of the configured keys included. A failing init callback stops the remaining callbacks and
    /// fails with [`BindingError::InitCallbackFailed`]; the capabilities
    /// stay bound and the coordinator counts as initialized.
    #[track_caller]
    pub fn initialize(&mut self) -> BindingResult {
        let location = Location::caller();
        if self.initialized {
            return Err(BindingError::AlreadyInitialized);
        }
        log::debug!("initializing lifecycle for {}", type_name::<C>());

        if let Err(err) = self.bind_all(location) {
            self.rollback(location);
            return Err(err);
        }
        for binding in &mut self.registered {
            binding.displaced = None;
        }
        self.initialized = true;

        for (index, callback) in self.init_callbacks.iter_mut().enumerate() {
            callback().map_err(|source| {
                log::warn!("init callback #{} failed: {}", index, source);
                BindingError::InitCallbackFailed { index, source }
            })?;
        }

        if self.config.freeze_on_initialize && !self.registry.is_frozen() {
            self.registry.freeze();
            self.froze_registry = true;
        }
        log::debug!(
            "lifecycle for {} initialized with {} binding(s)",
            type_name::<C>(),
            self.registered.len()
        );
        Ok(())
    }

    fn bind_all(&mut self, location: &'static Location<'static>) -> BindingResult {
        let mut pending: Vec<(CapabilityKey, CapabilityFactory<C>)> = Vec::new();
        if let Some(factory) = &self.default_factory {
            pending.push((CapabilityKey::Default, Arc::clone(factory)));
        }
        pending.extend(
            self.named_factories
                .iter()
                .map(|(name, factory)| (CapabilityKey::named(name.as_str()), Arc::clone(factory))),
        );

        for (key, factory) in pending {
            let instance = factory().ok_or_else(|| {
                log::warn!("factory for {} returned no instance", key);
                BindingError::FactoryReturnedInvalid { key: key.clone() }
            })?;
            let displaced = self
                .registry
                .store_instance_at(key.clone(), Arc::clone(&instance), location)?;
            self.registered.push(Binding {
                key,
                instance,
                displaced,
            });
        }
        Ok(())
    }

    fn rollback(&mut self, location: &'static Location<'static>) {
        if !self.registered.is_empty() {
            log::warn!(
                "rolling back {} binding(s) for {}",
                self.registered.len(),
                type_name::<C>()
            );
        }
        for binding in self.registered.drain(..).rev() {
            let Binding {
                key,
                instance,
                displaced,
            } = binding;
            if !self.registry.restore(&key, &instance, displaced, location) {
                log::debug!("{} was rebound by someone else, leaving it", key);
            }
        }
    }

    fn release_all(&mut self, location: &'static Location<'static>) {
        for binding in self.registered.drain(..).rev() {
            if !self.registry.release(&binding.key, &binding.instance, location) {
                log::debug!("{} was rebound by someone else, leaving it", binding.key);
            }
        }
    }

    /// Run shutdown callbacks in reverse order, then withdraw this
    /// coordinator's bindings. Does nothing when not initialized.
    ///
    /// A failing shutdown callback is logged and the rest still run.
    #[track_caller]
    pub fn shutdown(&mut self) {
        let location = Location::caller();
        if !self.initialized {
            return;
        }
        log::debug!("shutting down lifecycle for {}", type_name::<C>());

        let count = self.shutdown_callbacks.len();
        for (position, callback) in self.shutdown_callbacks.iter_mut().rev().enumerate() {
            if let Err(err) = callback() {
                log::warn!("shutdown callback #{} failed: {}", count - 1 - position, err);
            }
        }

        if self.froze_registry {
            self.registry.unfreeze();
            self.froze_registry = false;
        }
        self.release_all(location);
        self.initialized = false;
    }

    /// Shut down if needed and drop all configuration.
    #[track_caller]
    pub fn reset(&mut self) {
        self.shutdown();
        self.default_factory = None;
        self.named_factories.clear();
        self.init_callbacks.clear();
        self.shutdown_callbacks.clear();
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> LifecycleState {
        if self.initialized {
            LifecycleState::Initialized
        } else if self.default_factory.is_some()
            || !self.named_factories.is_empty()
            || !self.init_callbacks.is_empty()
            || !self.shutdown_callbacks.is_empty()
        {
            LifecycleState::Configuring
        } else {
            LifecycleState::Unconfigured
        }
    }

    /// Keys currently bound by this coordinator, in registration order.
    pub fn registered_keys(&self) -> Vec<CapabilityKey> {
        self.registered.iter().map(|binding| binding.key.clone()).collect()
    }
}

impl<C: ?Sized + Capability> Default for LifecycleCoordinator<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized + Capability> Drop for LifecycleCoordinator<C> {
    fn drop(&mut self) {
        if self.initialized {
            log::debug!("lifecycle for {} dropped while initialized", type_name::<C>());
            self.shutdown();
        }
    }
}

impl<C: ?Sized + Capability> fmt::Debug for LifecycleCoordinator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("capability", &type_name::<C>())
            .field("state", &self.state())
            .field("has_default", &self.default_factory.is_some())
            .field(
                "named",
                &self.named_factories.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("init_callbacks", &self.init_callbacks.len())
            .field("shutdown_callbacks", &self.shutdown_callbacks.len())
            .finish()
    }
}
