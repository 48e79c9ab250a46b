//! Named capability registry.
//!
//! Holds zero or more bound instances of one capability interface under
//! string keys plus a default slot. Slots hold either an instance or a
//! factory that is invoked once, on first lookup.
//!
//! Reads take a shared lock. Writes, including the one-time factory
//! invocation, take the exclusive lock, so racing first lookups of the same
//! key construct exactly one instance.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::audit::{RegistryAction, RegistryAuditLog, RegistryEvent};
use super::key::CapabilityKey;
use crate::adapters::same_instance;
use crate::capabilities::Capability;
use crate::error::{BindingError, BindingResult};

/// Zero-argument constructor for a capability instance. `None` means the
/// factory could not produce one.
pub type CapabilityFactory<C> = Arc<dyn Fn() -> Option<Arc<C>> + Send + Sync>;

static GLOBAL_REGISTRIES: Lazy<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> =
    Lazy::new(DashMap::new);

/// One bound key: an instance, a pending factory, or (after a factory has
/// run) the instance it produced.
pub(crate) struct Slot<C: ?Sized> {
    instance: Option<Arc<C>>,
    factory: Option<CapabilityFactory<C>>,
}

struct RegistryState<C: ?Sized> {
    slots: HashMap<CapabilityKey, Slot<C>>,
    frozen: bool,
}

/// Thread-safe store of capability bindings for interface `C`.
pub struct CapabilityRegistry<C: ?Sized + Capability> {
    state: RwLock<RegistryState<C>>,
    audit: Arc<RegistryAuditLog>,
}

impl<C: ?Sized + Capability> CapabilityRegistry<C> {
    /// An empty registry recording into the process-wide audit log.
    pub fn new() -> Self {
        Self::with_audit_log(RegistryAuditLog::global())
    }

    /// An empty registry recording into `audit`.
    pub fn with_audit_log(audit: Arc<RegistryAuditLog>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                slots: HashMap::new(),
                frozen: false,
            }),
            audit,
        }
    }

    /// The process-wide registry for capability `C`, created on first use.
    pub fn global() -> Arc<Self> {
        let entry = GLOBAL_REGISTRIES
            .entry(TypeId::of::<C>())
            .or_insert_with(|| {
                log::debug!("creating global registry for {}", type_name::<C>());
                Arc::new(Self::new()) as Arc<dyn Any + Send + Sync>
            })
            .clone();
        // The entry under TypeId::of::<C>() holds a CapabilityRegistry<C>.
        entry.downcast::<Self>().unwrap_or_else(|_| {
            log::error!(
                "global registry for {} has the wrong type, replacing it",
                type_name::<C>()
            );
            Self::replace_global()
        })
    }

    fn replace_global() -> Arc<Self> {
        let registry = Arc::new(Self::new());
        GLOBAL_REGISTRIES.insert(
            TypeId::of::<C>(),
            Arc::clone(&registry) as Arc<dyn Any + Send + Sync>,
        );
        registry
    }

    pub fn audit_log(&self) -> &Arc<RegistryAuditLog> {
        &self.audit
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Bind `instance` under `name`, replacing any previous binding.
    #[track_caller]
    pub fn register(&self, name: &str, instance: Arc<C>) -> BindingResult {
        let location = Location::caller();
        let key = self.named_key(name, RegistryAction::Register, location)?;
        self.store(key, Slot::instance(instance), RegistryAction::Register, location)
            .map(drop)
    }

    /// Bind `instance` as the default.
    #[track_caller]
    pub fn set_default(&self, instance: Arc<C>) -> BindingResult {
        self.store(
            CapabilityKey::Default,
            Slot::instance(instance),
            RegistryAction::SetDefault,
            Location::caller(),
        )
        .map(drop)
    }

    /// Bind a factory under `name`. It runs on the first [`get`](Self::get).
    #[track_caller]
    pub fn register_factory<F>(&self, name: &str, factory: F) -> BindingResult
    where
        F: Fn() -> Option<Arc<C>> + Send + Sync + 'static,
    {
        let location = Location::caller();
        let key = self.named_key(name, RegistryAction::RegisterFactory, location)?;
        self.store(
            key,
            Slot::factory(Arc::new(factory)),
            RegistryAction::RegisterFactory,
            location,
        )
        .map(drop)
    }

    /// Bind a factory for the default slot.
    #[track_caller]
    pub fn set_default_factory<F>(&self, factory: F) -> BindingResult
    where
        F: Fn() -> Option<Arc<C>> + Send + Sync + 'static,
    {
        self.store(
            CapabilityKey::Default,
            Slot::factory(Arc::new(factory)),
            RegistryAction::SetDefaultFactory,
            Location::caller(),
        )
        .map(drop)
    }

    /// Bind `instance` to `key` on behalf of a caller further up the stack.
    ///
    /// Returns the slot it replaced, for [`restore`](Self::restore).
    pub(crate) fn store_instance_at(
        &self,
        key: CapabilityKey,
        instance: Arc<C>,
        location: &'static Location<'static>,
    ) -> BindingResult<Option<Slot<C>>> {
        let action = if key.is_default() {
            RegistryAction::SetDefault
        } else {
            RegistryAction::Register
        };
        if let Some(name) = key.name() {
            self.named_key(name, action, location)?;
        }
        self.store(key, Slot::instance(instance), action, location)
    }

    fn store(
        &self,
        key: CapabilityKey,
        slot: Slot<C>,
        action: RegistryAction,
        location: &'static Location<'static>,
    ) -> BindingResult<Option<Slot<C>>> {
        let mut state = self.state.write();
        if state.frozen {
            let err = if state.slots.contains_key(&key) {
                BindingError::AlreadyRegistered { key: key.clone() }
            } else {
                BindingError::RegistryFrozen {
                    operation: action.as_str(),
                }
            };
            drop(state);
            self.record(action, &key, location, Some(&err));
            return Err(err);
        }
        let displaced = state.slots.insert(key.clone(), slot);
        drop(state);

        log::debug!("{} {} for {}", action, key, type_name::<C>());
        self.record(action, &key, location, None);
        Ok(displaced)
    }

    fn named_key(
        &self,
        name: &str,
        action: RegistryAction,
        location: &'static Location<'static>,
    ) -> BindingResult<CapabilityKey> {
        if name.is_empty() {
            let err = BindingError::InvalidArgument("capability name cannot be empty".into());
            self.record(action, &CapabilityKey::named(""), location, Some(&err));
            return Err(err);
        }
        Ok(CapabilityKey::named(name))
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The instance bound to `key`, constructing it if only a factory is
    /// stored, or the shared stand-in when nothing usable is bound.
    pub fn get(&self, key: impl Into<CapabilityKey>) -> Arc<C> {
        self.try_get(key).unwrap_or_else(C::null_instance)
    }

    /// The default instance, or the stand-in.
    pub fn get_default(&self) -> Arc<C> {
        self.get(CapabilityKey::Default)
    }

    /// Like [`get`](Self::get) but returns `None` instead of the stand-in.
    ///
    /// A factory runs under the exclusive lock and must not call back into
    /// this registry.
    pub fn try_get(&self, key: impl Into<CapabilityKey>) -> Option<Arc<C>> {
        let key = key.into();
        {
            let state = self.state.read();
            let slot = state.slots.get(&key)?;
            if let Some(instance) = &slot.instance {
                return Some(Arc::clone(instance));
            }
        }

        let mut state = self.state.write();
        let slot = state.slots.get_mut(&key)?;
        // Another thread may have constructed it while we waited.
        if let Some(instance) = &slot.instance {
            return Some(Arc::clone(instance));
        }
        let factory = slot.factory.as_ref()?;
        match factory() {
            Some(instance) => {
                log::debug!("constructed {} for {}", key, type_name::<C>());
                slot.instance = Some(Arc::clone(&instance));
                slot.factory = None;
                Some(instance)
            }
            None => {
                log::warn!(
                    "factory for {} of {} returned no instance",
                    key,
                    type_name::<C>()
                );
                None
            }
        }
    }

    /// Whether anything is bound to `key`. Never runs a factory.
    pub fn has(&self, key: impl Into<CapabilityKey>) -> bool {
        self.state.read().slots.contains_key(&key.into())
    }

    pub fn has_default(&self) -> bool {
        self.has(CapabilityKey::Default)
    }

    /// Number of bound slots, the default slot included.
    pub fn len(&self) -> usize {
        self.state.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().slots.is_empty()
    }

    /// Bound names in sorted order, without the default slot.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .read()
            .slots
            .keys()
            .filter_map(|key| key.name().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// The stand-in handed out for unbound slots.
    pub fn null_instance(&self) -> Arc<C> {
        C::null_instance()
    }

    /// Whether `handle` is the stand-in.
    pub fn is_fallback(&self, handle: &Arc<C>) -> bool {
        same_instance(handle, &C::null_instance())
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Remove the binding for `key`. Handles already given out stay valid.
    ///
    /// Returns whether anything was bound.
    #[track_caller]
    pub fn unregister(&self, key: impl Into<CapabilityKey>) -> BindingResult<bool> {
        let location = Location::caller();
        let key = key.into();
        if key.name() == Some("") {
            let err = BindingError::InvalidArgument("capability name cannot be empty".into());
            self.record(RegistryAction::Unregister, &key, location, Some(&err));
            return Err(err);
        }

        let mut state = self.state.write();
        if state.frozen {
            drop(state);
            let err = BindingError::RegistryFrozen {
                operation: "unregister",
            };
            self.record(RegistryAction::Unregister, &key, location, Some(&err));
            return Err(err);
        }
        let removed = state.slots.remove(&key).is_some();
        drop(state);

        if removed {
            log::debug!("unregistered {} for {}", key, type_name::<C>());
            self.record(RegistryAction::Unregister, &key, location, None);
        }
        Ok(removed)
    }

    /// Remove every binding, the default included.
    #[track_caller]
    pub fn clear(&self) -> BindingResult {
        let location = Location::caller();
        let mut state = self.state.write();
        if state.frozen {
            drop(state);
            let err = BindingError::RegistryFrozen { operation: "clear" };
            self.record_global(RegistryAction::Clear, location, Some(&err));
            return Err(err);
        }
        state.slots.clear();
        drop(state);

        log::debug!("cleared registry for {}", type_name::<C>());
        self.record_global(RegistryAction::Clear, location, None);
        Ok(())
    }

    /// Remove the binding for `key` only if it still holds `instance`.
    ///
    /// Ignores the frozen flag: the owner of a binding may always withdraw it.
    pub(crate) fn release(
        &self,
        key: &CapabilityKey,
        instance: &Arc<C>,
        location: &'static Location<'static>,
    ) -> bool {
        let mut state = self.state.write();
        let owned = matches!(
            state.slots.get(key),
            Some(Slot { instance: Some(current), .. }) if same_instance(current, instance)
        );
        if owned {
            state.slots.remove(key);
        }
        drop(state);

        if owned {
            log::debug!("released {} for {}", key, type_name::<C>());
            self.record(RegistryAction::Unregister, key, location, None);
        }
        owned
    }

    /// Undo a [`store_instance_at`](Self::store_instance_at): if `key` still
    /// holds `instance`, put `displaced` back, or remove the key when
    /// nothing was bound before.
    ///
    /// Ignores the frozen flag, like [`release`](Self::release).
    pub(crate) fn restore(
        &self,
        key: &CapabilityKey,
        instance: &Arc<C>,
        displaced: Option<Slot<C>>,
        location: &'static Location<'static>,
    ) -> bool {
        let mut state = self.state.write();
        let owned = matches!(
            state.slots.get(key),
            Some(Slot { instance: Some(current), .. }) if same_instance(current, instance)
        );
        if !owned {
            return false;
        }
        let action = match displaced {
            Some(slot) => {
                let action = slot.action_for(key);
                state.slots.insert(key.clone(), slot);
                action
            }
            None => {
                state.slots.remove(key);
                RegistryAction::Unregister
            }
        };
        drop(state);

        log::debug!("restored {} for {}", key, type_name::<C>());
        self.record(action, key, location, None);
        true
    }

    // -----------------------------------------------------------------------
    // Freezing
    // -----------------------------------------------------------------------

    /// Reject registrations and removals until [`unfreeze`](Self::unfreeze).
    #[track_caller]
    pub fn freeze(&self) {
        self.state.write().frozen = true;
        self.record_global(RegistryAction::Freeze, Location::caller(), None);
    }

    #[track_caller]
    pub fn unfreeze(&self) {
        self.state.write().frozen = false;
        self.record_global(RegistryAction::Unfreeze, Location::caller(), None);
    }

    pub fn is_frozen(&self) -> bool {
        self.state.read().frozen
    }

    /// Drop every binding and unfreeze. Intended for process start and
    /// tests.
    #[track_caller]
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.slots.clear();
        state.frozen = false;
        drop(state);
        self.record_global(RegistryAction::Reset, Location::caller(), None);
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    fn record(
        &self,
        action: RegistryAction,
        key: &CapabilityKey,
        location: &'static Location<'static>,
        error: Option<&BindingError>,
    ) {
        self.record_target(action, key.to_string(), location, error);
    }

    fn record_global(
        &self,
        action: RegistryAction,
        location: &'static Location<'static>,
        error: Option<&BindingError>,
    ) {
        self.record_target(action, String::new(), location, error);
    }

    fn record_target(
        &self,
        action: RegistryAction,
        target: String,
        location: &'static Location<'static>,
        error: Option<&BindingError>,
    ) {
        if !self.audit.is_enabled() {
            return;
        }
        let event = RegistryEvent::at(action, target, type_name::<C>(), location);
        self.audit.record(match error {
            Some(err) => event.failed(err),
            None => event,
        });
    }
}

impl<C: ?Sized> Slot<C> {
    fn instance(instance: Arc<C>) -> Self {
        Self {
            instance: Some(instance),
            factory: None,
        }
    }

    fn factory(factory: CapabilityFactory<C>) -> Self {
        Self {
            instance: None,
            factory: Some(factory),
        }
    }

    /// The registration that would have produced this slot under `key`.
    fn action_for(&self, key: &CapabilityKey) -> RegistryAction {
        match (key.is_default(), self.instance.is_some()) {
            (true, true) => RegistryAction::SetDefault,
            (true, false) => RegistryAction::SetDefaultFactory,
            (false, true) => RegistryAction::Register,
            (false, false) => RegistryAction::RegisterFactory,
        }
    }
}

impl<C: ?Sized + Capability> Default for CapabilityRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized + Capability> fmt::Debug for CapabilityRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("CapabilityRegistry")
            .field("capability", &type_name::<C>())
            .field("slots", &state.slots.keys().collect::<Vec<_>>())
            .field("frozen", &state.frozen)
            .finish()
    }
}
