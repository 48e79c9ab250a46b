//! Adapter records and the wrapper contract.
//!
//! A wrapper is plain composition: a struct holding an [`AdapterCore`]
//! (inner handle, depth, stamp) that implements the target capability trait
//! by forwarding to the inner handle. Capability traits carry [`AdapterInfo`]
//! as a supertrait so any interface handle can report whether it is a
//! wrapper and hand back its record.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::stamp::AdapterStamp;
use crate::error::{BindingError, BindingResult};

/// Maximum number of adapter layers between a handle and its implementation.
pub const MAX_ADAPTER_DEPTH: usize = 2;

// ---------------------------------------------------------------------------
// AdapterInfo / AdapterRecord
// ---------------------------------------------------------------------------

/// Adapter bookkeeping exposed by every bindable type.
///
/// Plain implementations keep the default (`None`); wrappers return their
/// [`AdapterCore`]. Use [`adapter_info!`](crate::adapter_info) to write
/// either impl in one line.
pub trait AdapterInfo {
    /// The adapter record when this value was produced by the wrapper path.
    fn adapter_record(&self) -> Option<&dyn AdapterRecord> {
        None
    }
}

/// Read-only view of one adapter layer.
pub trait AdapterRecord: Send + Sync {
    /// Adapter layers beneath this wrapper (0 over a plain implementation).
    fn depth(&self) -> usize;

    /// Identity stamp of the (interface, implementation) pairing.
    fn stamp(&self) -> AdapterStamp;

    /// Type name of the interface this wrapper exposes.
    fn interface_name(&self) -> &'static str;

    /// Type name of the wrapped implementation.
    fn inner_name(&self) -> &'static str;

    /// The stored inner handle (an `Arc<T>`), type-erased.
    fn inner_any(&self) -> &(dyn Any + Send + Sync);

    /// The next layer down when the inner handle is itself a wrapper.
    fn inner_record(&self) -> Option<&dyn AdapterRecord>;
}

// ---------------------------------------------------------------------------
// AdapterCore
// ---------------------------------------------------------------------------

/// The state every wrapper holds: the wrapped handle and its position in
/// the chain. Immutable after construction.
pub struct AdapterCore<I: ?Sized, T: ?Sized> {
    inner: Arc<T>,
    depth: usize,
    stamp: AdapterStamp,
    _interface: PhantomData<fn() -> *const I>,
}

impl<I, T> AdapterCore<I, T>
where
    I: ?Sized + 'static,
    T: ?Sized + AdapterInfo + Send + Sync + 'static,
{
    /// Build the record for a new wrapper around `inner`.
    ///
    /// A wrapper over a plain implementation has depth 0; over another
    /// wrapper it has that wrapper's depth plus one. Fails with
    /// [`BindingError::ChainTooDeep`] when the result exceeds
    /// [`MAX_ADAPTER_DEPTH`].
    pub fn new(inner: Arc<T>) -> BindingResult<Self> {
        let depth = inner.adapter_record().map_or(0, |record| record.depth() + 1);
        if depth > MAX_ADAPTER_DEPTH {
            log::warn!(
                "refusing to adapt {} to {}: chain depth {} exceeds {}",
                type_name::<T>(),
                type_name::<I>(),
                depth,
                MAX_ADAPTER_DEPTH
            );
            return Err(BindingError::ChainTooDeep {
                depth,
                max: MAX_ADAPTER_DEPTH,
            });
        }

        log::debug!(
            "adapting {} to {} at depth {}",
            type_name::<T>(),
            type_name::<I>(),
            depth
        );
        Ok(Self {
            inner,
            depth,
            stamp: AdapterStamp::of::<I, T>(),
            _interface: PhantomData,
        })
    }

    /// The wrapped implementation.
    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }

    /// Depth of this wrapper.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the inner handle is itself a wrapper.
    pub fn is_wrapped_adapter(&self) -> bool {
        self.depth > 0
    }

    /// Stamp of this pairing.
    pub fn stamp(&self) -> AdapterStamp {
        self.stamp
    }

    /// The depth limit enforced by [`AdapterCore::new`].
    pub const fn max_depth() -> usize {
        MAX_ADAPTER_DEPTH
    }
}

impl<I, T> AdapterRecord for AdapterCore<I, T>
where
    I: ?Sized + 'static,
    T: ?Sized + AdapterInfo + Send + Sync + 'static,
{
    fn depth(&self) -> usize {
        self.depth
    }

    fn stamp(&self) -> AdapterStamp {
        self.stamp
    }

    fn interface_name(&self) -> &'static str {
        type_name::<I>()
    }

    fn inner_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn inner_any(&self) -> &(dyn Any + Send + Sync) {
        &self.inner
    }

    fn inner_record(&self) -> Option<&dyn AdapterRecord> {
        self.inner.adapter_record()
    }
}

impl<I: ?Sized, T: ?Sized> fmt::Debug for AdapterCore<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterCore")
            .field("interface", &type_name::<I>())
            .field("inner", &type_name::<T>())
            .field("depth", &self.depth)
            .field("stamp", &self.stamp)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Adapter / AdaptedBy
// ---------------------------------------------------------------------------

/// A wrapper type that exposes `Interface` over `Inner`.
///
/// Implementors also implement the capability trait itself, forwarding each
/// operation to `core.inner()`.
pub trait Adapter: AdapterInfo + Send + Sync + Sized + 'static {
    /// The capability interface this wrapper satisfies (a `dyn Trait`).
    type Interface: ?Sized + 'static;

    /// The wrapped implementation type.
    type Inner: ?Sized + AdapterInfo + Send + Sync + 'static;

    /// Assemble the wrapper around an already validated record.
    fn from_core(core: AdapterCore<Self::Interface, Self::Inner>) -> Self;

    /// The record this wrapper was built from.
    fn core(&self) -> &AdapterCore<Self::Interface, Self::Inner>;
}

/// Declares which wrapper binds an implementation type to interface `I`.
///
/// ```ignore
/// impl AdaptedBy<dyn Logger> for SyslogSink {
///     type Wrapper = SyslogLogger;
/// }
/// ```
pub trait AdaptedBy<I: ?Sized>: AdapterInfo + Send + Sync + 'static {
    type Wrapper: Adapter<Interface = I, Inner = Self>;
}

/// Implements [`AdapterInfo`] for plain implementations or for wrappers.
///
/// ```ignore
/// adapter_info!(plain: ConsoleLogger, FileLogger);
/// adapter_info!(adapter: SyslogLogger => core);
/// ```
#[macro_export]
macro_rules! adapter_info {
    (plain: $($ty:ty),+ $(,)?) => {
        $(impl $crate::adapters::AdapterInfo for $ty {})+
    };
    (adapter: $ty:ty => $field:ident) => {
        impl $crate::adapters::AdapterInfo for $ty {
            fn adapter_record(&self) -> Option<&dyn $crate::adapters::AdapterRecord> {
                Some(&self.$field)
            }
        }
    };
}
