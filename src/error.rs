//! Error types shared across the binding subsystem.
//!
//! Structural failures (an adapter chain that is too deep, a factory that
//! produced nothing, a second `initialize()`) are returned as
//! [`BindingError`]. Lookups that simply find nothing are not errors and are
//! represented with `Option`.

use thiserror::Error;

use crate::registry::CapabilityKey;

/// Boxed error returned by caller-supplied lifecycle callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for binding operations.
pub type BindingResult<T = ()> = Result<T, BindingError>;

/// Result alias for operations on capability interfaces.
pub type CapabilityResult<T = ()> = Result<T, CapabilityError>;

/// Errors raised while binding, registering or sequencing capabilities.
#[derive(Debug, Error)]
pub enum BindingError {
    /// An adapter would nest deeper than the allowed maximum.
    #[error("Adapter chain too deep ({depth} levels, max: {max})")]
    ChainTooDeep { depth: usize, max: usize },

    /// `initialize()` was called on a coordinator that is already initialized.
    #[error("Lifecycle coordinator already initialized")]
    AlreadyInitialized,

    /// A default or named factory produced no usable instance.
    #[error("Factory for {key} returned no instance")]
    FactoryReturnedInvalid { key: CapabilityKey },

    /// Registration attempted while the registry is frozen.
    #[error("Capability already registered and registry is frozen: {key}")]
    AlreadyRegistered { key: CapabilityKey },

    /// A removal attempted while the registry is frozen.
    #[error("Registry is frozen, cannot {operation}")]
    RegistryFrozen { operation: &'static str },

    /// Rejected input, such as an empty capability name.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An init callback failed after all capabilities were registered.
    #[error("Init callback #{index} failed: {source}")]
    InitCallbackFailed {
        index: usize,
        #[source]
        source: BoxError,
    },
}

/// Errors reported by capability implementations (loggers, executors).
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The capability refused the operation (for example after shutdown).
    #[error("Operation rejected: {0}")]
    Rejected(String),

    /// The capability backend is not reachable.
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    /// I/O failure inside the capability backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
