//! # Capabilities
//!
//! Capability interfaces that can be bound through the adapter engine and
//! published in a [`CapabilityRegistry`](crate::registry::CapabilityRegistry).
//!
//! A capability is a `dyn Trait` with [`AdapterInfo`] as a supertrait and a
//! [`Capability`] impl naming its no-op stand-in. Two ship with the crate:
//!
//! - [`Logger`]: leveled logging, backed by the `log` facade or discarded.
//! - [`Executor`]: fire-and-forget job execution, inline or on a Tokio
//!   runtime.
//!
//! ## Adding a capability
//!
//! ```ignore
//! pub trait Storage: AdapterInfo + Send + Sync {
//!     fn put(&self, key: &str, value: &[u8]) -> CapabilityResult;
//! }
//!
//! impl Capability for dyn Storage {
//!     fn null_instance() -> Arc<Self> {
//!         NULL_STORAGE.clone()
//!     }
//! }
//!
//! implements!(dyn Storage: DiskStorage, MemoryStorage);
//! ```

use std::sync::Arc;

use crate::adapters::AdapterInfo;

pub mod executor;
pub mod logger;

pub use executor::{
    default_executor, executor, executor_registry, Executor, InlineExecutor, Job, NullExecutor,
    RuntimeExecutor,
};
pub use logger::{
    default_logger, logger, logger_registry, FacadeLogger, LogEntry, LogLevel, Logger, NullLogger,
};

/// A capability interface with a shared no-op stand-in.
///
/// Registries hand out the stand-in for any slot that has nothing bound,
/// so lookups never fail.
pub trait Capability: AdapterInfo + Send + Sync + 'static {
    /// The stand-in. Every call must return the same allocation, which is
    /// how registries recognise it.
    fn null_instance() -> Arc<Self>;
}
