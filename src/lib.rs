//! # Runtime Binding
//!
//! Runtime-bound capabilities for modules that depend on each other's
//! services without depending on each other's crates.
//!
//! - [`adapters`]: binds an implementation to a capability interface, by
//!   zero-cost upcast when it already satisfies the interface and through a
//!   depth-limited wrapper otherwise.
//! - [`registry`]: process-wide named slots for capability instances, with
//!   lazy factories and a no-op stand-in for anything unbound.
//! - [`lifecycle`]: registers a set of capabilities and runs init/shutdown
//!   hooks, rolling back on partial failure.
//!
//! ```ignore
//! use runtime_binding::prelude::*;
//!
//! let mut lifecycle = LifecycleCoordinator::<dyn Logger>::new();
//! lifecycle.with_default(|| Some(Arc::new(FacadeLogger::new("app")) as Arc<dyn Logger>));
//! lifecycle.initialize()?;
//!
//! default_logger().log(LogLevel::Info, "ready")?;
//! ```

pub mod adapters;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod registry;

pub use adapters::{AdapterFactory, AdapterInfo, MAX_ADAPTER_DEPTH};
pub use capabilities::Capability;
pub use config::{BindingConfig, ConfigError};
pub use error::{BindingError, BindingResult, BoxError, CapabilityError, CapabilityResult};
pub use lifecycle::{LifecycleCoordinator, LifecycleState};
pub use registry::{CapabilityKey, CapabilityRegistry, RegistryAuditLog};

/// Everything needed to define, bind and look up capabilities.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::adapters::{
        AdaptedBy, Adapter, AdapterCore, AdapterFactory, AdapterInfo, Implements,
    };
    pub use crate::capabilities::{
        default_executor, default_logger, executor, logger, Capability, Executor, FacadeLogger,
        LogLevel, Logger,
    };
    pub use crate::error::{BindingError, BindingResult, BoxError, CapabilityResult};
    pub use crate::lifecycle::LifecycleCoordinator;
    pub use crate::registry::{CapabilityKey, CapabilityRegistry};
    pub use crate::{adapter_info, implements};
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::capabilities::{InlineExecutor, RuntimeExecutor};

    #[test]
    fn test_coordinator_publishes_adapted_capability_globally() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .build()
            .expect("failed to build test runtime");
        let handle = rt.handle().clone();

        let mut lifecycle = LifecycleCoordinator::<dyn Executor>::new();
        lifecycle
            .with_named("lib-tests-runtime", move || {
                RuntimeExecutor::from_handle(handle.clone()).ok()
            })
            .with_named("lib-tests-inline", || {
                Some(Arc::new(InlineExecutor::new()) as Arc<dyn Executor>)
            })
            .on_shutdown(|| {
                executor("lib-tests-runtime").shutdown(true);
                Ok(())
            });
        lifecycle.initialize().unwrap();

        let runtime_exec = executor("lib-tests-runtime");
        assert!(AdapterFactory::is_adapter(&runtime_exec));
        assert!(!AdapterFactory::is_adapter(&executor("lib-tests-inline")));

        let (tx, rx) = std::sync::mpsc::channel();
        runtime_exec
            .execute(Box::new(move || {
                let _ = tx.send(7);
            }))
            .unwrap();
        assert_eq!(rx.recv().unwrap(), 7);

        drop(lifecycle);
        let registry = CapabilityRegistry::<dyn Executor>::global();
        assert!(!registry.has("lib-tests-runtime"));
        assert!(registry.is_fallback(&executor("lib-tests-inline")));
        assert!(!runtime_exec.is_running());
    }

    #[test]
    fn test_unbound_logger_is_silent() {
        let logger = CapabilityRegistry::<dyn Logger>::global().get("lib-tests-no-such-logger");
        assert!(logger.log(LogLevel::Critical, "nobody listens").is_ok());
        assert_eq!(logger.level(), LogLevel::Off);
    }
}
