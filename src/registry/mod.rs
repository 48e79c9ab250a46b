//! # Named Capability Registry
//!
//! Process-wide, thread-safe lookup of capability instances by name.
//!
//! ```ignore
//! let registry = CapabilityRegistry::<dyn Logger>::global();
//! registry.register("network", Arc::new(FacadeLogger::new("net")))?;
//!
//! // Unbound names resolve to the no-op stand-in, never an error.
//! registry.get("missing").log(LogLevel::Info, "discarded")?;
//! ```
//!
//! Mutations are recorded in a [`RegistryAuditLog`].

pub mod audit;
pub mod capability_registry;
pub mod key;

pub use audit::{RegistryAction, RegistryAuditLog, RegistryEvent, DEFAULT_AUDIT_CAPACITY};
pub use capability_registry::{CapabilityFactory, CapabilityRegistry};
pub use key::CapabilityKey;
