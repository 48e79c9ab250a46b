//! # Adapter Engine
//!
//! Binds concrete implementations to capability interfaces.
//!
//! ```text
//! Arc<Impl>
//!   │ AdapterFactory::create::<dyn Capability, _, _>()
//!   ├── Impl: Implements<dyn Capability>  → same Arc, upcast (zero-cost)
//!   └── Impl: AdaptedBy<dyn Capability>   → Arc<Wrapper { AdapterCore<_, Impl> }>
//!                                             depth = 0 over a plain Impl,
//!                                             1 + depth(Impl) over a wrapper, ≤ 2
//! ```
//!
//! Wrappers are recovered with [`AdapterFactory::try_unwrap`], which matches
//! the per-pairing [`AdapterStamp`] before handing back the inner handle.
//!
//! ## Writing a wrapper
//!
//! 1. Give the capability trait [`AdapterInfo`] as a supertrait.
//! 2. Hold an [`AdapterCore`] in the wrapper and implement [`Adapter`].
//! 3. Implement the capability trait on the wrapper by forwarding.
//! 4. Declare `impl AdaptedBy<dyn Capability> for Impl { type Wrapper = ... }`.

pub mod factory;
pub mod record;
pub mod stamp;

pub use factory::{
    is_adapter, make_adapter, same_instance, unwrap_adapter, AdaptTo, AdapterFactory, AdapterLayer,
    Direct, Implements, Wrapped,
};
pub use record::{AdaptedBy, Adapter, AdapterCore, AdapterInfo, AdapterRecord, MAX_ADAPTER_DEPTH};
pub use stamp::AdapterStamp;
