//! # Lifecycle Coordinator
//!
//! ```text
//! Unconfigured ──configure──▶ Configuring ──initialize()──▶ Initialized
//!                                  ▲                            │
//!                                  └────────shutdown()──────────┘
//! ```
//!
//! `initialize()` on an initialized coordinator fails with
//! [`AlreadyInitialized`](crate::BindingError::AlreadyInitialized);
//! `reset()` returns to `Unconfigured`.

pub mod coordinator;

pub use coordinator::{LifecycleCallback, LifecycleCoordinator, LifecycleState};
