//! Executor capability.
//!
//! [`RuntimeExecutor`] is the wrapper-path example in this crate: a Tokio
//! [`Handle`] knows nothing about [`Executor`], so binding one goes through
//! [`AdaptedBy`] and produces a depth-0 adapter that can be unwrapped back
//! to the handle.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use tokio::runtime::Handle;

use super::Capability;
use crate::adapters::{
    AdaptedBy, Adapter, AdapterCore, AdapterFactory, AdapterInfo, Implements,
};
use crate::error::{BindingResult, CapabilityError, CapabilityResult};
use crate::registry::{CapabilityKey, CapabilityRegistry};

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget job execution.
pub trait Executor: AdapterInfo + Send + Sync {
    /// Queue `job`. Fails once the executor has been shut down.
    fn execute(&self, job: Job) -> CapabilityResult;

    fn worker_count(&self) -> usize;

    fn is_running(&self) -> bool;

    /// Jobs accepted but not yet finished.
    fn pending_tasks(&self) -> usize;

    /// Stop accepting jobs. With `wait`, block until accepted jobs finish.
    fn shutdown(&self, wait: bool);
}

impl<T: Executor + 'static> Implements<dyn Executor> for T {
    fn upcast(self: Arc<Self>) -> Arc<dyn Executor> {
        self
    }
}

static NULL_EXECUTOR: Lazy<Arc<NullExecutor>> = Lazy::new(|| Arc::new(NullExecutor));

impl Capability for dyn Executor {
    fn null_instance() -> Arc<dyn Executor> {
        NULL_EXECUTOR.clone()
    }
}

// ---------------------------------------------------------------------------
// NullExecutor / InlineExecutor
// ---------------------------------------------------------------------------

/// Accepts every job and drops it unrun.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExecutor;

crate::adapter_info!(plain: NullExecutor);

impl Executor for NullExecutor {
    fn execute(&self, _job: Job) -> CapabilityResult {
        Ok(())
    }

    fn worker_count(&self) -> usize {
        0
    }

    fn is_running(&self) -> bool {
        false
    }

    fn pending_tasks(&self) -> usize {
        0
    }

    fn shutdown(&self, _wait: bool) {}
}

/// Runs each job on the calling thread before `execute` returns.
#[derive(Debug)]
pub struct InlineExecutor {
    running: AtomicBool,
}

crate::adapter_info!(plain: InlineExecutor);

impl InlineExecutor {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
        }
    }
}

impl Default for InlineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) -> CapabilityResult {
        if !self.is_running() {
            return Err(CapabilityError::Rejected("inline executor is shut down".into()));
        }
        job();
        Ok(())
    }

    fn worker_count(&self) -> usize {
        1
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn pending_tasks(&self) -> usize {
        0
    }

    fn shutdown(&self, _wait: bool) {
        self.running.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// RuntimeExecutor
// ---------------------------------------------------------------------------

crate::adapter_info!(plain: Handle);

impl AdaptedBy<dyn Executor> for Handle {
    type Wrapper = RuntimeExecutor;
}

#[derive(Default)]
struct JobTracker {
    pending: Mutex<usize>,
    drained: Condvar,
}

/// Decrements the pending count when the job finishes or is dropped unrun.
struct PendingGuard(Arc<JobTracker>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.0.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.0.drained.notify_all();
        }
    }
}

/// Executor backed by a Tokio runtime's blocking pool.
///
/// `shutdown(true)` blocks the calling thread, so call it from outside the
/// runtime's async context.
pub struct RuntimeExecutor {
    core: AdapterCore<dyn Executor, Handle>,
    tracker: Arc<JobTracker>,
    running: AtomicBool,
}

crate::adapter_info!(adapter: RuntimeExecutor => core);

impl RuntimeExecutor {
    /// Bind `handle` to the executor capability.
    pub fn from_handle(handle: Handle) -> BindingResult<Arc<dyn Executor>> {
        AdapterFactory::create::<dyn Executor, _, _>(Arc::new(handle))
    }

    /// Bind the runtime the caller is running on.
    ///
    /// Panics outside a Tokio runtime, like [`Handle::current`].
    pub fn current() -> BindingResult<Arc<dyn Executor>> {
        Self::from_handle(Handle::current())
    }
}

impl Adapter for RuntimeExecutor {
    type Interface = dyn Executor;
    type Inner = Handle;

    fn from_core(core: AdapterCore<dyn Executor, Handle>) -> Self {
        Self {
            core,
            tracker: Arc::new(JobTracker::default()),
            running: AtomicBool::new(true),
        }
    }

    fn core(&self) -> &AdapterCore<dyn Executor, Handle> {
        &self.core
    }
}

impl Executor for RuntimeExecutor {
    fn execute(&self, job: Job) -> CapabilityResult {
        if !self.is_running() {
            return Err(CapabilityError::Rejected("runtime executor is shut down".into()));
        }
        *self.tracker.pending.lock() += 1;
        let guard = PendingGuard(Arc::clone(&self.tracker));
        self.core.inner().spawn_blocking(move || {
            let _guard = guard;
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::warn!("executor job panicked");
            }
        });
        Ok(())
    }

    fn worker_count(&self) -> usize {
        self.core.inner().metrics().num_workers()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn pending_tasks(&self) -> usize {
        *self.tracker.pending.lock()
    }

    fn shutdown(&self, wait: bool) {
        self.running.store(false, Ordering::Release);
        if wait {
            let mut pending = self.tracker.pending.lock();
            while *pending > 0 {
                self.tracker.drained.wait(&mut pending);
            }
        }
    }
}

impl fmt::Debug for RuntimeExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeExecutor")
            .field("core", &self.core)
            .field("pending", &self.pending_tasks())
            .field("running", &self.is_running())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Process-wide access
// ---------------------------------------------------------------------------

/// The process-wide executor registry.
pub fn executor_registry() -> Arc<CapabilityRegistry<dyn Executor>> {
    CapabilityRegistry::global()
}

/// The default executor, or the no-op stand-in.
pub fn default_executor() -> Arc<dyn Executor> {
    executor_registry().get_default()
}

/// The executor registered as `name`, or the no-op stand-in.
pub fn executor(name: &str) -> Arc<dyn Executor> {
    executor_registry().get(CapabilityKey::named(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::same_instance;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::runtime::{Builder, Runtime};

    fn runtime() -> Runtime {
        Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("runtime-binding-test")
            .enable_all()
            .build()
            .expect("failed to build test runtime")
    }

    #[test]
    fn test_runtime_executor_runs_jobs_and_drains() {
        let rt = runtime();
        let executor = RuntimeExecutor::from_handle(rt.handle().clone()).unwrap();
        assert_eq!(executor.worker_count(), 2);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            executor
                .execute(Box::new(move || {
                    std::thread::sleep(Duration::from_millis(2));
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        executor.shutdown(true);
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert_eq!(executor.pending_tasks(), 0);
        assert!(!executor.is_running());
        assert!(matches!(
            executor.execute(Box::new(|| {})),
            Err(CapabilityError::Rejected(_))
        ));
    }

    #[test]
    fn test_runtime_executor_survives_panicking_job() {
        let rt = runtime();
        let executor = RuntimeExecutor::from_handle(rt.handle().clone()).unwrap();
        executor.execute(Box::new(|| panic!("job failure"))).unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        executor
            .execute(Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();

        executor.shutdown(true);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(executor.pending_tasks(), 0);
    }

    #[test]
    fn test_runtime_executor_is_an_unwrappable_adapter() {
        let rt = runtime();
        let executor = RuntimeExecutor::from_handle(rt.handle().clone()).unwrap();

        assert!(AdapterFactory::is_adapter(&executor));
        assert_eq!(AdapterFactory::depth(&executor), 0);
        assert!(!AdapterFactory::is_zero_cost::<dyn Executor, Handle, _>());

        let handle = AdapterFactory::try_unwrap::<Handle, dyn Executor>(&executor).unwrap();
        assert_eq!(handle.metrics().num_workers(), 2);
        assert!(AdapterFactory::try_unwrap::<InlineExecutor, dyn Executor>(&executor).is_none());
    }

    #[test]
    fn test_current_runtime_binding() {
        let rt = runtime();
        let executor = rt.block_on(async { RuntimeExecutor::current() }).unwrap();
        assert!(executor.is_running());
        executor.shutdown(false);
        assert!(!executor.is_running());
    }

    #[test]
    fn test_inline_executor() {
        let executor = InlineExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        executor
            .execute(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(executor.worker_count(), 1);

        executor.shutdown(true);
        assert!(executor.execute(Box::new(|| {})).is_err());
    }

    #[test]
    fn test_null_executor_discards() {
        let null = <dyn Executor as Capability>::null_instance();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        null.execute(Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(null.worker_count(), 0);
        assert!(same_instance(&null, &<dyn Executor as Capability>::null_instance()));
    }

    #[test]
    fn test_global_executor_lookup() {
        let registry = executor_registry();
        assert!(registry.is_fallback(&executor("executor-tests-missing")));

        let inline: Arc<dyn Executor> = Arc::new(InlineExecutor::new());
        registry.register("executor-tests-inline", Arc::clone(&inline)).unwrap();
        assert!(same_instance(&executor("executor-tests-inline"), &inline));
        registry.unregister("executor-tests-inline").unwrap();
        assert!(registry.is_fallback(&executor("executor-tests-inline")));
    }
}
