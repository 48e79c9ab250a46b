//! Binding implementations to capability interfaces.
//!
//! [`AdapterFactory::create`] chooses the binding strategy at compile time:
//!
//! - **Direct**: the implementation already satisfies the interface
//!   ([`Implements`]); the same allocation is returned behind the interface
//!   pointer.
//! - **Wrapped**: the implementation declares a wrapper through
//!   [`AdaptedBy`]; a new wrapper is allocated and its depth checked.
//!
//! The strategy is a marker type parameter inferred from whichever of the
//! two applies, so call sites read `AdapterFactory::create::<dyn Logger, _, _>(x)`.

use std::any::type_name;
use std::sync::Arc;

use super::record::{AdaptedBy, Adapter, AdapterCore, AdapterInfo, AdapterRecord};
use super::stamp::AdapterStamp;
use crate::error::BindingResult;

// ---------------------------------------------------------------------------
// Strategy markers
// ---------------------------------------------------------------------------

/// Strategy marker: the implementation is returned as-is.
#[derive(Debug, Clone, Copy)]
pub struct Direct;

/// Strategy marker: the implementation is placed behind a wrapper.
#[derive(Debug, Clone, Copy)]
pub struct Wrapped;

/// Declares that a type already satisfies interface `I`.
///
/// Capability traits shipped with this crate carry blanket impls. For other
/// interfaces use [`implements!`](crate::implements).
pub trait Implements<I: ?Sized> {
    fn upcast(self: Arc<Self>) -> Arc<I>;
}

/// Implements [`Implements`] for types that satisfy an interface directly.
///
/// ```ignore
/// implements!(dyn Storage: DiskStorage, MemoryStorage);
/// ```
#[macro_export]
macro_rules! implements {
    ($iface:ty: $($ty:ty),+ $(,)?) => {
        $(impl $crate::adapters::Implements<$iface> for $ty {
            fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$iface> {
                self
            }
        })+
    };
}

/// Binds `Self` to interface `I` using `Strategy`.
pub trait AdaptTo<I: ?Sized, Strategy> {
    /// `true` when binding allocates nothing.
    const ZERO_COST: bool;

    fn adapt(this: Arc<Self>) -> BindingResult<Arc<I>>;
}

impl<I, T> AdaptTo<I, Direct> for T
where
    I: ?Sized,
    T: ?Sized + Implements<I>,
{
    const ZERO_COST: bool = true;

    fn adapt(this: Arc<Self>) -> BindingResult<Arc<I>> {
        Ok(this.upcast())
    }
}

impl<I, T> AdaptTo<I, Wrapped> for T
where
    I: ?Sized + 'static,
    T: ?Sized + AdaptedBy<I>,
    <T as AdaptedBy<I>>::Wrapper: Implements<I>,
{
    const ZERO_COST: bool = false;

    fn adapt(this: Arc<Self>) -> BindingResult<Arc<I>> {
        let core = AdapterCore::<I, T>::new(this)?;
        let wrapper = Arc::new(<<T as AdaptedBy<I>>::Wrapper as Adapter>::from_core(core));
        Ok(wrapper.upcast())
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// One layer of an adapter chain, as reported by [`AdapterFactory::chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterLayer {
    pub interface: &'static str,
    pub inner: &'static str,
    pub depth: usize,
    pub stamp: AdapterStamp,
}

impl AdapterLayer {
    fn from_record(record: &dyn AdapterRecord) -> Self {
        Self {
            interface: record.interface_name(),
            inner: record.inner_name(),
            depth: record.depth(),
            stamp: record.stamp(),
        }
    }
}

// ---------------------------------------------------------------------------
// AdapterFactory
// ---------------------------------------------------------------------------

/// Stateless entry point of the adapter engine.
pub struct AdapterFactory;

impl AdapterFactory {
    /// Bind `implementation` to interface `I`, wrapping only when needed.
    ///
    /// Fails with [`ChainTooDeep`](crate::BindingError::ChainTooDeep) when
    /// a wrapper would exceed the depth limit.
    pub fn create<I, T, S>(implementation: Arc<T>) -> BindingResult<Arc<I>>
    where
        I: ?Sized,
        T: ?Sized + AdaptTo<I, S>,
    {
        T::adapt(implementation)
    }

    /// Zero-cost binding, for call sites that want to insist on it.
    pub fn cast<I, T>(implementation: Arc<T>) -> Arc<I>
    where
        I: ?Sized,
        T: ?Sized + Implements<I>,
    {
        implementation.upcast()
    }

    /// Build a specific wrapper `W` around `inner`, whatever `inner` is.
    ///
    /// Use this for decorators whose inner type is itself an interface
    /// handle, which is how chains deeper than one layer are formed.
    pub fn wrap<W: Adapter>(inner: Arc<W::Inner>) -> BindingResult<Arc<W>> {
        let core = AdapterCore::new(inner)?;
        Ok(Arc::new(W::from_core(core)))
    }

    /// Whether binding `T` to `I` takes the zero-cost path.
    pub fn is_zero_cost<I, T, S>() -> bool
    where
        I: ?Sized,
        T: ?Sized + AdaptTo<I, S>,
    {
        T::ZERO_COST
    }

    /// Recover the implementation behind one adapter layer.
    ///
    /// Returns `None` when `handle` is not a wrapper, or when it wraps
    /// something other than `T` behind `I`. Chains are unwrapped one layer
    /// per call.
    pub fn try_unwrap<T, I>(handle: &Arc<I>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        I: ?Sized + AdapterInfo + 'static,
    {
        let record = handle.adapter_record()?;
        if record.stamp() != AdapterStamp::of::<I, T>() {
            log::trace!(
                "unwrap miss: {} is not an adapter of {} over {}",
                record.inner_name(),
                type_name::<I>(),
                type_name::<T>()
            );
            return None;
        }
        record.inner_any().downcast_ref::<Arc<T>>().cloned()
    }

    /// Whether `handle` was produced by the wrapper path.
    pub fn is_adapter<I: ?Sized + AdapterInfo>(handle: &Arc<I>) -> bool {
        handle.adapter_record().is_some()
    }

    /// Depth of the outermost wrapper behind `handle`.
    ///
    /// Both a plain handle and a single wrapper report 0; use
    /// [`is_adapter`](Self::is_adapter) to tell them apart.
    pub fn depth<I: ?Sized + AdapterInfo>(handle: &Arc<I>) -> usize {
        handle.adapter_record().map_or(0, |record| record.depth())
    }

    /// All layers of the chain behind `handle`, outermost first.
    pub fn chain<I: ?Sized + AdapterInfo>(handle: &Arc<I>) -> Vec<AdapterLayer> {
        let mut layers = Vec::new();
        let mut current = handle.adapter_record();
        while let Some(record) = current {
            layers.push(AdapterLayer::from_record(record));
            current = record.inner_record();
        }
        layers
    }
}

/// Whether two handles point at the same object, ignoring vtables.
pub fn same_instance<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Shorthand for [`AdapterFactory::create`].
pub fn make_adapter<I, T, S>(implementation: Arc<T>) -> BindingResult<Arc<I>>
where
    I: ?Sized,
    T: ?Sized + AdaptTo<I, S>,
{
    AdapterFactory::create::<I, T, S>(implementation)
}

/// Shorthand for [`AdapterFactory::try_unwrap`].
pub fn unwrap_adapter<T, I>(handle: &Arc<I>) -> Option<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
    I: ?Sized + AdapterInfo + 'static,
{
    AdapterFactory::try_unwrap::<T, I>(handle)
}

/// Shorthand for [`AdapterFactory::is_adapter`].
pub fn is_adapter<I: ?Sized + AdapterInfo>(handle: &Arc<I>) -> bool {
    AdapterFactory::is_adapter(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BindingError;

    trait Thermometer: AdapterInfo + Send + Sync {
        fn celsius(&self) -> f64;
    }

    impl<T: Thermometer + 'static> Implements<dyn Thermometer> for T {
        fn upcast(self: Arc<Self>) -> Arc<dyn Thermometer> {
            self
        }
    }

    /// Satisfies the interface directly.
    struct Sensor {
        reading: f64,
    }
    crate::adapter_info!(plain: Sensor);

    impl Thermometer for Sensor {
        fn celsius(&self) -> f64 {
            self.reading
        }
    }

    /// Legacy device with an unrelated API.
    struct AnalogGauge {
        millivolts: f64,
    }
    crate::adapter_info!(plain: AnalogGauge);

    struct GaugeThermometer {
        core: AdapterCore<dyn Thermometer, AnalogGauge>,
    }
    crate::adapter_info!(adapter: GaugeThermometer => core);

    impl Adapter for GaugeThermometer {
        type Interface = dyn Thermometer;
        type Inner = AnalogGauge;

        fn from_core(core: AdapterCore<dyn Thermometer, AnalogGauge>) -> Self {
            Self { core }
        }

        fn core(&self) -> &AdapterCore<dyn Thermometer, AnalogGauge> {
            &self.core
        }
    }

    impl Thermometer for GaugeThermometer {
        fn celsius(&self) -> f64 {
            self.core.inner().millivolts / 10.0
        }
    }

    impl AdaptedBy<dyn Thermometer> for AnalogGauge {
        type Wrapper = GaugeThermometer;
    }

    /// Decorator over any thermometer handle.
    struct Calibrated {
        core: AdapterCore<dyn Thermometer, dyn Thermometer>,
    }
    crate::adapter_info!(adapter: Calibrated => core);

    impl Adapter for Calibrated {
        type Interface = dyn Thermometer;
        type Inner = dyn Thermometer;

        fn from_core(core: AdapterCore<dyn Thermometer, dyn Thermometer>) -> Self {
            Self { core }
        }

        fn core(&self) -> &AdapterCore<dyn Thermometer, dyn Thermometer> {
            &self.core
        }
    }

    impl Thermometer for Calibrated {
        fn celsius(&self) -> f64 {
            self.core.inner().celsius() + 0.5
        }
    }

    #[test]
    fn test_direct_binding_reuses_allocation() {
        let sensor = Arc::new(Sensor { reading: 21.0 });
        let handle = AdapterFactory::create::<dyn Thermometer, _, _>(Arc::clone(&sensor)).unwrap();

        assert!(same_instance(&handle, &sensor));
        assert_eq!(Arc::strong_count(&sensor), 2);
        assert!(!AdapterFactory::is_adapter(&handle));
        assert_eq!(AdapterFactory::depth(&handle), 0);
        assert!(AdapterFactory::is_zero_cost::<dyn Thermometer, Sensor, _>());
        assert_eq!(handle.celsius(), 21.0);
    }

    #[test]
    fn test_wrapped_binding_forwards_and_unwraps() {
        let gauge = Arc::new(AnalogGauge { millivolts: 250.0 });
        let handle = AdapterFactory::create::<dyn Thermometer, _, _>(Arc::clone(&gauge)).unwrap();

        assert!(AdapterFactory::is_adapter(&handle));
        assert_eq!(AdapterFactory::depth(&handle), 0);
        assert!(!AdapterFactory::is_zero_cost::<dyn Thermometer, AnalogGauge, _>());
        assert_eq!(handle.celsius(), 25.0);

        let unwrapped = AdapterFactory::try_unwrap::<AnalogGauge, dyn Thermometer>(&handle).unwrap();
        assert!(Arc::ptr_eq(&unwrapped, &gauge));
    }

    #[test]
    fn test_unwrap_misses_return_none() {
        let gauge = Arc::new(AnalogGauge { millivolts: 100.0 });
        let wrapped = make_adapter::<dyn Thermometer, _, _>(gauge).unwrap();
        assert!(unwrap_adapter::<Sensor, dyn Thermometer>(&wrapped).is_none());

        let sensor: Arc<dyn Thermometer> = Arc::new(Sensor { reading: 1.0 });
        assert!(unwrap_adapter::<Sensor, dyn Thermometer>(&sensor).is_none());
        assert!(!is_adapter(&sensor));
    }

    #[test]
    fn test_three_layers_allowed_fourth_rejected() {
        let gauge = Arc::new(AnalogGauge { millivolts: 200.0 });
        let first = AdapterFactory::create::<dyn Thermometer, _, _>(gauge).unwrap();
        assert_eq!(AdapterFactory::depth(&first), 0);

        let second: Arc<dyn Thermometer> = AdapterFactory::wrap::<Calibrated>(Arc::clone(&first)).unwrap();
        assert_eq!(AdapterFactory::depth(&second), 1);
        assert_eq!(second.celsius(), 20.5);

        let third: Arc<dyn Thermometer> = AdapterFactory::wrap::<Calibrated>(Arc::clone(&second)).unwrap();
        assert_eq!(AdapterFactory::depth(&third), 2);
        assert_eq!(third.celsius(), 21.0);

        let err = AdapterFactory::wrap::<Calibrated>(Arc::clone(&third))
            .err()
            .expect("a fourth layer must be rejected");
        assert!(matches!(err, BindingError::ChainTooDeep { depth: 3, max: 2 }));
    }

    #[test]
    fn test_decorator_over_plain_handle_is_depth_zero() {
        let sensor: Arc<dyn Thermometer> = Arc::new(Sensor { reading: 10.0 });
        let calibrated: Arc<dyn Thermometer> = AdapterFactory::wrap::<Calibrated>(sensor).unwrap();
        assert!(AdapterFactory::is_adapter(&calibrated));
        assert_eq!(AdapterFactory::depth(&calibrated), 0);
        assert_eq!(calibrated.celsius(), 10.5);
    }

    #[test]
    fn test_chain_walk_and_layered_unwrap() {
        let gauge = Arc::new(AnalogGauge { millivolts: 300.0 });
        let first = AdapterFactory::create::<dyn Thermometer, _, _>(Arc::clone(&gauge)).unwrap();
        let second: Arc<dyn Thermometer> = AdapterFactory::wrap::<Calibrated>(Arc::clone(&first)).unwrap();

        let layers = AdapterFactory::chain(&second);
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].depth, 1);
        assert_eq!(layers[1].depth, 0);
        assert!(layers[1].inner.ends_with("AnalogGauge"));
        assert_eq!(layers[1].stamp, AdapterStamp::of::<dyn Thermometer, AnalogGauge>());

        let middle = AdapterFactory::try_unwrap::<dyn Thermometer, dyn Thermometer>(&second).unwrap();
        assert!(same_instance(&middle, &first));
        let innermost = AdapterFactory::try_unwrap::<AnalogGauge, dyn Thermometer>(&middle).unwrap();
        assert!(Arc::ptr_eq(&innermost, &gauge));
    }

    #[test]
    fn test_cast_is_identity() {
        let sensor = Arc::new(Sensor { reading: 3.0 });
        let handle: Arc<dyn Thermometer> = AdapterFactory::cast(Arc::clone(&sensor));
        assert!(same_instance(&handle, &sensor));
        assert!(AdapterFactory::chain(&handle).is_empty());
    }
}
