//! Process-wide identity stamps for (interface, implementation) pairings.
//!
//! A stamp is assigned once per distinct pairing, the first time it is
//! requested, from a single atomic counter. Unwrapping compares stamps
//! instead of relying on type names.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use once_cell::sync::Lazy;

static STAMP_COUNTER: AtomicU64 = AtomicU64::new(1);

static STAMPS: Lazy<DashMap<(TypeId, TypeId), AdapterStamp>> = Lazy::new(DashMap::new);

/// Unique identity of an adapter pairing. Never zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterStamp(u64);

impl AdapterStamp {
    /// Stamp for adapters exposing interface `I` over implementation `T`.
    pub fn of<I, T>() -> Self
    where
        I: ?Sized + 'static,
        T: ?Sized + 'static,
    {
        let key = (TypeId::of::<I>(), TypeId::of::<T>());
        if let Some(stamp) = STAMPS.get(&key) {
            return *stamp;
        }
        *STAMPS.entry(key).or_insert_with(|| {
            let stamp = AdapterStamp(STAMP_COUNTER.fetch_add(1, Ordering::Relaxed));
            log::trace!(
                "assigned adapter stamp {} to {} over {}",
                stamp.0,
                type_name::<I>(),
                type_name::<T>()
            );
            stamp
        })
    }

    /// Raw numeric value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for AdapterStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdapterStamp({})", self.0)
    }
}

impl fmt::Display for AdapterStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    trait Speaker {}
    trait Listener {}
    struct Radio;
    struct Phone;

    #[test]
    fn test_stamp_is_stable_and_non_zero() {
        let first = AdapterStamp::of::<dyn Speaker, Radio>();
        let again = AdapterStamp::of::<dyn Speaker, Radio>();
        assert_ne!(first.value(), 0);
        assert_eq!(first, again);
    }

    #[test]
    fn test_distinct_pairings_get_distinct_stamps() {
        let a = AdapterStamp::of::<dyn Speaker, Radio>();
        let b = AdapterStamp::of::<dyn Speaker, Phone>();
        let c = AdapterStamp::of::<dyn Listener, Radio>();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_concurrent_first_use_agrees() {
        struct Fresh;
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    AdapterStamp::of::<dyn Listener, Fresh>()
                })
            })
            .collect();
        let stamps: Vec<AdapterStamp> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(stamps.iter().all(|s| *s == stamps[0]));
    }
}
