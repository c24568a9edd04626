//! Shared state of one driver instance.
//!
//! A [`Context`] bundles the registry, the tracer, the string codec, the
//! clock and the host connection. Objects keep a weak reference to it, so
//! the context owns the objects and not the other way round.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::convert::{CStringCodec, StringCodec};
use crate::error::Result;
use crate::registry::Registry;
use crate::tracer::{NoopTracer, Tracer};
use crate::types::{ObjectId, PropertyAddress};

// =============================================================================
// Host
// =============================================================================

/// Callbacks into the audio server.
///
/// Installed when the host initializes the driver. Until then property
/// change notifications are dropped and configuration changes are applied
/// immediately.
pub trait Host: Send + Sync {
    /// Tell the host that properties of `object` changed.
    fn properties_changed(&self, object: ObjectId, addresses: &[PropertyAddress]);

    /// Ask the host to schedule a configuration change on `device`.
    ///
    /// The host later calls perform or abort with the same `action`.
    fn request_configuration_change(&self, device: ObjectId, action: u64) -> Result<()>;
}

// =============================================================================
// Clock
// =============================================================================

/// Monotonic host time source used for zero timestamps.
pub trait Clock: Send + Sync {
    /// Current host time in ticks.
    fn now(&self) -> u64;

    /// Number of ticks per second.
    fn ticks_per_second(&self) -> f64;
}

/// Nanosecond clock based on [`Instant`].
#[derive(Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        // Starts at 1 so a zero anchor always means "not running".
        u64::try_from(self.epoch.elapsed().as_nanos())
            .unwrap_or(u64::MAX)
            .saturating_add(1)
    }

    fn ticks_per_second(&self) -> f64 {
        1_000_000_000.0
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared state of one driver instance.
pub struct Context {
    registry: Registry,
    tracer: Arc<dyn Tracer>,
    strings: Arc<dyn StringCodec>,
    clock: Arc<dyn Clock>,
    host: RwLock<Option<Arc<dyn Host>>>,
    next_call: AtomicU64,
}

impl Context {
    /// Context with no tracing, C strings and a monotonic clock.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            tracer: Arc::new(NoopTracer),
            strings: Arc::new(CStringCodec),
            clock: Arc::new(MonotonicClock::new()),
            host: RwLock::new(None),
            next_call: AtomicU64::new(1),
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_strings(mut self, strings: Arc<dyn StringCodec>) -> Self {
        self.strings = strings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_host(self, host: Arc<dyn Host>) -> Self {
        self.set_host(Some(host));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tracer(&self) -> &dyn Tracer {
        self.tracer.as_ref()
    }

    pub fn strings(&self) -> &dyn StringCodec {
        self.strings.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// The connected host, if any.
    pub fn host(&self) -> Option<Arc<dyn Host>> {
        self.host
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Connect or disconnect the host.
    pub fn set_host(&self, host: Option<Arc<dyn Host>>) {
        *self.host.write().unwrap_or_else(|e| e.into_inner()) = host;
    }

    /// Allocate an id for tracing one host call.
    pub fn next_call_id(&self) -> u64 {
        self.next_call.fetch_add(1, Ordering::Relaxed)
    }

    /// Forward a property change notification to the host, if connected.
    pub fn notify(&self, object: ObjectId, addresses: &[PropertyAddress]) {
        if let Some(host) = self.host() {
            host.properties_changed(object, addresses);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("host", &self.host().is_some())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingHost;
    use super::*;
    use crate::types::selector;

    #[test]
    fn test_monotonic_clock_never_zero() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(a >= 1);
        assert!(b >= a);
    }

    #[test]
    fn test_notify_without_host_is_dropped() {
        let context = Context::new();
        context.notify(ObjectId(2), &[PropertyAddress::global(selector::NAME)]);
    }

    #[test]
    fn test_notify_reaches_host() {
        let host = Arc::new(RecordingHost::default());
        let context = Context::new().with_host(host.clone());
        context.notify(ObjectId(2), &[PropertyAddress::global(selector::NAME)]);
        assert_eq!(host.changed_selectors(ObjectId(2)), vec![selector::NAME]);

        context.set_host(None);
        context.notify(ObjectId(2), &[PropertyAddress::global(selector::NAME)]);
        assert_eq!(host.changed_selectors(ObjectId(2)).len(), 1);
    }

    #[test]
    fn test_call_ids_increase() {
        let context = Context::new();
        let a = context.next_call_id();
        assert!(context.next_call_id() > a);
    }
}
