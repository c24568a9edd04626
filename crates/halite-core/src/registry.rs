//! Object registry.
//!
//! Maps host-visible object ids to live objects and controls their
//! lifetime. Every entry carries one reference count shared by:
//!
//! - the registration itself (one reference, dropped by [`Registry::unregister`])
//! - [`ObjectRef`] pins taken by [`Registry::lookup`] for the duration of a call
//! - host-held references taken through [`Registry::add_ref`]
//!
//! Unregistering also drops the host-held references, since the host can no
//! longer name the id to release them.
//!
//! A lookup only succeeds while the count is non-zero, so an object whose
//! last reference is gone can never be pinned again. Unregistering removes
//! the id from the table immediately: later lookups miss even while older
//! pins are still outstanding, and the object is destroyed when the last of
//! those pins is released. Until then the id stays reserved: inserting a new
//! object under a retiring id fails with [`Error::AlreadyRetiring`].
//!
//! # Lifecycle
//!
//! ```text
//! Constructed ──register──► Registered ──activate──► Active
//!                                │                      │
//!                                └──────unregister──────┴──► Retiring ──last ref──► Destroyed
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Missing, Result};
use crate::object::Object;
use crate::types::ObjectId;

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle state of a registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Lifecycle {
    /// Built but not yet visible to the host.
    Constructed = 0,
    /// Visible to lookups, parent still setting it up.
    Registered = 1,
    /// Fully usable.
    Active = 2,
    /// Unregistered, waiting for outstanding references.
    Retiring = 3,
    /// All references released.
    Destroyed = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Constructed,
            1 => Self::Registered,
            2 => Self::Active,
            3 => Self::Retiring,
            _ => Self::Destroyed,
        }
    }
}

// =============================================================================
// Entries
// =============================================================================

struct Entry {
    id: ObjectId,
    object: Box<dyn Object>,
    refs: AtomicUsize,
    /// The part of `refs` held by the host.
    host_refs: AtomicUsize,
    state: AtomicU8,
}

impl Entry {
    fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Increment the count unless it already reached zero.
    fn try_pin(&self) -> Option<usize> {
        self.refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n == 0 {
                    None
                } else {
                    n.checked_add(1)
                }
            })
            .ok()
            .map(|prev| prev + 1)
    }

    /// Move from `from` to `to`, returning the state actually observed.
    fn transition(&self, from: Lifecycle, to: Lifecycle) -> std::result::Result<(), Lifecycle> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Lifecycle::from_u8)
    }

    /// Enter `Retiring` from `Registered` or `Active`.
    fn begin_retire(&self) -> Result<()> {
        loop {
            match self.state() {
                current @ (Lifecycle::Constructed | Lifecycle::Registered | Lifecycle::Active) => {
                    if self.transition(current, Lifecycle::Retiring).is_ok() {
                        return Ok(());
                    }
                }
                Lifecycle::Retiring | Lifecycle::Destroyed => {
                    return Err(Error::AlreadyRetiring(self.id));
                }
            }
        }
    }
}

struct Shared {
    table: RwLock<HashMap<ObjectId, Arc<Entry>>>,
    /// Unregistered ids whose objects still have references. Locked after
    /// `table` when both are needed.
    retiring: Mutex<HashSet<ObjectId>>,
    next_id: AtomicU32,
}

// =============================================================================
// Registry
// =============================================================================

/// Registry of live objects.
///
/// Cheap to clone: all clones share the same table.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::starting_at(ObjectId::FIRST_DYNAMIC)
    }

    /// Registry handing out dynamic ids from `first`.
    pub fn starting_at(first: ObjectId) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: RwLock::new(HashMap::new()),
                retiring: Mutex::new(HashSet::new()),
                next_id: AtomicU32::new(first.get()),
            }),
        }
    }

    // A poisoned lock only means another thread panicked while holding it.
    // The table is updated with single inserts and removes, so it is still
    // consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ObjectId, Arc<Entry>>> {
        self.shared.table.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectId, Arc<Entry>>> {
        self.shared.table.write().unwrap_or_else(|e| e.into_inner())
    }

    fn retiring(&self) -> MutexGuard<'_, HashSet<ObjectId>> {
        self.shared.retiring.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry(&self, id: ObjectId) -> Result<Arc<Entry>> {
        self.read()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(Missing::Object(id)))
    }

    /// Reserve a fresh object id.
    ///
    /// Ids are never reused. Running out is reported as
    /// [`Error::ReferenceExhausted`].
    pub fn reserve_id(&self) -> Result<ObjectId> {
        self.shared
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n == 0 {
                    None
                } else {
                    Some(n.checked_add(1).unwrap_or(0))
                }
            })
            .map(ObjectId)
            .map_err(|_| {
                log::error!("object id space exhausted");
                Error::ReferenceExhausted
            })
    }

    /// Insert an object under its own id in the `Registered` state.
    ///
    /// The registration holds one reference. An id whose previous object
    /// is still retiring is refused until that object is destroyed.
    pub fn insert(&self, object: Box<dyn Object>) -> Result<ObjectId> {
        let id = object.id();
        let class = object.class_id();
        let mut table = self.write();
        if table.contains_key(&id) {
            return Err(Error::AlreadyRegistered(id));
        }
        if self.retiring().contains(&id) {
            return Err(Error::AlreadyRetiring(id));
        }
        table.insert(
            id,
            Arc::new(Entry {
                id,
                object,
                refs: AtomicUsize::new(1),
                host_refs: AtomicUsize::new(0),
                state: AtomicU8::new(Lifecycle::Registered as u8),
            }),
        );
        drop(table);
        log::debug!(
            "registered object {id} ({})",
            crate::strings::class_id_to_string(class)
        );
        Ok(id)
    }

    /// Reserve an id, build the object for it and register it.
    pub fn register<O, F>(&self, build: F) -> Result<ObjectId>
    where
        O: Object,
        F: FnOnce(ObjectId) -> O,
    {
        let id = self.reserve_id()?;
        self.insert(Box::new(build(id)))
    }

    /// Pin a live object.
    ///
    /// Returns `None` when the id is unknown, unregistered, or its last
    /// reference is already gone.
    pub fn lookup(&self, id: ObjectId) -> Option<ObjectRef> {
        let table = self.read();
        let entry = table.get(&id)?;
        entry.try_pin()?;
        Some(ObjectRef {
            entry: Arc::clone(entry),
            registry: self.clone(),
        })
    }

    /// Pin a live object, failing with `NotFound`.
    pub fn get(&self, id: ObjectId) -> Result<ObjectRef> {
        self.lookup(id).ok_or(Error::NotFound(Missing::Object(id)))
    }

    /// Mark a registered object as fully set up.
    ///
    /// Idempotent for objects that are already active.
    pub fn activate(&self, id: ObjectId) -> Result<()> {
        let entry = self.entry(id)?;
        match entry.transition(Lifecycle::Registered, Lifecycle::Active) {
            Ok(()) | Err(Lifecycle::Active) => Ok(()),
            Err(_) => Err(Error::AlreadyRetiring(id)),
        }
    }

    /// Remove an object from the table and drop the registration reference.
    ///
    /// Lookups fail from this point on. The object's children are
    /// unregistered too. The object itself is destroyed once every
    /// outstanding pin has been released.
    pub fn unregister(&self, id: ObjectId) -> Result<()> {
        let entry = {
            let mut table = self.write();
            let entry = table
                .get(&id)
                .cloned()
                .ok_or(Error::NotFound(Missing::Object(id)))?;
            entry.begin_retire()?;
            table.remove(&id);
            self.retiring().insert(id);
            // The registration reference keeps the count above zero here.
            let host = entry.host_refs.swap(0, Ordering::AcqRel);
            entry.refs.fetch_sub(host, Ordering::AcqRel);
            entry
        };
        log::debug!("retiring object {id}");
        entry.object.retire_children(self);
        self.unpin(&entry);
        Ok(())
    }

    /// Add a host-held reference. Returns the new count.
    pub fn add_ref(&self, id: ObjectId) -> Result<usize> {
        // Holding the table lock keeps `unregister` from dropping host
        // references between the two updates.
        let table = self.read();
        let entry = table.get(&id).ok_or(Error::NotFound(Missing::Object(id)))?;
        let count = entry.try_pin().ok_or(Error::AlreadyRetiring(id))?;
        entry.host_refs.fetch_add(1, Ordering::AcqRel);
        Ok(count)
    }

    /// Drop a host-held reference. Returns the new count.
    ///
    /// The registration reference is only ever dropped by
    /// [`unregister`](Self::unregister), so an unbalanced release is
    /// ignored instead of destroying a registered object.
    pub fn release(&self, id: ObjectId) -> Result<usize> {
        let table = self.read();
        let entry = table.get(&id).ok_or(Error::NotFound(Missing::Object(id)))?;
        match entry
            .host_refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            // The registration reference is still held while the id is mapped.
            Ok(_) => Ok(entry.refs.fetch_sub(1, Ordering::AcqRel) - 1),
            Err(_) => {
                log::warn!("unbalanced release of object {id}");
                Ok(entry.refs.load(Ordering::Acquire))
            }
        }
    }

    /// Current lifecycle state of a registered object.
    pub fn state(&self, id: ObjectId) -> Option<Lifecycle> {
        self.read().get(&id).map(|entry| entry.state())
    }

    /// True while `id` was unregistered but its object is still referenced.
    pub fn is_retiring(&self, id: ObjectId) -> bool {
        self.retiring().contains(&id)
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all registered objects, sorted.
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn unpin(&self, entry: &Arc<Entry>) {
        let prev = entry.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "object {} over-released", entry.id);
        if prev == 1 {
            self.finalize(entry);
        }
    }

    /// Called exactly once, when the count drops to zero.
    fn finalize(&self, entry: &Arc<Entry>) {
        let still_mapped = {
            let mut table = self.write();
            self.retiring().remove(&entry.id);
            match table.get(&entry.id) {
                Some(mapped) if Arc::ptr_eq(mapped, entry) => table.remove(&entry.id).is_some(),
                _ => false,
            }
        };
        if still_mapped && entry.begin_retire().is_ok() {
            entry.object.retire_children(self);
        }
        entry
            .state
            .store(Lifecycle::Destroyed as u8, Ordering::Release);
        log::debug!("destroyed object {}", entry.id);
    }
}

// =============================================================================
// ObjectRef
// =============================================================================

/// A pinned object.
///
/// Holding an `ObjectRef` keeps the object alive. Dropping it releases
/// the pin.
pub struct ObjectRef {
    entry: Arc<Entry>,
    registry: Registry,
}

impl ObjectRef {
    pub fn id(&self) -> ObjectId {
        self.entry.id
    }

    pub fn state(&self) -> Lifecycle {
        self.entry.state()
    }

    /// True while the object is in the `Active` state.
    pub fn is_active(&self) -> bool {
        self.state() == Lifecycle::Active
    }

    /// Current reference count, including this pin.
    pub fn ref_count(&self) -> usize {
        self.entry.refs.load(Ordering::Acquire)
    }

    /// Typed access to the pinned object.
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.entry.object.as_any().downcast_ref::<T>()
    }

    /// The registry this pin belongs to.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::ops::Deref for ObjectRef {
    type Target = dyn Object;

    fn deref(&self) -> &Self::Target {
        self.entry.object.as_ref()
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        // This pin keeps the count above zero.
        self.entry.refs.fetch_add(1, Ordering::AcqRel);
        Self {
            entry: Arc::clone(&self.entry),
            registry: self.registry.clone(),
        }
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        self.registry.unpin(&self.entry);
    }
}

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::test_support::{Probe, ProbeObject};
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn register_probe(registry: &Registry) -> (ObjectId, Probe) {
        let probe = Probe::default();
        let p = probe.clone();
        let id = registry.register(move |id| ProbeObject::new(id, p)).unwrap();
        (id, probe)
    }

    #[test]
    fn test_ids_start_after_plugin() {
        let registry = Registry::new();
        let (a, _) = register_probe(&registry);
        let (b, _) = register_probe(&registry);
        assert_eq!(a, ObjectId(2));
        assert_eq!(b, ObjectId(3));
    }

    #[test]
    fn test_lookup_pins_and_unpins() {
        let registry = Registry::new();
        let (id, _) = register_probe(&registry);
        let pin = registry.lookup(id).unwrap();
        assert_eq!(pin.ref_count(), 2);
        let second = pin.clone();
        assert_eq!(pin.ref_count(), 3);
        drop(second);
        drop(pin);
        assert_eq!(registry.entry(id).unwrap().refs.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let registry = Registry::new();
        let (id, probe) = register_probe(&registry);
        assert_eq!(registry.state(id), Some(Lifecycle::Registered));
        registry.activate(id).unwrap();
        registry.activate(id).unwrap();
        assert_eq!(registry.state(id), Some(Lifecycle::Active));

        registry.unregister(id).unwrap();
        assert_eq!(registry.state(id), None);
        assert!(probe.is_dropped());
    }

    #[test]
    fn test_unregister_registered_object() {
        let registry = Registry::new();
        let (id, probe) = register_probe(&registry);
        registry.unregister(id).unwrap();
        assert!(probe.is_dropped());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_with_outstanding_pin() {
        let registry = Registry::new();
        let (id, probe) = register_probe(&registry);
        registry.activate(id).unwrap();

        let pin = registry.lookup(id).unwrap();
        registry.unregister(id).unwrap();

        assert!(registry.lookup(id).is_none());
        assert_eq!(pin.state(), Lifecycle::Retiring);
        assert!(!probe.is_dropped());
        assert_eq!(pin.id(), id);

        drop(pin);
        assert!(probe.is_dropped());
    }

    #[test]
    fn test_double_unregister() {
        let registry = Registry::new();
        let (id, _) = register_probe(&registry);
        registry.unregister(id).unwrap();
        assert_eq!(
            registry.unregister(id),
            Err(Error::NotFound(Missing::Object(id)))
        );
    }

    #[test]
    fn test_activate_after_unregister_fails() {
        let registry = Registry::new();
        let (id, _) = register_probe(&registry);
        let pin = registry.lookup(id).unwrap();
        registry.unregister(id).unwrap();
        assert!(registry.activate(id).is_err());
        drop(pin);
    }

    #[test]
    fn test_host_refs_never_drop_registration() {
        let registry = Registry::new();
        let (id, probe) = register_probe(&registry);
        assert_eq!(registry.add_ref(id), Ok(2));
        assert_eq!(registry.release(id), Ok(1));
        assert_eq!(registry.release(id), Ok(1));
        assert!(!probe.is_dropped());
        assert!(registry.lookup(id).is_some());
    }

    #[test]
    fn test_unregister_drops_host_refs() {
        let registry = Registry::new();
        let (id, probe) = register_probe(&registry);
        registry.add_ref(id).unwrap();
        registry.add_ref(id).unwrap();
        let pin = registry.lookup(id).unwrap();
        assert_eq!(pin.ref_count(), 4);

        registry.unregister(id).unwrap();
        assert_eq!(pin.ref_count(), 1);
        assert!(registry.release(id).is_err());
        assert!(!probe.is_dropped());
        drop(pin);
        assert!(probe.is_dropped());
    }

    #[test]
    fn test_duplicate_insert() {
        let registry = Registry::new();
        let probe = Probe::default();
        registry
            .insert(Box::new(ProbeObject::new(ObjectId::PLUGIN, probe.clone())))
            .unwrap();
        assert_eq!(
            registry.insert(Box::new(ProbeObject::new(ObjectId::PLUGIN, probe))),
            Err(Error::AlreadyRegistered(ObjectId::PLUGIN))
        );
    }

    #[test]
    fn test_retiring_id_not_reused() {
        let registry = Registry::new();
        let first = Probe::default();
        registry
            .insert(Box::new(ProbeObject::new(ObjectId::PLUGIN, first.clone())))
            .unwrap();
        let old = registry.lookup(ObjectId::PLUGIN).unwrap();
        registry.unregister(ObjectId::PLUGIN).unwrap();
        assert!(registry.is_retiring(ObjectId::PLUGIN));

        let second = Probe::default();
        assert_eq!(
            registry.insert(Box::new(ProbeObject::new(ObjectId::PLUGIN, second.clone()))),
            Err(Error::AlreadyRetiring(ObjectId::PLUGIN))
        );
        assert!(second.is_dropped());

        drop(old);
        assert!(first.is_dropped());
        assert!(!registry.is_retiring(ObjectId::PLUGIN));
        registry
            .insert(Box::new(ProbeObject::new(ObjectId::PLUGIN, Probe::default())))
            .unwrap();
        assert!(registry.lookup(ObjectId::PLUGIN).is_some());
    }

    #[test]
    fn test_id_exhaustion() {
        let registry = Registry::starting_at(ObjectId(u32::MAX));
        let (last, _) = register_probe(&registry);
        assert_eq!(last, ObjectId(u32::MAX));
        assert_eq!(registry.reserve_id(), Err(Error::ReferenceExhausted));
        assert_eq!(registry.reserve_id(), Err(Error::ReferenceExhausted));
    }

    #[test]
    fn test_downcast() {
        let registry = Registry::new();
        let (id, _) = register_probe(&registry);
        let pin = registry.lookup(id).unwrap();
        assert!(pin.downcast_ref::<ProbeObject>().is_some());
    }

    #[test]
    fn test_concurrent_pins_during_unregister() {
        let registry = Registry::new();
        let (id, probe) = register_probe(&registry);
        registry.activate(id).unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut hits = 0usize;
                    while !stop.load(Ordering::Acquire) {
                        if let Some(pin) = registry.lookup(id) {
                            assert_ne!(pin.state(), Lifecycle::Destroyed);
                            hits += 1;
                        }
                    }
                    hits
                })
            })
            .collect();

        thread::sleep(std::time::Duration::from_millis(20));
        registry.unregister(id).unwrap();
        thread::sleep(std::time::Duration::from_millis(5));
        stop.store(true, Ordering::Release);

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(registry.lookup(id).is_none());
        assert!(probe.is_dropped());
        assert_eq!(probe.drop_count(), 1);
    }
}
