//! Prototype-keyed instance pool.
//!
//! Every instance the pool constructs is tagged with its origin prototype and
//! recorded in that prototype's group so a single call can tear the whole group
//! down. Returned instances wait in a FIFO queue per prototype; the pool never
//! evicts on its own because wave content bounds how many instances exist.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
};

use slotmap::SlotMap;
use wave_warden_core::{
    EmissionPoint, InstanceFactory, InstanceKey, PrototypeId, ReleaseOutcome, Spawnable,
};

/// Errors reported by the instance pool.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The factory does not know how to construct the prototype.
    #[error("unknown prototype `{0}`")]
    UnknownPrototype(PrototypeId),
}

#[derive(Debug)]
struct Slot<T> {
    instance: T,
    origin: Option<PrototypeId>,
    pooled: bool,
}

#[derive(Debug, Default)]
struct PoolGroup {
    members: Vec<InstanceKey>,
    constructed: u64,
}

/// Cache of reusable instances, one FIFO queue per prototype.
pub struct InstancePool<F: InstanceFactory> {
    factory: F,
    slots: SlotMap<InstanceKey, Slot<F::Instance>>,
    queues: HashMap<PrototypeId, VecDeque<InstanceKey>>,
    groups: HashMap<PrototypeId, PoolGroup>,
}

impl<F: InstanceFactory> InstancePool<F> {
    /// Creates an empty pool that constructs instances through `factory`.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            slots: SlotMap::with_key(),
            queues: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    /// Hands out an instance of `prototype` placed at `point` and activated.
    ///
    /// A queued instance is recycled when one is available; otherwise a new one
    /// is constructed.
    pub fn acquire(
        &mut self,
        prototype: &PrototypeId,
        point: EmissionPoint,
    ) -> Result<InstanceKey, PoolError> {
        let recycled = self
            .queues
            .get_mut(prototype)
            .and_then(VecDeque::pop_front);
        if let Some(key) = recycled {
            if let Some(slot) = self.slots.get_mut(key) {
                slot.pooled = false;
                slot.instance.place(point);
                slot.instance.set_active(true);
                return Ok(key);
            }
        }

        let mut instance = self.construct(prototype)?;
        instance.place(point);
        instance.set_active(true);
        Ok(self.insert_member(prototype, instance, false))
    }

    /// Returns an instance to the queue of its origin prototype.
    ///
    /// Instances without a recognised origin are destroyed instead of pooled.
    pub fn release(&mut self, key: InstanceKey) -> ReleaseOutcome {
        let Some(slot) = self.slots.get_mut(key) else {
            return ReleaseOutcome::Unknown;
        };
        if slot.pooled {
            return ReleaseOutcome::AlreadyPooled;
        }

        let queue = slot
            .origin
            .as_ref()
            .and_then(|origin| self.queues.get_mut(origin));
        if let Some(queue) = queue {
            slot.instance.set_active(false);
            slot.pooled = true;
            queue.push_back(key);
            return ReleaseOutcome::Pooled;
        }

        if let Some(slot) = self.slots.remove(key) {
            self.factory.destroy(slot.instance);
        }
        ReleaseOutcome::Discarded
    }

    /// Constructs `count` deactivated instances of `prototype` into its queue.
    pub fn warm_up(&mut self, prototype: &PrototypeId, count: u32) -> Result<u32, PoolError> {
        if !self.factory.recognizes(prototype) {
            return Err(PoolError::UnknownPrototype(prototype.clone()));
        }

        for _ in 0..count {
            let mut instance = self.construct(prototype)?;
            instance.set_active(false);
            let key = self.insert_member(prototype, instance, true);
            if let Some(queue) = self.queues.get_mut(prototype) {
                queue.push_back(key);
            }
        }
        Ok(count)
    }

    /// Takes ownership of an instance that was not acquired through the pool.
    ///
    /// Adopted instances have no origin, so releasing them destroys them.
    pub fn adopt(&mut self, instance: F::Instance) -> InstanceKey {
        self.slots.insert(Slot {
            instance,
            origin: None,
            pooled: false,
        })
    }

    /// Destroys every queued and in-use instance of `prototype`.
    ///
    /// Returns the handles of the destroyed instances.
    pub fn clear_pool(&mut self, prototype: &PrototypeId) -> Vec<InstanceKey> {
        let _ = self.queues.remove(prototype);
        let Some(group) = self.groups.remove(prototype) else {
            return Vec::new();
        };

        let mut destroyed = Vec::with_capacity(group.members.len());
        for key in group.members {
            if let Some(slot) = self.slots.remove(key) {
                self.factory.destroy(slot.instance);
                destroyed.push(key);
            }
        }
        log::debug!(
            "cleared pool for `{prototype}`: {} instances destroyed",
            destroyed.len()
        );
        destroyed
    }

    /// Destroys every instance the pool owns, adopted ones included.
    ///
    /// Returns the handles of the destroyed instances.
    pub fn clear_all(&mut self) -> Vec<InstanceKey> {
        self.queues.clear();
        self.groups.clear();

        let mut destroyed = Vec::with_capacity(self.slots.len());
        for (key, slot) in self.slots.drain() {
            self.factory.destroy(slot.instance);
            destroyed.push(key);
        }
        destroyed
    }

    /// Borrows an instance owned by the pool.
    #[must_use]
    pub fn get(&self, key: InstanceKey) -> Option<&F::Instance> {
        self.slots.get(key).map(|slot| &slot.instance)
    }

    /// Mutably borrows an instance owned by the pool.
    pub fn get_mut(&mut self, key: InstanceKey) -> Option<&mut F::Instance> {
        self.slots.get_mut(key).map(|slot| &mut slot.instance)
    }

    /// Reports whether the instance is waiting in its queue, or `None` for an unknown handle.
    #[must_use]
    pub fn is_pooled(&self, key: InstanceKey) -> Option<bool> {
        self.slots.get(key).map(|slot| slot.pooled)
    }

    /// Prototype the instance was constructed from, if it has one.
    #[must_use]
    pub fn origin(&self, key: InstanceKey) -> Option<&PrototypeId> {
        self.slots.get(key).and_then(|slot| slot.origin.as_ref())
    }

    /// Number of queued instances ready for reuse.
    #[must_use]
    pub fn available(&self, prototype: &PrototypeId) -> usize {
        self.queues.get(prototype).map_or(0, VecDeque::len)
    }

    /// Number of instances of `prototype` currently handed out.
    #[must_use]
    pub fn in_use(&self, prototype: &PrototypeId) -> usize {
        self.groups.get(prototype).map_or(0, |group| {
            group
                .members
                .iter()
                .filter(|key| self.is_pooled(**key) == Some(false))
                .count()
        })
    }

    /// Total constructions performed for `prototype` since it was last cleared.
    #[must_use]
    pub fn constructed(&self, prototype: &PrototypeId) -> u64 {
        self.groups.get(prototype).map_or(0, |group| group.constructed)
    }

    /// Number of instances the pool owns across all prototypes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Reports whether the pool owns no instance at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Borrows the factory used to construct instances.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Iterates over every owned instance together with its handle.
    pub fn iter(&self) -> impl Iterator<Item = (InstanceKey, &F::Instance)> {
        self.slots.iter().map(|(key, slot)| (key, &slot.instance))
    }

    fn construct(&mut self, prototype: &PrototypeId) -> Result<F::Instance, PoolError> {
        let instance = self
            .factory
            .construct(prototype)
            .ok_or_else(|| PoolError::UnknownPrototype(prototype.clone()))?;
        let _ = self.queues.entry(prototype.clone()).or_default();
        let group = self.groups.entry(prototype.clone()).or_default();
        group.constructed = group.constructed.saturating_add(1);
        Ok(instance)
    }

    fn insert_member(
        &mut self,
        prototype: &PrototypeId,
        instance: F::Instance,
        pooled: bool,
    ) -> InstanceKey {
        let key = self.slots.insert(Slot {
            instance,
            origin: Some(prototype.clone()),
            pooled,
        });
        self.groups
            .entry(prototype.clone())
            .or_default()
            .members
            .push(key);
        key
    }
}

impl<F: InstanceFactory> fmt::Debug for InstancePool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstancePool")
            .field("instances", &self.slots.len())
            .field("queues", &self.queues.len())
            .finish()
    }
}
