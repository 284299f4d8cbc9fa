//! Fixed-capacity object pools for link graphs and jobs.
//!
//! A thin wrapper around a `SlotMap` that refuses to grow past a configured
//! number of live items. Pools are owned and mutated by the main thread only.

use slotmap::{Key, SlotMap};

use crate::id::{LinkGraphId, LinkGraphJobId};
use crate::job::LinkGraphJob;
use crate::link_graph::LinkGraph;

/// Default capacity of both pools.
pub const DEFAULT_POOL_CAPACITY: usize = 0xFFFF;

/// Errors returned by pool allocation.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("{pool} pool is full ({capacity} items)")]
    Full {
        pool: &'static str,
        capacity: usize,
    },
}

/// A bounded slot map.
#[derive(Debug)]
pub struct Pool<K: Key, T> {
    name: &'static str,
    items: SlotMap<K, T>,
    capacity: usize,
}

impl<K: Key, T> Pool<K, T> {
    /// Create an empty pool holding at most `capacity` live items.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            items: SlotMap::with_key(),
            capacity,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether one more item fits.
    pub fn can_allocate_item(&self) -> bool {
        self.items.len() < self.capacity
    }

    /// Insert an item built from its own key.
    pub fn insert_with_key(&mut self, f: impl FnOnce(K) -> T) -> Result<K, PoolError> {
        if !self.can_allocate_item() {
            return Err(PoolError::Full {
                pool: self.name,
                capacity: self.capacity,
            });
        }
        Ok(self.items.insert_with_key(f))
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    pub fn remove(&mut self, key: K) -> Option<T> {
        self.items.remove(key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.items.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.items.iter_mut()
    }
}

/// Pool of live link graphs.
pub type LinkGraphPool = Pool<LinkGraphId, LinkGraph>;

/// Pool of running or pending jobs.
pub type LinkGraphJobPool = Pool<LinkGraphJobId, LinkGraphJob>;

impl LinkGraphPool {
    pub fn with_default_capacity() -> Self {
        Self::new("link graph", DEFAULT_POOL_CAPACITY)
    }
}

impl LinkGraphJobPool {
    pub fn with_default_capacity() -> Self {
        Self::new("link graph job", DEFAULT_POOL_CAPACITY)
    }
}
