//! Shared resource pool
//!
//! One pool is shared by every repository a manager creates. It maps
//! resource handles to materialized resources, bounded by an optional
//! LRU-evicted capacity, and guarantees at-most-one construction per
//! distinct handle even under concurrent first access.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard};

use pkgrepo_schema::ResourceHandle;
use tracing::{debug, trace};

use crate::resource::{Resource, ResourceError, ResourceType};

/// Snapshot of pool occupancy and traffic counters.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Number of resources currently cached.
    pub entries: usize,
    /// Configured capacity, `None` if unbounded.
    pub cache_size: Option<usize>,
    /// Lookups served from cache since construction or the last clear.
    pub hits: u64,
    /// Lookups that had to materialize a resource.
    pub misses: u64,
}

#[derive(Debug)]
struct CacheEntry {
    resource: Resource,
    last_access: u64,
}

#[derive(Debug, Default)]
struct PoolState {
    types: HashMap<&'static str, ResourceType>,
    entries: HashMap<ResourceHandle, CacheEntry>,
    in_flight: HashSet<ResourceHandle>,
    access_counter: u64,
    hits: u64,
    misses: u64,
}

impl PoolState {
    fn evict_to_admit(&mut self, max: usize) {
        while self.entries.len() >= max {
            let lru_key = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match lru_key {
                Some(key) => {
                    self.entries.remove(&key);
                    debug!(handle = %key, "evicted least-recently-used resource");
                }
                None => break,
            }
        }
    }
}

/// Generic object cache keyed by [`ResourceHandle`], shared across all
/// repository instances created by one manager.
#[derive(Debug)]
pub struct ResourcePool {
    cache_size: Option<usize>,
    state: Mutex<PoolState>,
    built: Condvar,
}

impl ResourcePool {
    /// Create a pool holding at most `cache_size` resources; `None` means
    /// unbounded.
    pub fn new(cache_size: Option<usize>) -> Self {
        Self {
            cache_size,
            state: Mutex::new(PoolState::default()),
            built: Condvar::new(),
        }
    }

    /// Create an unbounded pool.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().expect("resource pool lock poisoned")
    }

    /// Associate a resource type with the pool so resources can be
    /// constructed from matching handles. Registering the same key twice is
    /// a no-op.
    pub fn register_resource(&self, resource_type: ResourceType) {
        let mut state = self.lock_state();
        state
            .types
            .entry(resource_type.key())
            .or_insert(resource_type);
    }

    /// Return the cached resource for `handle`, materializing and caching it
    /// on first access.
    ///
    /// Concurrent calls with the same handle do not race: one caller builds
    /// while the lock is dropped, the rest wait and receive the canonical
    /// instance. Failures are returned to every caller and never cached.
    pub fn get_resource_from_handle(
        &self,
        handle: &ResourceHandle,
    ) -> Result<Resource, ResourceError> {
        let mut state = self.lock_state();
        loop {
            state.access_counter += 1;
            let counter = state.access_counter;
            if let Some(entry) = state.entries.get_mut(handle) {
                entry.last_access = counter;
                let resource = entry.resource.clone();
                state.hits += 1;
                trace!(%handle, "resource cache hit");
                return Ok(resource);
            }

            if state.in_flight.contains(handle) {
                state = self
                    .built
                    .wait(state)
                    .expect("resource pool lock poisoned");
                continue;
            }

            let Some(resource_type) = state.types.get(handle.key()).cloned() else {
                return Err(ResourceError::UnknownResourceType(handle.key().to_string()));
            };

            state.misses += 1;
            state.in_flight.insert(handle.clone());
            drop(state);

            // Construction may touch backend storage; the lock stays dropped
            // so unrelated lookups are not serialized behind it.
            let built = resource_type.build(handle.clone());

            let mut state = self.lock_state();
            state.in_flight.remove(handle);
            self.built.notify_all();

            return match built {
                Ok(resource) => {
                    trace!(%handle, "materialized resource");
                    match self.cache_size {
                        Some(0) => {}
                        Some(max) => {
                            state.evict_to_admit(max);
                            state.entries.insert(
                                handle.clone(),
                                CacheEntry {
                                    resource: resource.clone(),
                                    last_access: counter,
                                },
                            );
                        }
                        None => {
                            state.entries.insert(
                                handle.clone(),
                                CacheEntry {
                                    resource: resource.clone(),
                                    last_access: counter,
                                },
                            );
                        }
                    }
                    Ok(resource)
                }
                Err(err) => Err(err),
            };
        }
    }

    /// Evict all cached resources. Registered types survive; subsequent
    /// lookups rebuild from scratch.
    pub fn clear_caches(&self) {
        let mut state = self.lock_state();
        let evicted = state.entries.len();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
        debug!(evicted, "cleared resource pool");
    }

    /// Number of resources currently cached.
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// Whether the cache currently holds no resources.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity, `None` if unbounded.
    pub fn cache_size(&self) -> Option<usize> {
        self.cache_size
    }

    /// Occupancy and traffic counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        PoolStats {
            entries: state.entries.len(),
            cache_size: self.cache_size,
            hits: state.hits,
            misses: state.misses,
        }
    }
}
