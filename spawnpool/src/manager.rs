// Copyright 2025 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::any::TypeId;
use std::any::type_name;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use foldhash::HashMap;

use crate::Error;
use crate::Pool;
use crate::PoolBase;
use crate::PoolConfig;
use crate::PoolInfo;
use crate::Result;
use crate::common::Clock;
use crate::common::system_clock;

/// Owns at most one [`Pool`] per pooled type and ticks them all.
///
/// The host loop calls [`PoolManager::update`] once per frame; that is the only thing that moves
/// the automatic expiry sweeps of the managed pools.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use spawnpool::PoolConfig;
/// use spawnpool::PoolManager;
///
/// struct Enemy;
///
/// let mut manager = PoolManager::new();
/// let pool = manager
///     .create_pool::<Enemy>(PoolConfig::new().with_capacity(32))
///     .unwrap();
/// pool.register(Arc::new(Enemy)).unwrap();
///
/// let frame = Duration::from_millis(16);
/// manager.update(frame, frame);
/// assert_eq!(manager.get_pool::<Enemy>().unwrap().count(), 1);
/// ```
pub struct PoolManager {
    clock: Arc<dyn Clock>,
    pools: HashMap<TypeId, Box<dyn PoolBase>>,
}

impl fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("clock", &self.clock)
            .field("pools", &self.pool_infos())
            .finish()
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PoolManager {
    /// Creates a new [`PoolManager`] whose pools run on the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Creates a new [`PoolManager`] whose pools all share `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pools: HashMap::default(),
        }
    }

    /// Returns the number of managed pools.
    pub fn count(&self) -> usize {
        self.pools.len()
    }

    /// Returns `true` if a pool of `T` exists.
    pub fn has_pool<T: Send + Sync + 'static>(&self) -> bool {
        self.pools.contains_key(&TypeId::of::<T>())
    }

    /// Creates the pool of `T`.
    ///
    /// Fails with [`Error::PoolAlreadyExists`] if there is one already.
    pub fn create_pool<T: Send + Sync + 'static>(
        &mut self,
        config: PoolConfig,
    ) -> Result<&mut Pool<T>> {
        match self.pools.entry(TypeId::of::<T>()) {
            Entry::Occupied(_) => {
                return Err(Error::PoolAlreadyExists {
                    type_name: type_name::<T>(),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(Box::new(Pool::<T>::with_clock(config, self.clock.clone())));
            }
        }
        log::debug!("created the pool of `{}` with {config:?}", type_name::<T>());

        self.get_pool_mut::<T>().ok_or(Error::PoolNotFound {
            type_name: type_name::<T>(),
        })
    }

    /// Returns the pool of `T`, if any.
    pub fn get_pool<T: Send + Sync + 'static>(&self) -> Option<&Pool<T>> {
        self.pools
            .get(&TypeId::of::<T>())
            .and_then(|pool| pool.as_any().downcast_ref())
    }

    /// Returns the pool of `T` mutably, if any.
    pub fn get_pool_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut Pool<T>> {
        self.pools
            .get_mut(&TypeId::of::<T>())
            .and_then(|pool| pool.as_any_mut().downcast_mut())
    }

    /// Destroys the pool of `T`, discarding everything in it.
    ///
    /// Returns `false` if there was no such pool.
    pub fn destroy_pool<T: Send + Sync + 'static>(&mut self) -> bool {
        match self.pools.remove(&TypeId::of::<T>()) {
            Some(mut pool) => {
                pool.destroy();
                log::debug!("destroyed the pool of `{}`", type_name::<T>());
                true
            }
            None => false,
        }
    }

    /// Squeezes every pool. Returns how many objects went in total.
    pub fn squeeze(&mut self) -> usize {
        self.pools.values_mut().map(|pool| pool.squeeze()).sum()
    }

    /// Discards every idle, unlocked object of every pool. Returns how many went in total.
    pub fn discard_all_unused(&mut self) -> usize {
        self.pools
            .values_mut()
            .map(|pool| pool.discard_all_unused())
            .sum()
    }

    /// Ticks every pool. Call this once per frame with the elapsed scaled and unscaled time.
    pub fn update(&mut self, delta: Duration, unscaled_delta: Duration) {
        for pool in self.pools.values_mut() {
            pool.update(delta, unscaled_delta);
        }
    }

    /// Returns the status of every pool, sorted by type name.
    pub fn pool_infos(&self) -> Vec<PoolInfo> {
        let mut infos: Vec<PoolInfo> = self.pools.values().map(|pool| pool.info()).collect();
        infos.sort_by_key(|info| info.type_name);
        infos
    }

    /// Returns every managed pool behind its type-erased face.
    pub fn pools(&self) -> impl Iterator<Item = &dyn PoolBase> {
        self.pools.values().map(|pool| &**pool)
    }

    /// Destroys every pool and empties the manager.
    pub fn shutdown(&mut self) {
        for (_, mut pool) in self.pools.drain() {
            pool.destroy();
        }
    }
}
