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

//! Reference-counted object pools.
//!
//! A [`Pool`] never creates objects on its own. You put objects in with [`Pool::register`], and
//! from then on the pool hands them out with [`Pool::spawn`] and takes them back with
//! [`Pool::unspawn`]. Objects are identified by their [`Arc`] allocation, not by value.
//!
//! Idle objects are trimmed in three ways:
//!
//! * [`Pool::squeeze`] discards idle objects until the pool fits its capacity. It runs on its own
//!   when the capacity shrinks, when a registration overflows it, or when an unspawn leaves an
//!   idle object in an overflowing pool.
//! * [`Pool::discard_all_expired`] discards objects that have been idle longer than the expire
//!   time. [`Pool::update`] runs it every auto-clear interval.
//! * [`Pool::discard_all_unused`] discards every idle object.
//!
//! Objects that are in use or locked are never trimmed, so a pool may stay above capacity while
//! everything in it is pinned.
//!
//! A pool is not synchronized. Every mutating call takes `&mut self`; share it across threads
//! behind your own lock, or keep it on the thread that ticks it.
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use spawnpool::Pool;
//! use spawnpool::PoolConfig;
//!
//! let mut pool = Pool::new(PoolConfig::new().with_capacity(8));
//!
//! let bullet = Arc::new(String::from("bullet"));
//! pool.register(bullet.clone()).unwrap(); // registered objects start in use
//! assert!(pool.spawn().is_none());
//!
//! pool.unspawn(&bullet);
//! let again = pool.spawn().unwrap();
//! assert!(Arc::ptr_eq(&again, &bullet));
//! ```

use std::any::Any;
use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use foldhash::HashMap;

use crate::Error;
use crate::ObjectHooks;
use crate::PoolObjectInfo;
use crate::Result;
use crate::common::Clock;
use crate::common::system_clock;
use crate::object::PoolObject;

/// The configuration of [`Pool`].
///
/// The default is a pool with no capacity, no expiry and no automatic sweeps: pure manually
/// managed storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum number of resident objects, or `None` for unbounded.
    ///
    /// This is a target for [`Pool::squeeze`], not an allocation limit.
    pub capacity: Option<usize>,

    /// How long an object may stay idle before a sweep discards it, or `None` to never expire.
    pub expire_time: Option<Duration>,

    /// How much unscaled time passes between automatic expiry sweeps, or `None` to never sweep.
    pub auto_clear_interval: Option<Duration>,

    /// Whether one object may be spawned to several callers at once.
    ///
    /// Fixed for the lifetime of the pool.
    pub allow_multi_reference: bool,
}

impl PoolConfig {
    /// Creates a new [`PoolConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new [`PoolConfig`] with the specified capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Returns a new [`PoolConfig`] with the specified expire time.
    pub fn with_expire_time(mut self, expire_time: Duration) -> Self {
        self.expire_time = Some(expire_time);
        self
    }

    /// Returns a new [`PoolConfig`] with the specified auto-clear interval.
    pub fn with_auto_clear_interval(mut self, interval: Duration) -> Self {
        self.auto_clear_interval = Some(interval);
        self
    }

    /// Returns a new [`PoolConfig`] that allows or forbids shared spawning.
    pub fn with_multi_reference(mut self, allow: bool) -> Self {
        self.allow_multi_reference = allow;
        self
    }
}

/// The current pool status.
///
/// See [`Pool::info`] and [`PoolManager::pool_infos`](crate::PoolManager::pool_infos).
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct PoolInfo {
    /// Name of the pooled type.
    pub type_name: &'static str,

    /// Number of resident objects.
    pub count: usize,

    /// Number of resident objects with at least one outstanding spawn.
    pub in_use_count: usize,

    /// Number of locked objects.
    pub locked_count: usize,

    /// Configured capacity.
    pub capacity: Option<usize>,

    /// Configured expire time.
    pub expire_time: Option<Duration>,

    /// Configured auto-clear interval.
    pub auto_clear_interval: Option<Duration>,

    /// Whether objects may be shared between spawns.
    pub allow_multi_reference: bool,
}

/// Identity of a pooled target: the address of its `Arc` allocation.
///
/// The pool holds a strong reference to every resident target, so an address cannot be reused
/// while its key is in the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ObjectKey(usize);

impl ObjectKey {
    fn of<T>(target: &Arc<T>) -> Self {
        Self(Arc::as_ptr(target).cast::<()>() as usize)
    }
}

/// A pool of reusable `T`s.
///
/// See the [module level documentation](self) for more.
pub struct Pool<T> {
    config: PoolConfig,
    clock: Arc<dyn Clock>,

    objects: HashMap<ObjectKey, PoolObject<T>>,
    /// Registration order of the keys in `objects`.
    order: Vec<ObjectKey>,
    /// Unscaled time accumulated since the last automatic sweep.
    auto_clear_elapsed: Duration,
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("type_name", &type_name::<T>())
            .field("config", &self.config)
            .field("count", &self.objects.len())
            .field("auto_clear_elapsed", &self.auto_clear_elapsed)
            .finish()
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T> Pool<T> {
    /// Creates a new [`Pool`] on the system clock.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a new [`Pool`] that stamps and expires objects with `clock`.
    pub fn with_clock(config: PoolConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            objects: HashMap::default(),
            order: Vec::new(),
            auto_clear_elapsed: Duration::ZERO,
        }
    }

    /// Returns the name of the pooled type.
    pub fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    /// Returns the number of resident objects.
    pub fn count(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if no object is resident.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns `true` if `target` is resident in this pool.
    pub fn contains(&self, target: &Arc<T>) -> bool {
        self.objects.contains_key(&ObjectKey::of(target))
    }

    /// Returns the capacity.
    pub fn capacity(&self) -> Option<usize> {
        self.config.capacity
    }

    /// Sets the capacity and squeezes the pool right away.
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.config.capacity = capacity;
        self.squeeze();
    }

    /// Returns the expire time.
    pub fn expire_time(&self) -> Option<Duration> {
        self.config.expire_time
    }

    /// Sets the expire time. Takes effect at the next expiry sweep.
    pub fn set_expire_time(&mut self, expire_time: Option<Duration>) {
        self.config.expire_time = expire_time;
    }

    /// Returns the auto-clear interval.
    pub fn auto_clear_interval(&self) -> Option<Duration> {
        self.config.auto_clear_interval
    }

    /// Sets the auto-clear interval. Time already accumulated counts towards the new interval.
    pub fn set_auto_clear_interval(&mut self, interval: Option<Duration>) {
        self.config.auto_clear_interval = interval;
    }

    /// Returns `true` if one object may be spawned to several callers at once.
    pub fn allow_multi_reference(&self) -> bool {
        self.config.allow_multi_reference
    }

    /// Adds `target` to the pool.
    ///
    /// The caller holds the first reference: the object starts in use with a reference count of
    /// one, and has to be unspawned before an exclusive pool hands it out again.
    pub fn register(&mut self, target: Arc<T>) -> Result<()> {
        self.register_with(target, ObjectHooks::new())
    }

    /// Adds `target` to the pool with lifecycle hooks.
    ///
    /// The `on_spawn` hook fires once for the registration itself. If the pool now holds more
    /// objects than its capacity, it is squeezed right away, so idle objects make room for the
    /// new one.
    pub fn register_with(&mut self, target: Arc<T>, hooks: ObjectHooks<T>) -> Result<()> {
        let key = ObjectKey::of(&target);
        if self.objects.contains_key(&key) {
            return Err(Error::DuplicateObject {
                type_name: type_name::<T>(),
            });
        }

        let now = self.clock.now();
        let mut object = PoolObject::new(target, hooks, now);
        object.spawn(now);
        self.objects.insert(key, object);
        self.order.push(key);

        if self.is_over_capacity() {
            self.squeeze();
        }
        Ok(())
    }

    /// Hands out a resident object, or `None` if no object can be spawned.
    ///
    /// An exclusive pool only spawns idle objects; a multi-reference pool spawns any object.
    /// Which of several eligible objects comes back is unspecified.
    pub fn spawn(&mut self) -> Option<Arc<T>> {
        let allow_multi_reference = self.config.allow_multi_reference;
        let key = self.order.iter().copied().find(|key| {
            self.objects
                .get(key)
                .is_some_and(|o| allow_multi_reference || !o.is_in_use())
        })?;

        let now = self.clock.now();
        let object = self.objects.get_mut(&key)?;
        Some(object.spawn(now).clone())
    }

    /// Takes back one reference to `target`.
    ///
    /// Returns `false` and logs an error if `target` is not in this pool. Returns `false` and
    /// logs a warning if `target` is already idle; its idle time keeps running from when it went
    /// idle.
    pub fn unspawn(&mut self, target: &Arc<T>) -> bool {
        let now = self.clock.now();
        let Some(object) = self.objects.get_mut(&ObjectKey::of(target)) else {
            log::error!(
                "cannot unspawn an object that is not in the pool of `{}`",
                type_name::<T>()
            );
            return false;
        };
        if !object.is_in_use() {
            log::warn!(
                "cannot unspawn an object of `{}` that is not in use",
                type_name::<T>()
            );
            return false;
        }

        if object.unspawn(now) && self.is_over_capacity() {
            self.squeeze();
        }
        true
    }

    /// Exempts `target` from squeezing and sweeps.
    ///
    /// Returns `false` and logs an error if `target` is not in this pool.
    pub fn lock(&mut self, target: &Arc<T>) -> bool {
        self.set_locked(target, true)
    }

    /// Lifts the exemption set by [`Pool::lock`].
    ///
    /// Returns `false` and logs an error if `target` is not in this pool.
    pub fn unlock(&mut self, target: &Arc<T>) -> bool {
        self.set_locked(target, false)
    }

    /// Sets or clears the lock flag of `target`.
    ///
    /// Returns `false` and logs an error if `target` is not in this pool.
    pub fn set_locked(&mut self, target: &Arc<T>, locked: bool) -> bool {
        match self.objects.get_mut(&ObjectKey::of(target)) {
            Some(object) => {
                object.set_locked(locked);
                true
            }
            None => {
                log::error!(
                    "cannot lock or unlock an object that is not in the pool of `{}`",
                    type_name::<T>()
                );
                false
            }
        }
    }

    /// Removes `target` from the pool and runs its discard hook.
    ///
    /// Returns `false` without touching the pool if `target` is in use, locked or not resident.
    pub fn discard(&mut self, target: &Arc<T>) -> bool {
        let key = ObjectKey::of(target);
        let Some(object) = self.objects.get(&key) else {
            log::error!(
                "cannot discard an object that is not in the pool of `{}`",
                type_name::<T>()
            );
            return false;
        };
        if !object.is_releasable() {
            log::warn!(
                "cannot discard an object of `{}` that is in use or locked",
                type_name::<T>()
            );
            return false;
        }

        self.discard_keys(vec![key]) == 1
    }

    /// Discards every object that is neither in use nor locked. Returns how many went.
    pub fn discard_all_unused(&mut self) -> usize {
        let keys = self.releasable_keys(|_| true);
        self.discard_keys(keys)
    }

    /// Discards every idle, unlocked object that has been idle for longer than the expire time.
    /// Returns how many went.
    pub fn discard_all_expired(&mut self) -> usize {
        let Some(expire_time) = self.config.expire_time else {
            return 0;
        };

        let now = self.clock.now();
        let keys =
            self.releasable_keys(|o| now.saturating_duration_since(o.last_use()) > expire_time);
        let discarded = self.discard_keys(keys);
        if discarded > 0 {
            log::debug!(
                "discarded {discarded} expired objects from the pool of `{}`",
                type_name::<T>()
            );
        }
        discarded
    }

    /// Discards idle, unlocked objects until the pool fits its capacity. Returns how many went.
    ///
    /// Candidates are taken most recently used first: the object that went idle last is the
    /// first to go, and the one idle the longest is kept the longest.
    pub fn squeeze(&mut self) -> usize {
        let Some(capacity) = self.config.capacity else {
            return 0;
        };
        let excess = self.objects.len().saturating_sub(capacity);
        if excess == 0 {
            return 0;
        }

        let mut candidates: Vec<(ObjectKey, Instant)> = self
            .order
            .iter()
            .filter_map(|key| {
                let object = self.objects.get(key)?;
                object.is_releasable().then(|| (*key, object.last_use()))
            })
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        let keys = candidates
            .into_iter()
            .take(excess)
            .map(|(key, _)| key)
            .collect();
        let discarded = self.discard_keys(keys);
        log::debug!(
            "squeezed {discarded} objects out of the pool of `{}` ({} resident, capacity {capacity})",
            type_name::<T>(),
            self.objects.len(),
        );
        discarded
    }

    /// Advances the automatic sweep timer.
    ///
    /// Only `unscaled_delta` counts, so slowing down or pausing game time does not stall cleanup.
    /// Once the accumulated time reaches the auto-clear interval, expired objects are discarded
    /// and the timer restarts from zero.
    pub fn update(&mut self, _delta: Duration, unscaled_delta: Duration) {
        let Some(interval) = self.config.auto_clear_interval else {
            return;
        };

        self.auto_clear_elapsed = self.auto_clear_elapsed.saturating_add(unscaled_delta);
        if self.auto_clear_elapsed < interval {
            return;
        }
        self.auto_clear_elapsed = Duration::ZERO;
        self.discard_all_expired();
    }

    /// Discards every resident object, in use and locked ones included.
    pub fn destroy(&mut self) {
        let order = std::mem::take(&mut self.order);
        for key in order {
            if let Some(object) = self.objects.remove(&key) {
                object.destroy();
            }
        }
        self.auto_clear_elapsed = Duration::ZERO;
    }

    /// Returns a snapshot of every resident object, in registration order.
    pub fn object_infos(&self) -> Vec<PoolObjectInfo> {
        let now = self.clock.now();
        self.order
            .iter()
            .filter_map(|key| self.objects.get(key))
            .map(|o| o.info(now))
            .collect()
    }

    /// Returns the current status of the pool.
    pub fn info(&self) -> PoolInfo {
        let (in_use_count, locked_count) =
            self.objects.values().fold((0, 0), |(in_use, locked), o| {
                (
                    in_use + usize::from(o.is_in_use()),
                    locked + usize::from(o.is_locked()),
                )
            });

        PoolInfo {
            type_name: type_name::<T>(),
            count: self.objects.len(),
            in_use_count,
            locked_count,
            capacity: self.config.capacity,
            expire_time: self.config.expire_time,
            auto_clear_interval: self.config.auto_clear_interval,
            allow_multi_reference: self.config.allow_multi_reference,
        }
    }

    /// Returns the reference count of `target`, or `None` if it is not resident.
    pub fn reference_count(&self, target: &Arc<T>) -> Option<usize> {
        self.objects
            .get(&ObjectKey::of(target))
            .map(PoolObject::reference_count)
    }

    fn is_over_capacity(&self) -> bool {
        self.config
            .capacity
            .is_some_and(|capacity| self.objects.len() > capacity)
    }

    fn releasable_keys(&self, mut f: impl FnMut(&PoolObject<T>) -> bool) -> Vec<ObjectKey> {
        self.order
            .iter()
            .copied()
            .filter(|key| {
                self.objects
                    .get(key)
                    .is_some_and(|o| o.is_releasable() && f(o))
            })
            .collect()
    }

    fn discard_keys(&mut self, keys: Vec<ObjectKey>) -> usize {
        if keys.is_empty() {
            return 0;
        }

        let removed: Vec<PoolObject<T>> = keys
            .iter()
            .filter_map(|key| self.objects.remove(key))
            .collect();
        self.order.retain(|key| self.objects.contains_key(key));

        // Hooks run once the pool is consistent again.
        let discarded = removed.len();
        for object in removed {
            object.destroy();
        }
        discarded
    }
}

/// The type-erased face of a [`Pool`], as stored by [`PoolManager`](crate::PoolManager).
pub trait PoolBase: Any + Send {
    /// Returns the name of the pooled type.
    fn type_name(&self) -> &'static str;

    /// Returns the number of resident objects.
    fn count(&self) -> usize;

    /// Returns the current status of the pool.
    fn info(&self) -> PoolInfo;

    /// See [`Pool::squeeze`].
    fn squeeze(&mut self) -> usize;

    /// See [`Pool::discard_all_unused`].
    fn discard_all_unused(&mut self) -> usize;

    /// See [`Pool::discard_all_expired`].
    fn discard_all_expired(&mut self) -> usize;

    /// See [`Pool::update`].
    fn update(&mut self, delta: Duration, unscaled_delta: Duration);

    /// See [`Pool::destroy`].
    fn destroy(&mut self);

    /// Upcasts to [`Any`] for downcasting to the concrete [`Pool`].
    fn as_any(&self) -> &dyn Any;

    /// Upcasts to [`Any`] for downcasting to the concrete [`Pool`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + Sync + 'static> PoolBase for Pool<T> {
    fn type_name(&self) -> &'static str {
        Pool::type_name(self)
    }

    fn count(&self) -> usize {
        Pool::count(self)
    }

    fn info(&self) -> PoolInfo {
        Pool::info(self)
    }

    fn squeeze(&mut self) -> usize {
        Pool::squeeze(self)
    }

    fn discard_all_unused(&mut self) -> usize {
        Pool::discard_all_unused(self)
    }

    fn discard_all_expired(&mut self) -> usize {
        Pool::discard_all_expired(self)
    }

    fn update(&mut self, delta: Duration, unscaled_delta: Duration) {
        Pool::update(self, delta, unscaled_delta)
    }

    fn destroy(&mut self) {
        Pool::destroy(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
