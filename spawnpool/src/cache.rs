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

//! Typed free-list caches.
//!
//! A [`CachePool`] keeps one free list per [`Cacheable`] type. [`CachePool::spawn`] pops an
//! unused value or builds a fresh one with [`Default`]; dropping the returned [`Cached`] handle
//! clears the value and puts it back. There is no reference counting, no capacity and no expiry:
//! this is the cheap layer for small, high-churn objects such as events and state machines.
//!
//! Unlike [`Pool`](crate::Pool), a cache pool is thread safe. The type registry sits behind a
//! read-write lock and every collection has its own mutex, so spawning two different types never
//! contends.
//!
//! ## Examples
//!
//! ```
//! use spawnpool::CachePool;
//! use spawnpool::Cacheable;
//!
//! #[derive(Default)]
//! struct HitEvent {
//!     damage: u32,
//! }
//!
//! impl Cacheable for HitEvent {
//!     fn clear(&mut self) {
//!         self.damage = 0;
//!     }
//! }
//!
//! let cache = CachePool::new();
//! let mut event = cache.spawn::<HitEvent>();
//! event.damage = 12;
//! drop(event); // back to the free list, cleared
//!
//! let event = cache.spawn::<HitEvent>();
//! assert_eq!(event.damage, 0);
//! assert_eq!(cache.collection_info::<HitEvent>().unwrap().created_count, 1);
//! ```

use std::any::Any;
use std::any::TypeId;
use std::any::type_name;
use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Weak;

use foldhash::HashMap;

use crate::QueueStrategy;
use crate::mutex::Mutex;
use crate::mutex::RwLock;

/// A type that can live in a [`CachePool`].
///
/// [`Default`] is the factory: a collection builds new values with it whenever its free list
/// runs dry.
pub trait Cacheable: Default + Send + 'static {
    /// Resets the value before it goes back to the free list.
    ///
    /// The default implementation does nothing.
    fn clear(&mut self) {}
}

impl<T: Send + 'static> Cacheable for Vec<T> {
    fn clear(&mut self) {
        Vec::clear(self);
    }
}

impl<T: Send + 'static> Cacheable for VecDeque<T> {
    fn clear(&mut self) {
        VecDeque::clear(self);
    }
}

impl Cacheable for String {
    fn clear(&mut self) {
        String::clear(self);
    }
}

/// The configuration of [`CachePool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct CacheConfig {
    /// Queue strategy of every collection in the [`CachePool`].
    ///
    /// Determines which unused value is handed out next.
    pub queue_strategy: QueueStrategy,
}

impl CacheConfig {
    /// Creates a new [`CacheConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new [`CacheConfig`] with the specified queue strategy.
    pub fn with_queue_strategy(mut self, queue_strategy: QueueStrategy) -> Self {
        self.queue_strategy = queue_strategy;
        self
    }
}

/// Counters of one cache collection.
///
/// `created_count == discarded_count + unused_count + using_count` whenever no spawn or release
/// of that type is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct CacheCollectionInfo {
    /// Name of the cached type.
    pub type_name: &'static str,

    /// Values sitting in the free list.
    pub unused_count: usize,

    /// Values currently checked out.
    pub using_count: usize,

    /// Lifetime number of spawns.
    pub spawned_count: usize,

    /// Lifetime number of releases.
    pub unspawned_count: usize,

    /// Lifetime number of values built.
    pub created_count: usize,

    /// Lifetime number of values dropped for good.
    pub discarded_count: usize,
}

#[derive(Debug)]
struct CollectionState<T> {
    unused: VecDeque<T>,
    spawned: usize,
    unspawned: usize,
    created: usize,
    discarded: usize,
}

/// The free list and counters of one type.
///
/// User code (`Default`, `Cacheable::clear`, `Drop`) never runs under the lock.
pub(crate) struct CacheCollection<T> {
    queue_strategy: QueueStrategy,
    state: Mutex<CollectionState<T>>,
}

impl<T: Cacheable> CacheCollection<T> {
    fn new(queue_strategy: QueueStrategy) -> Self {
        Self {
            queue_strategy,
            state: Mutex::new(CollectionState {
                unused: VecDeque::new(),
                spawned: 0,
                unspawned: 0,
                created: 0,
                discarded: 0,
            }),
        }
    }

    fn spawn(&self) -> T {
        let existing = {
            let mut state = self.state.lock();
            let existing = match self.queue_strategy {
                QueueStrategy::Fifo => state.unused.pop_front(),
                QueueStrategy::Lifo => state.unused.pop_back(),
            };
            if existing.is_some() {
                state.spawned += 1;
            }
            existing
        };

        match existing {
            Some(value) => value,
            None => {
                let value = T::default();
                let mut state = self.state.lock();
                state.created += 1;
                state.spawned += 1;
                value
            }
        }
    }

    fn release(&self, mut value: T) {
        // If `clear` panics the value is lost; count it as gone so the books still balance.
        let guard = scopeguard::guard((), |()| {
            let mut state = self.state.lock();
            state.unspawned += 1;
            state.discarded += 1;
            log::warn!(
                "clearing a cached `{}` panicked; the value is dropped",
                type_name::<T>()
            );
        });
        value.clear();
        scopeguard::ScopeGuard::into_inner(guard);

        let mut state = self.state.lock();
        state.unspawned += 1;
        state.unused.push_back(value);
    }

    fn detach(&self) {
        let mut state = self.state.lock();
        state.unspawned += 1;
        state.discarded += 1;
    }

    fn reserve(&self, count: usize) {
        let values: Vec<T> = (0..count).map(|_| T::default()).collect();
        let mut state = self.state.lock();
        state.created += values.len();
        state.unused.extend(values);
    }

    fn discard(&self, count: usize) -> usize {
        let dropped: Vec<T> = {
            let mut state = self.state.lock();
            let count = count.min(state.unused.len());
            state.discarded += count;
            state.unused.drain(..count).collect()
        };
        dropped.len()
    }
}

trait ErasedCollection: Send + Sync {
    fn info(&self) -> CacheCollectionInfo;
    fn discard_all(&self) -> usize;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Cacheable> ErasedCollection for CacheCollection<T> {
    fn info(&self) -> CacheCollectionInfo {
        let state = self.state.lock();
        CacheCollectionInfo {
            type_name: type_name::<T>(),
            unused_count: state.unused.len(),
            using_count: state.spawned - state.unspawned,
            spawned_count: state.spawned,
            unspawned_count: state.unspawned,
            created_count: state.created,
            discarded_count: state.discarded,
        }
    }

    fn discard_all(&self) -> usize {
        self.discard(usize::MAX)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

static GLOBAL: LazyLock<CachePool> = LazyLock::new(CachePool::new);

/// A registry of typed free lists.
///
/// See the [module level documentation](self) for more.
pub struct CachePool {
    config: CacheConfig,
    collections: RwLock<HashMap<TypeId, Arc<dyn ErasedCollection>>>,
}

impl fmt::Debug for CachePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePool")
            .field("config", &self.config)
            .field("collections", &self.collection_infos())
            .finish()
    }
}

impl Default for CachePool {
    fn default() -> Self {
        Self::new()
    }
}

impl CachePool {
    /// Creates a new, empty [`CachePool`].
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a new, empty [`CachePool`] with `config`.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the process-wide cache pool.
    ///
    /// It is created on first use and lives until the process exits.
    pub fn global() -> &'static CachePool {
        &GLOBAL
    }

    /// Returns the number of types with a collection.
    pub fn count(&self) -> usize {
        self.collections.read().len()
    }

    /// Checks out a `T`, reusing an unused one if there is any.
    ///
    /// Dropping the handle releases the value back to this pool.
    pub fn spawn<T: Cacheable>(&self) -> Cached<T> {
        let collection = self.collection::<T>();
        let value = collection.spawn();
        Cached {
            value: Some(value),
            collection: Arc::downgrade(&collection),
        }
    }

    /// Releases `object` back to its free list.
    ///
    /// This is the same as dropping it. A handle spawned by another pool still goes home to the
    /// pool that spawned it, with a warning.
    pub fn unspawn<T: Cacheable>(&self, object: Cached<T>) {
        let home = Weak::as_ptr(&object.collection);
        let ours = self
            .find::<T>()
            .is_some_and(|collection| Arc::as_ptr(&collection) == home);
        if !ours {
            log::warn!(
                "releasing a `{}` into a cache pool that did not spawn it",
                type_name::<T>()
            );
        }
        drop(object);
    }

    /// Builds `count` new values of `T` and puts them on the free list.
    pub fn reserve<T: Cacheable>(&self, count: usize) {
        self.collection::<T>().reserve(count);
    }

    /// Drops up to `count` unused values of `T` for good. Returns how many went.
    ///
    /// Checked-out values are not affected.
    pub fn discard<T: Cacheable>(&self, count: usize) -> usize {
        self.find::<T>()
            .map_or(0, |collection| collection.discard(count))
    }

    /// Drops every unused value of `T` for good. Returns how many went.
    pub fn discard_all<T: Cacheable>(&self) -> usize {
        self.find::<T>()
            .map_or(0, |collection| collection.discard_all())
    }

    /// Returns the counters of `T`, or `None` if `T` was never used with this pool.
    pub fn collection_info<T: Cacheable>(&self) -> Option<CacheCollectionInfo> {
        self.find::<T>().map(|collection| collection.info())
    }

    /// Returns the counters of every type, sorted by type name.
    pub fn collection_infos(&self) -> Vec<CacheCollectionInfo> {
        let collections: Vec<Arc<dyn ErasedCollection>> =
            self.collections.read().values().cloned().collect();
        let mut infos: Vec<CacheCollectionInfo> =
            collections.iter().map(|collection| collection.info()).collect();
        infos.sort_by_key(|info| info.type_name);
        infos
    }

    /// Drops every collection and all unused values in them.
    ///
    /// Values still checked out are dropped when their handles are, instead of being released.
    pub fn clear(&self) {
        let collections: Vec<Arc<dyn ErasedCollection>> = self
            .collections
            .write()
            .drain()
            .map(|(_, collection)| collection)
            .collect();
        for collection in collections {
            collection.discard_all();
        }
    }

    fn find<T: Cacheable>(&self) -> Option<Arc<CacheCollection<T>>> {
        let erased = self.collections.read().get(&TypeId::of::<T>())?.clone();
        erased.into_any().downcast().ok()
    }

    fn collection<T: Cacheable>(&self) -> Arc<CacheCollection<T>> {
        if let Some(collection) = self.find::<T>() {
            return collection;
        }

        let mut collections = self.collections.write();
        // Another thread may have won the race between the two locks.
        if let Some(erased) = collections.get(&TypeId::of::<T>()) {
            if let Ok(collection) = erased.clone().into_any().downcast() {
                return collection;
            }
        }

        let collection = Arc::new(CacheCollection::<T>::new(self.config.queue_strategy));
        collections.insert(TypeId::of::<T>(), collection.clone());
        log::debug!("created the cache collection of `{}`", type_name::<T>());
        collection
    }
}

/// A value checked out of a [`CachePool`].
///
/// This object implements [`Deref`] and [`DerefMut`]. You can use it as if it was of type `T`.
///
/// This object implements [`Drop`] that clears the value and returns it to its free list. You may
/// call [`Cached::detach`] to take the value out of the cache instead.
pub struct Cached<T: Cacheable> {
    value: Option<T>,
    collection: Weak<CacheCollection<T>>,
}

impl<T: Cacheable + fmt::Debug> fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached")
            .field("value", &self.value)
            .finish()
    }
}

impl<T: Cacheable> Drop for Cached<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if let Some(collection) = self.collection.upgrade() {
                collection.release(value);
            }
        }
    }
}

impl<T: Cacheable> Deref for Cached<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: `value` is always `Some` when `Cached` is owned.
        self.value.as_ref().unwrap()
    }
}

impl<T: Cacheable> DerefMut for Cached<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: `value` is always `Some` when `Cached` is owned.
        self.value.as_mut().unwrap()
    }
}

impl<T: Cacheable> AsRef<T> for Cached<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: Cacheable> AsMut<T> for Cached<T> {
    fn as_mut(&mut self) -> &mut T {
        self
    }
}

impl<T: Cacheable> Cached<T> {
    /// Takes the value out of its cache for good.
    ///
    /// The collection counts it as released and discarded.
    pub fn detach(mut self) -> T {
        // SAFETY: `value` is always `Some` when `Cached` is owned.
        let value = self.value.take().unwrap();
        if let Some(collection) = self.collection.upgrade() {
            collection.detach();
        }
        value
    }
}
