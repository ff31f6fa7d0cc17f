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

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

type Hook<T> = Box<dyn FnMut(&T) + Send>;

/// Lifecycle callbacks attached to one pooled object at registration time.
///
/// The pool never looks at what the callbacks do; it only calls them. Typical uses are
/// re-activating a game object on spawn, resetting it on unspawn and tearing it down on discard.
///
/// ```
/// use spawnpool::ObjectHooks;
///
/// let hooks = ObjectHooks::<String>::new()
///     .on_spawn(|s| println!("spawn {s}"))
///     .on_discard(|s| println!("discard {s}"));
/// # drop(hooks);
/// ```
pub struct ObjectHooks<T> {
    on_spawn: Option<Hook<T>>,
    on_unspawn: Option<Hook<T>>,
    on_discard: Option<Hook<T>>,
}

impl<T> Default for ObjectHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObjectHooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHooks")
            .field("on_spawn", &self.on_spawn.is_some())
            .field("on_unspawn", &self.on_unspawn.is_some())
            .field("on_discard", &self.on_discard.is_some())
            .finish()
    }
}

impl<T> ObjectHooks<T> {
    /// Creates an empty set of hooks.
    pub fn new() -> Self {
        Self {
            on_spawn: None,
            on_unspawn: None,
            on_discard: None,
        }
    }

    /// Returns hooks that call `f` every time the object is spawned, registration included.
    pub fn on_spawn(mut self, f: impl FnMut(&T) + Send + 'static) -> Self {
        self.on_spawn = Some(Box::new(f));
        self
    }

    /// Returns hooks that call `f` every time a reference to the object is returned.
    pub fn on_unspawn(mut self, f: impl FnMut(&T) + Send + 'static) -> Self {
        self.on_unspawn = Some(Box::new(f));
        self
    }

    /// Returns hooks that call `f` once, when the object leaves the pool for good.
    pub fn on_discard(mut self, f: impl FnMut(&T) + Send + 'static) -> Self {
        self.on_discard = Some(Box::new(f));
        self
    }
}

/// A snapshot of one pooled object, for inspectors and diagnostics.
///
/// See [`Pool::object_infos`](crate::Pool::object_infos).
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct PoolObjectInfo {
    /// Number of outstanding spawns.
    pub reference_count: usize,

    /// Whether the object is exempt from squeezing and expiry.
    pub locked: bool,

    /// Whether the object has at least one outstanding spawn.
    pub in_use: bool,

    /// When the object was last spawned or last went idle.
    pub last_use: Instant,

    /// How long ago `last_use` was, at the time of the snapshot.
    pub idle_for: Duration,
}

/// One pooled target plus its use, reference and lock bookkeeping.
pub(crate) struct PoolObject<T> {
    target: Arc<T>,
    reference_count: usize,
    locked: bool,
    last_use: Instant,
    hooks: ObjectHooks<T>,
}

impl<T> fmt::Debug for PoolObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolObject")
            .field("target", &Arc::as_ptr(&self.target))
            .field("reference_count", &self.reference_count)
            .field("locked", &self.locked)
            .field("last_use", &self.last_use)
            .finish()
    }
}

impl<T> PoolObject<T> {
    /// Wraps `target`. The wrapper starts idle; the pool spawns it once on registration.
    pub(crate) fn new(target: Arc<T>, hooks: ObjectHooks<T>, now: Instant) -> Self {
        Self {
            target,
            reference_count: 0,
            locked: false,
            last_use: now,
            hooks,
        }
    }

    pub(crate) fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub(crate) fn reference_count(&self) -> usize {
        self.reference_count
    }

    pub(crate) fn is_in_use(&self) -> bool {
        self.reference_count > 0
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub(crate) fn last_use(&self) -> Instant {
        self.last_use
    }

    /// Neither in use nor locked: a candidate for squeezing and sweeps.
    pub(crate) fn is_releasable(&self) -> bool {
        !self.is_in_use() && !self.locked
    }

    /// Hands out one more reference.
    ///
    /// Whether this object may be spawned at all (exclusive pools only spawn idle objects) is the
    /// pool's call, not this method's.
    pub(crate) fn spawn(&mut self, now: Instant) -> &Arc<T> {
        self.reference_count += 1;
        self.last_use = now;
        if let Some(on_spawn) = self.hooks.on_spawn.as_mut() {
            on_spawn(&self.target);
        }
        &self.target
    }

    /// Takes back one reference. Returns `true` if this was the last one and the object is now
    /// idle.
    ///
    /// An object that is already idle is left alone: no hook, no new idle stamp.
    pub(crate) fn unspawn(&mut self, now: Instant) -> bool {
        if self.reference_count == 0 {
            return false;
        }
        self.reference_count -= 1;
        if let Some(on_unspawn) = self.hooks.on_unspawn.as_mut() {
            on_unspawn(&self.target);
        }
        if self.reference_count == 0 {
            self.last_use = now;
            true
        } else {
            false
        }
    }

    /// Runs the discard hook and drops the wrapper. Does not check use or lock state.
    pub(crate) fn destroy(mut self) {
        if let Some(on_discard) = self.hooks.on_discard.as_mut() {
            on_discard(&self.target);
        }
    }

    pub(crate) fn info(&self, now: Instant) -> PoolObjectInfo {
        PoolObjectInfo {
            reference_count: self.reference_count,
            locked: self.locked,
            in_use: self.is_in_use(),
            last_use: self.last_use,
            idle_for: now.saturating_duration_since(self.last_use),
        }
    }
}
