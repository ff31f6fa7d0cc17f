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

//! Finite state machines drawn from a [`CachePool`].
//!
//! An [`Fsm`] belongs to an owner (held weakly) and holds one instance of each of its state
//! types. At most one state is current; the FSM forwards ticks to it and tracks how long it has
//! been current.
//!
//! State hooks get an [`FsmContext`] rather than the FSM itself. A state that wants to move on
//! calls [`FsmContext::change_state`], and the FSM performs the transition as soon as the hook
//! returns.
//!
//! The FSM container itself is [`Cacheable`]: [`FsmBuilder::create`] checks one out of the
//! global cache pool, and dropping the handle puts it back for the next FSM of the same owner
//! type.
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use spawnpool::CachePool;
//! use spawnpool::Fsm;
//! use spawnpool::FsmContext;
//! use spawnpool::FsmState;
//!
//! struct Door;
//!
//! struct Closed;
//! impl FsmState<Door> for Closed {
//!     fn on_update(&mut self, fsm: &mut FsmContext<'_, Door>, _: Duration, _: Duration) {
//!         if fsm.current_state_time() >= Duration::from_secs(2) {
//!             fsm.change_state::<Open>();
//!         }
//!     }
//! }
//!
//! struct Open;
//! impl FsmState<Door> for Open {}
//!
//! let door = Arc::new(Door);
//! let cache = CachePool::new();
//! let mut fsm = Fsm::builder("door", &door)
//!     .with_state(Closed)
//!     .with_state(Open)
//!     .create_in(&cache)
//!     .unwrap();
//!
//! let second = Duration::from_secs(1);
//! fsm.startup::<Closed>().unwrap();
//! fsm.update(second, second).unwrap();
//! assert!(fsm.is_in_state::<Closed>());
//! fsm.update(second, second).unwrap();
//! assert!(fsm.is_in_state::<Open>());
//! fsm.shutdown();
//! ```

use std::any::TypeId;
use std::any::type_name;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use crate::CachePool;
use crate::Cacheable;
use crate::Cached;
use crate::Error;
use crate::Result;

/// Runtime token of a state type.
///
/// Use it with [`Fsm::startup_by_key`] and [`Fsm::change_state_by_key`] when the state type is
/// only known at runtime, e.g. when it comes from data.
#[derive(Clone, Copy)]
pub struct StateKey {
    id: TypeId,
    name: &'static str,
}

impl StateKey {
    /// Returns the key of `S`.
    pub fn of<S: 'static>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: type_name::<S>(),
        }
    }

    /// Returns the type name of the state.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

impl PartialEq for StateKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StateKey {}

impl Hash for StateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One state of an [`Fsm`] owned by an `O`.
///
/// Every hook has an empty default.
pub trait FsmState<O>: Send + 'static {
    /// Called once, when the FSM is created.
    fn on_init(&mut self, _fsm: &mut FsmContext<'_, O>) {}

    /// Called when this state becomes current.
    fn on_enter(&mut self, _fsm: &mut FsmContext<'_, O>) {}

    /// Called on every tick while this state is current.
    fn on_update(
        &mut self,
        _fsm: &mut FsmContext<'_, O>,
        _delta: Duration,
        _unscaled_delta: Duration,
    ) {
    }

    /// Called when this state stops being current, either for a transition or because the FSM
    /// shuts down.
    fn on_exit(&mut self, _fsm: &mut FsmContext<'_, O>, _is_shutdown: bool) {}

    /// Called once, when the FSM shuts down.
    fn on_shutdown(&mut self, _fsm: &mut FsmContext<'_, O>) {}
}

/// What a state hook can see of, and ask of, its FSM.
pub struct FsmContext<'a, O> {
    name: &'a str,
    owner: &'a Weak<O>,
    current_state: Option<StateKey>,
    current_state_time: Duration,
    requested: Option<StateKey>,
}

impl<O> fmt::Debug for FsmContext<'_, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsmContext")
            .field("name", &self.name)
            .field("current_state", &self.current_state)
            .field("current_state_time", &self.current_state_time)
            .field("requested", &self.requested)
            .finish()
    }
}

impl<O> FsmContext<'_, O> {
    /// Returns the name of the FSM.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns the owner, unless it has been dropped.
    pub fn owner(&self) -> Option<Arc<O>> {
        self.owner.upgrade()
    }

    /// Returns the type name of the current state.
    pub fn current_state_name(&self) -> Option<&'static str> {
        self.current_state.map(|key| key.name)
    }

    /// Returns how long the current state has been current, in unscaled time.
    pub fn current_state_time(&self) -> Duration {
        self.current_state_time
    }

    /// Returns `true` if `S` is the current state.
    pub fn is_in_state<S: 'static>(&self) -> bool {
        self.current_state == Some(StateKey::of::<S>())
    }

    /// Asks the FSM to move to `S` once the running hook returns.
    ///
    /// Honored from [`FsmState::on_enter`] and [`FsmState::on_update`]. The last request wins.
    pub fn change_state<S: FsmState<O>>(&mut self) {
        self.requested = Some(StateKey::of::<S>());
    }
}

struct StateSlot<O> {
    key: StateKey,
    state: Box<dyn FsmState<O>>,
}

/// A finite state machine owned by an `O`.
///
/// See the [module level documentation](self) for more.
pub struct Fsm<O> {
    name: String,
    owner: Weak<O>,
    states: Vec<StateSlot<O>>,
    current: Option<usize>,
    current_state_time: Duration,
    destroyed: bool,
}

impl<O> Default for Fsm<O> {
    fn default() -> Self {
        Self {
            name: String::new(),
            owner: Weak::new(),
            states: Vec::new(),
            current: None,
            current_state_time: Duration::ZERO,
            destroyed: false,
        }
    }
}

impl<O> fmt::Debug for Fsm<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: Vec<&'static str> = self.states.iter().map(|slot| slot.key.name).collect();
        f.debug_struct("Fsm")
            .field("name", &self.name)
            .field("states", &states)
            .field("current", &self.current.map(|index| states[index]))
            .field("current_state_time", &self.current_state_time)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl<O: Send + Sync + 'static> Cacheable for Fsm<O> {
    fn clear(&mut self) {
        // Dropped without an explicit shutdown: the states still get their exit hooks.
        if !self.destroyed && !self.states.is_empty() {
            self.shutdown();
        }
        self.destroyed = false;
    }
}

/// Collects the name, owner and states of an [`Fsm`] before creating it.
pub struct FsmBuilder<O> {
    name: String,
    owner: Weak<O>,
    states: Vec<StateSlot<O>>,
}

impl<O> fmt::Debug for FsmBuilder<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: Vec<&'static str> = self.states.iter().map(|slot| slot.key.name).collect();
        f.debug_struct("FsmBuilder")
            .field("name", &self.name)
            .field("states", &states)
            .finish()
    }
}

impl<O: Send + Sync + 'static> FsmBuilder<O> {
    /// Adds a state. A second state of the same type is skipped with a warning at creation.
    pub fn with_state<S: FsmState<O>>(mut self, state: S) -> Self {
        self.states.push(StateSlot {
            key: StateKey::of::<S>(),
            state: Box::new(state),
        });
        self
    }

    /// Creates the FSM in the global cache pool and initializes its states.
    pub fn create(self) -> Result<Cached<Fsm<O>>> {
        self.create_in(CachePool::global())
    }

    /// Creates the FSM in `cache` and initializes its states.
    ///
    /// Fails with [`Error::EmptyFsm`] if no state was added.
    pub fn create_in(self, cache: &CachePool) -> Result<Cached<Fsm<O>>> {
        if self.states.is_empty() {
            return Err(Error::EmptyFsm { name: self.name });
        }

        let mut fsm = cache.spawn::<Fsm<O>>();
        fsm.name = self.name;
        fsm.owner = self.owner;
        fsm.destroyed = false;
        for slot in self.states {
            if fsm.states.iter().any(|s| s.key == slot.key) {
                log::warn!(
                    "fsm `{}` already has state `{}`; skipping the duplicate",
                    fsm.name,
                    slot.key.name
                );
                continue;
            }
            fsm.states.push(slot);
        }

        for index in 0..fsm.states.len() {
            if let Some(key) = fsm.run_hook(index, |state, ctx| state.on_init(ctx)) {
                log::warn!(
                    "fsm `{}` ignores the request for `{}` made during init",
                    fsm.name,
                    key.name
                );
            }
        }
        Ok(fsm)
    }
}

impl<O: Send + Sync + 'static> Fsm<O> {
    /// Starts building an FSM named `name` for `owner`.
    pub fn builder(name: impl Into<String>, owner: &Arc<O>) -> FsmBuilder<O> {
        FsmBuilder {
            name: name.into(),
            owner: Arc::downgrade(owner),
            states: Vec::new(),
        }
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owner, unless it has been dropped.
    pub fn owner(&self) -> Option<Arc<O>> {
        self.owner.upgrade()
    }

    /// Returns the number of states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if `S` is one of the states.
    pub fn has_state<S: FsmState<O>>(&self) -> bool {
        self.index_of(StateKey::of::<S>()).is_ok()
    }

    /// Returns `true` between startup and shutdown.
    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Returns `true` after shutdown.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Returns `true` if `S` is the current state.
    pub fn is_in_state<S: FsmState<O>>(&self) -> bool {
        self.current_key() == Some(StateKey::of::<S>())
    }

    /// Returns the type name of the current state.
    pub fn current_state_name(&self) -> Option<&'static str> {
        self.current_key().map(|key| key.name)
    }

    /// Returns how long the current state has been current, in unscaled time.
    pub fn current_state_time(&self) -> Duration {
        self.current_state_time
    }

    /// Enters `S` as the first state.
    ///
    /// Starting a running FSM is a no-op and logs a warning.
    pub fn startup<S: FsmState<O>>(&mut self) -> Result<()> {
        self.startup_by_key(StateKey::of::<S>())
    }

    /// Enters the state with `key` as the first state.
    ///
    /// Starting a running FSM is a no-op and logs a warning.
    pub fn startup_by_key(&mut self, key: StateKey) -> Result<()> {
        if self.destroyed {
            log::warn!("cannot start `{}`: fsm has been shut down", key.name);
            return Err(Error::FsmDestroyed);
        }
        if self.current.is_some() {
            log::warn!("fsm `{}` is already running", self.name);
            return Ok(());
        }

        let index = self.index_of(key).inspect_err(|err| {
            log::error!("cannot start: {err}");
        })?;
        log::debug!("fsm `{}` starts in `{}`", self.name, key.name);
        self.enter(index)
    }

    /// Leaves the current state and enters `S`.
    pub fn change_state<S: FsmState<O>>(&mut self) -> Result<()> {
        self.change_state_by_key(StateKey::of::<S>())
    }

    /// Leaves the current state and enters the state with `key`.
    pub fn change_state_by_key(&mut self, key: StateKey) -> Result<()> {
        if self.destroyed {
            log::warn!("cannot change to `{}`: fsm has been shut down", key.name);
            return Err(Error::FsmDestroyed);
        }
        let Some(current) = self.current else {
            log::warn!(
                "cannot change fsm `{}` to `{}` before startup",
                self.name,
                key.name
            );
            return Err(Error::FsmNotStarted {
                name: self.name.clone(),
            });
        };
        let next = self.index_of(key).inspect_err(|err| {
            log::error!("cannot change state: {err}");
        })?;

        if let Some(ignored) = self.run_hook(current, |state, ctx| state.on_exit(ctx, false)) {
            log::warn!(
                "fsm `{}` ignores the request for `{}` made during exit",
                self.name,
                ignored.name
            );
        }
        log::debug!(
            "fsm `{}` changes from `{}` to `{}`",
            self.name,
            self.states[current].key.name,
            key.name
        );
        self.enter(next)
    }

    /// Forwards a tick to the current state.
    ///
    /// Does nothing before startup or after shutdown. Only `unscaled_delta` counts towards the
    /// current state time. Fails if the state asked for a transition to an unknown state.
    pub fn update(&mut self, delta: Duration, unscaled_delta: Duration) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        let Some(current) = self.current else {
            return Ok(());
        };

        self.current_state_time = self.current_state_time.saturating_add(unscaled_delta);
        let requested =
            self.run_hook(current, |state, ctx| state.on_update(ctx, delta, unscaled_delta));
        self.apply(requested)
    }

    /// Exits the current state, shuts every state down and empties the FSM.
    ///
    /// Afterwards every transition fails with [`Error::FsmDestroyed`]. The container goes back to
    /// its cache pool when its [`Cached`] handle is dropped.
    pub fn shutdown(&mut self) {
        if self.destroyed {
            log::warn!("fsm has already been shut down");
            return;
        }

        if let Some(current) = self.current {
            self.run_hook(current, |state, ctx| state.on_exit(ctx, true));
        }
        for index in 0..self.states.len() {
            self.run_hook(index, |state, ctx| state.on_shutdown(ctx));
        }
        log::debug!("fsm `{}` shut down", self.name);

        self.name.clear();
        self.owner = Weak::new();
        self.states.clear();
        self.current = None;
        self.current_state_time = Duration::ZERO;
        self.destroyed = true;
    }

    fn current_key(&self) -> Option<StateKey> {
        self.current.map(|index| self.states[index].key)
    }

    fn index_of(&self, key: StateKey) -> Result<usize> {
        self.states
            .iter()
            .position(|slot| slot.key == key)
            .ok_or_else(|| Error::StateNotFound {
                name: self.name.clone(),
                state: key.name,
            })
    }

    fn enter(&mut self, index: usize) -> Result<()> {
        self.current = Some(index);
        self.current_state_time = Duration::ZERO;
        let requested = self.run_hook(index, |state, ctx| state.on_enter(ctx));
        self.apply(requested)
    }

    fn apply(&mut self, requested: Option<StateKey>) -> Result<()> {
        let Some(key) = requested else {
            return Ok(());
        };
        log::debug!("fsm `{}` applies the requested `{}`", self.name, key.name);
        self.change_state_by_key(key)
    }

    /// Runs `hook` on the state at `index`. Returns the transition it requested, if any.
    fn run_hook(
        &mut self,
        index: usize,
        hook: impl FnOnce(&mut (dyn FsmState<O> + 'static), &mut FsmContext<'_, O>),
    ) -> Option<StateKey> {
        let current_state = self.current.map(|current| self.states[current].key);
        let mut ctx = FsmContext {
            name: &self.name,
            owner: &self.owner,
            current_state,
            current_state_time: self.current_state_time,
            requested: None,
        };
        hook(&mut *self.states[index].state, &mut ctx);
        ctx.requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owner;

    #[derive(Default)]
    struct Idle;
    impl FsmState<Owner> for Idle {}

    #[derive(Default)]
    struct Busy;
    impl FsmState<Owner> for Busy {}

    #[test]
    fn test_state_key_identity() {
        assert_eq!(StateKey::of::<Idle>(), StateKey::of::<Idle>());
        assert_ne!(StateKey::of::<Idle>(), StateKey::of::<Busy>());
        assert!(StateKey::of::<Idle>().name().ends_with("Idle"));
    }

    #[test]
    fn test_duplicate_states_are_skipped() {
        let owner = Arc::new(Owner);
        let cache = CachePool::new();
        let fsm = Fsm::builder("dup", &owner)
            .with_state(Idle)
            .with_state(Busy)
            .with_state(Idle)
            .create_in(&cache)
            .unwrap();
        assert_eq!(fsm.state_count(), 2);
        assert!(fsm.has_state::<Idle>());
        assert!(fsm.has_state::<Busy>());
    }

    #[test]
    fn test_run_hook_sees_current_state() {
        let owner = Arc::new(Owner);
        let cache = CachePool::new();
        let mut fsm = Fsm::builder("ctx", &owner)
            .with_state(Idle)
            .with_state(Busy)
            .create_in(&cache)
            .unwrap();
        fsm.startup::<Busy>().unwrap();

        let mut seen = None;
        fsm.run_hook(0, |_, ctx| {
            seen = ctx.current_state_name();
            assert!(ctx.is_in_state::<Busy>());
            assert!(ctx.owner().is_some());
            assert_eq!(ctx.name(), "ctx");
        });
        assert_eq!(seen, Some(type_name::<Busy>()));
    }
}
