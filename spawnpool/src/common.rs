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

use crate::mutex::Mutex;

/// Queue strategy when taking unused objects out of a cache collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum QueueStrategy {
    /// First in first out.
    ///
    /// This strategy behaves like a queue: the object released longest ago is reused first.
    #[default]
    Fifo,
    /// Last in first out.
    ///
    /// This strategy behaves like a stack: the object released most recently is reused first.
    Lifo,
}

/// A source of "now" for idle-time bookkeeping.
///
/// Pools stamp objects with [`Clock::now`] whenever they are spawned or go idle, and measure
/// expiry against it. The default is [`SystemClock`]; hosts that run their own notion of time
/// (replays, lockstep simulations, tests) can drive a [`ManualClock`] instead.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// The monotonic system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test or a host loop can keep one handle and give another to
/// a pool.
///
/// ```
/// use std::time::Duration;
///
/// use spawnpool::Clock;
/// use spawnpool::ManualClock;
///
/// let clock = ManualClock::new();
/// let shared = clock.clone();
/// let before = shared.now();
/// clock.advance(Duration::from_secs(3));
/// assert_eq!(shared.now() - before, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Creates a new [`ManualClock`] frozen at the current system instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed = elapsed.saturating_add(delta);
    }

    /// Returns how far the clock has been advanced since it was created.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

pub(crate) fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
