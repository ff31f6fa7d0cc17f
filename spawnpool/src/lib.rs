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

//! Object pooling for game loops.
//!
//! This crate has three layers:
//!
//! * [`Pool`] and [`PoolManager`]: reference-counted pools of objects you register yourself,
//!   with capacity squeezing, lock exemption and time-based expiry driven by the host's tick.
//! * [`CachePool`]: thread-safe typed free lists for small, high-churn values, built on demand
//!   with [`Default`] and returned by dropping a [`Cached`] handle.
//! * [`Fsm`]: finite state machines whose containers are themselves recycled through a
//!   [`CachePool`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use spawnpool::ObjectHooks;
//! use spawnpool::PoolConfig;
//! use spawnpool::PoolManager;
//!
//! struct Widget(&'static str);
//!
//! let mut manager = PoolManager::new();
//! let pool = manager
//!     .create_pool::<Widget>(PoolConfig::new().with_capacity(1))
//!     .unwrap();
//!
//! let w1 = Arc::new(Widget("w1"));
//! let hooks = ObjectHooks::new().on_discard(|w: &Widget| println!("discarded {}", w.0));
//! pool.register_with(w1.clone(), hooks).unwrap();
//! pool.unspawn(&w1);
//!
//! // Over capacity: the idle `w1` makes room for `w2`.
//! let w2 = Arc::new(Widget("w2"));
//! pool.register(w2.clone()).unwrap();
//! assert!(!pool.contains(&w1));
//! assert!(pool.contains(&w2));
//!
//! let frame = Duration::from_millis(16);
//! manager.update(frame, frame);
//! ```

mod cache;
mod common;
mod error;
mod fsm;
mod manager;
mod mutex;
mod object;
mod pool;

pub use cache::CacheCollectionInfo;
pub use cache::CacheConfig;
pub use cache::CachePool;
pub use cache::Cacheable;
pub use cache::Cached;
pub use common::Clock;
pub use common::ManualClock;
pub use common::QueueStrategy;
pub use common::SystemClock;
pub use error::Error;
pub use error::Result;
pub use fsm::Fsm;
pub use fsm::FsmBuilder;
pub use fsm::FsmContext;
pub use fsm::FsmState;
pub use fsm::StateKey;
pub use manager::PoolManager;
pub use object::ObjectHooks;
pub use object::PoolObjectInfo;
pub use pool::Pool;
pub use pool::PoolBase;
pub use pool::PoolConfig;
pub use pool::PoolInfo;
