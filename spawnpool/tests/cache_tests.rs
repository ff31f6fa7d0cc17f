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

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;

use spawnpool::CacheCollectionInfo;
use spawnpool::CacheConfig;
use spawnpool::CachePool;
use spawnpool::Cacheable;
use spawnpool::Cached;
use spawnpool::PoolManager;
use spawnpool::QueueStrategy;

static_assertions::assert_impl_all!(CachePool: Send, Sync);
static_assertions::assert_impl_all!(Cached<String>: Send, Sync);
static_assertions::assert_impl_all!(PoolManager: Send);

#[derive(Debug, Default)]
struct Token {
    id: u32,
}

// `id` survives release so tests can tell values apart.
impl Cacheable for Token {}

fn assert_balanced(info: CacheCollectionInfo) {
    assert_eq!(
        info.created_count,
        info.discarded_count + info.unused_count + info.using_count,
        "{info:?}"
    );
}

#[test]
fn test_reuse_clears() {
    let cache = CachePool::new();
    let mut v = cache.spawn::<Vec<u8>>();
    v.extend_from_slice(b"hello");
    drop(v);

    let v = cache.spawn::<Vec<u8>>();
    assert!(v.is_empty());
    assert!(v.capacity() >= 5, "the allocation is reused");

    let info = cache.collection_info::<Vec<u8>>().unwrap();
    assert_eq!(info.created_count, 1);
    assert_eq!(info.spawned_count, 2);
    assert_eq!(info.unspawned_count, 1);
    assert_eq!(info.using_count, 1);
    assert_balanced(info);
}

fn reuse_order(strategy: QueueStrategy) -> u32 {
    let cache = CachePool::with_config(CacheConfig::new().with_queue_strategy(strategy));
    let mut first = cache.spawn::<Token>();
    let mut second = cache.spawn::<Token>();
    first.id = 1;
    second.id = 2;
    drop(first);
    drop(second);
    cache.spawn::<Token>().id
}

#[test]
fn test_queue_strategy() {
    assert_eq!(reuse_order(QueueStrategy::Fifo), 1);
    assert_eq!(reuse_order(QueueStrategy::Lifo), 2);
}

#[test]
fn test_reserve_and_discard() {
    let cache = CachePool::new();
    assert_eq!(cache.discard::<Token>(3), 0);
    assert!(cache.collection_info::<Token>().is_none());

    cache.reserve::<Token>(3);
    let info = cache.collection_info::<Token>().unwrap();
    assert_eq!(info.created_count, 3);
    assert_eq!(info.unused_count, 3);
    assert_eq!(info.spawned_count, 0);

    let held = cache.spawn::<Token>();
    assert_eq!(cache.discard::<Token>(1), 1);
    assert_eq!(cache.discard_all::<Token>(), 1);

    let info = cache.collection_info::<Token>().unwrap();
    assert_eq!(info.created_count, 3);
    assert_eq!(info.discarded_count, 2);
    assert_eq!(info.unused_count, 0);
    assert_eq!(info.using_count, 1);
    assert_balanced(info);
    drop(held);
}

#[test]
fn test_explicit_unspawn() {
    let cache = CachePool::new();
    let s = cache.spawn::<String>();
    cache.unspawn(s);
    let info = cache.collection_info::<String>().unwrap();
    assert_eq!(info.unspawned_count, 1);
    assert_eq!(info.unused_count, 1);
}

#[test]
fn test_foreign_unspawn_goes_home() {
    let home = CachePool::new();
    let other = CachePool::new();
    let s = home.spawn::<String>();
    other.unspawn(s);

    assert_eq!(home.collection_info::<String>().unwrap().unused_count, 1);
    assert!(other.collection_info::<String>().is_none());
}

#[test]
fn test_detach() {
    let cache = CachePool::new();
    let mut s = cache.spawn::<String>();
    s.push_str("kept");
    let s: String = s.detach();
    assert_eq!(s, "kept");

    let info = cache.collection_info::<String>().unwrap();
    assert_eq!(info.using_count, 0);
    assert_eq!(info.unused_count, 0);
    assert_eq!(info.discarded_count, 1);
    assert_balanced(info);
}

#[test]
fn test_panicking_clear_keeps_books_balanced() {
    #[derive(Default)]
    struct Fragile;

    impl Cacheable for Fragile {
        fn clear(&mut self) {
            panic!("cannot clear");
        }
    }

    let cache = CachePool::new();
    let value = cache.spawn::<Fragile>();
    let result = catch_unwind(AssertUnwindSafe(|| drop(value)));
    assert!(result.is_err());

    let info = cache.collection_info::<Fragile>().unwrap();
    assert_eq!(info.unspawned_count, 1);
    assert_eq!(info.discarded_count, 1);
    assert_eq!(info.unused_count, 0);
    assert_balanced(info);

    // the collection is still usable
    let _again = cache.spawn::<Fragile>();
    assert_eq!(cache.collection_info::<Fragile>().unwrap().created_count, 2);
}

#[test]
fn test_clear() {
    let cache = CachePool::new();
    cache.reserve::<String>(2);
    cache.reserve::<Token>(1);
    let outstanding = cache.spawn::<String>();
    assert_eq!(cache.count(), 2);

    cache.clear();
    assert_eq!(cache.count(), 0);
    assert!(cache.collection_info::<String>().is_none());

    // a handle that outlives its collection is simply dropped
    drop(outstanding);
    assert!(cache.collection_info::<String>().is_none());

    let _fresh = cache.spawn::<String>();
    assert_eq!(cache.collection_info::<String>().unwrap().created_count, 1);
}

#[test]
fn test_collection_infos_sorted() {
    let cache = CachePool::new();
    cache.reserve::<Token>(1);
    cache.reserve::<String>(1);
    cache.reserve::<Vec<u8>>(1);

    let names: Vec<_> = cache
        .collection_infos()
        .into_iter()
        .map(|info| info.type_name)
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert_eq!(names.len(), 3);
}

#[test]
fn test_global() {
    #[derive(Default)]
    struct OnlyInGlobal;
    impl Cacheable for OnlyInGlobal {}

    assert!(std::ptr::eq(CachePool::global(), CachePool::global()));
    drop(CachePool::global().spawn::<OnlyInGlobal>());
    let info = CachePool::global()
        .collection_info::<OnlyInGlobal>()
        .unwrap();
    assert_eq!(info.unused_count, 1);
}

#[test]
fn test_concurrent_spawns_balance() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 500;

    let cache = CachePool::new();
    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for i in 0..ROUNDS {
                    let mut v = cache.spawn::<Vec<usize>>();
                    v.push(i);
                    if i % 100 == 0 {
                        drop(v.detach());
                    }
                }
            });
        }
    });

    let info = cache.collection_info::<Vec<usize>>().unwrap();
    assert_eq!(info.spawned_count, THREADS * ROUNDS);
    assert_eq!(info.unspawned_count, THREADS * ROUNDS);
    assert_eq!(info.using_count, 0);
    assert_eq!(info.discarded_count, THREADS * ROUNDS / 100);
    assert!(info.created_count <= THREADS + info.discarded_count);
    assert_balanced(info);
}
