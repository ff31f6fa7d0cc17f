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

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use spawnpool::Error;
use spawnpool::ManualClock;
use spawnpool::ObjectHooks;
use spawnpool::Pool;
use spawnpool::PoolConfig;

struct Widget(&'static str);

type Journal = Arc<Mutex<Vec<&'static str>>>;

fn discard_journal(journal: &Journal) -> ObjectHooks<Widget> {
    let journal = journal.clone();
    ObjectHooks::new().on_discard(move |w: &Widget| journal.lock().unwrap().push(w.0))
}

fn manual_pool(config: PoolConfig) -> (Pool<Widget>, ManualClock) {
    let clock = ManualClock::new();
    let pool = Pool::with_clock(config, Arc::new(clock.clone()));
    (pool, clock)
}

#[test]
fn test_spawn_unspawn_round_trip() {
    let mut pool = Pool::new(PoolConfig::new());
    let a = Arc::new(Widget("a"));
    pool.register(a.clone()).unwrap();
    assert_eq!(pool.reference_count(&a), Some(1));

    // the registering caller holds the only reference
    assert!(pool.spawn().is_none());

    assert!(pool.unspawn(&a));
    assert_eq!(pool.reference_count(&a), Some(0));

    let spawned = pool.spawn().unwrap();
    assert!(Arc::ptr_eq(&spawned, &a));
    assert_eq!(pool.reference_count(&a), Some(1));
}

#[test]
fn test_exclusive_spawn_skips_objects_in_use() {
    let mut pool = Pool::new(PoolConfig::new());
    let a = Arc::new(Widget("a"));
    let b = Arc::new(Widget("b"));
    pool.register(a.clone()).unwrap();
    pool.register(b.clone()).unwrap();
    pool.unspawn(&b);

    let spawned = pool.spawn().unwrap();
    assert!(Arc::ptr_eq(&spawned, &b));
    assert!(pool.spawn().is_none());
}

#[test]
fn test_multi_reference() {
    let mut pool = Pool::new(PoolConfig::new().with_multi_reference(true));
    assert!(pool.allow_multi_reference());

    let a = Arc::new(Widget("a"));
    pool.register(a.clone()).unwrap();
    for _ in 0..2 {
        let spawned = pool.spawn().unwrap();
        assert!(Arc::ptr_eq(&spawned, &a));
    }
    assert_eq!(pool.reference_count(&a), Some(3));
    assert_eq!(pool.info().in_use_count, 1);

    for _ in 0..3 {
        pool.unspawn(&a);
    }
    assert_eq!(pool.reference_count(&a), Some(0));

    // extra unspawns are rejected
    assert!(!pool.unspawn(&a));
    assert_eq!(pool.reference_count(&a), Some(0));
}

#[test]
fn test_unspawn_of_idle_object_keeps_idle_instant() {
    let counts = Arc::new(Mutex::new(0));
    let unspawned = counts.clone();
    let hooks =
        ObjectHooks::new().on_unspawn(move |_: &Widget| *unspawned.lock().unwrap() += 1);

    let (mut pool, clock) =
        manual_pool(PoolConfig::new().with_expire_time(Duration::from_secs(10)));
    let a = Arc::new(Widget("a"));
    pool.register_with(a.clone(), hooks).unwrap();
    assert!(pool.unspawn(&a));

    clock.advance(Duration::from_secs(9));
    assert!(!pool.unspawn(&a), "already idle");
    assert_eq!(*counts.lock().unwrap(), 1);

    clock.advance(Duration::from_secs(2));
    assert_eq!(pool.object_infos()[0].idle_for, Duration::from_secs(11));
    assert_eq!(pool.discard_all_expired(), 1);
    assert!(!pool.contains(&a));
}

#[test]
fn test_duplicate_registration() {
    let mut pool = Pool::new(PoolConfig::new());
    let a = Arc::new(Widget("a"));
    pool.register(a.clone()).unwrap();
    assert!(matches!(
        pool.register(a.clone()),
        Err(Error::DuplicateObject { .. })
    ));
    assert_eq!(pool.count(), 1);
}

#[test]
fn test_foreign_targets_are_rejected() {
    let mut pool = Pool::new(PoolConfig::new());
    let stranger = Arc::new(Widget("stranger"));
    assert!(!pool.contains(&stranger));
    assert!(!pool.unspawn(&stranger));
    assert!(!pool.lock(&stranger));
    assert!(!pool.discard(&stranger));
    assert_eq!(pool.reference_count(&stranger), None);
}

#[test]
fn test_squeeze_discards_most_recently_idled_first() {
    let journal = Journal::default();
    let (mut pool, clock) = manual_pool(PoolConfig::new());

    let targets: Vec<_> = ["a", "b", "c"].map(|name| Arc::new(Widget(name))).into();
    for t in &targets {
        pool.register_with(t.clone(), discard_journal(&journal))
            .unwrap();
    }
    for t in &targets {
        pool.unspawn(t);
        clock.advance(Duration::from_secs(1));
    }

    pool.set_capacity(Some(1));
    assert_eq!(pool.count(), 1);
    assert!(pool.contains(&targets[0]));
    assert_eq!(*journal.lock().unwrap(), ["c", "b"]);
}

#[test]
fn test_squeeze_skips_locked_and_in_use() {
    let mut pool = Pool::new(PoolConfig::new());
    let locked = Arc::new(Widget("locked"));
    let busy = Arc::new(Widget("busy"));
    let idle = Arc::new(Widget("idle"));
    for t in [&locked, &busy, &idle] {
        pool.register((*t).clone()).unwrap();
    }
    pool.unspawn(&locked);
    pool.unspawn(&idle);
    assert!(pool.lock(&locked));

    pool.set_capacity(Some(0));
    assert_eq!(pool.count(), 2, "pinned objects keep the pool over capacity");
    assert!(!pool.contains(&idle));
    assert_eq!(pool.info().locked_count, 1);

    // going idle in an overflowing pool triggers a squeeze
    pool.unspawn(&busy);
    assert!(!pool.contains(&busy));

    assert!(pool.unlock(&locked));
    assert_eq!(pool.squeeze(), 1);
    assert!(pool.is_empty());
}

#[test]
fn test_register_over_capacity_evicts_idle() {
    // the end-to-end scenario: capacity 1, w1 idle, w2 registered
    let journal = Journal::default();
    let mut pool = Pool::new(PoolConfig::new().with_capacity(1));

    let w1 = Arc::new(Widget("w1"));
    pool.register_with(w1.clone(), discard_journal(&journal))
        .unwrap();
    pool.unspawn(&w1);
    assert_eq!(pool.reference_count(&w1), Some(0));

    let w2 = Arc::new(Widget("w2"));
    pool.register_with(w2.clone(), discard_journal(&journal))
        .unwrap();

    assert_eq!(pool.count(), 1);
    assert!(!pool.contains(&w1));
    assert!(pool.contains(&w2));
    assert_eq!(*journal.lock().unwrap(), ["w1"]);
}

#[test]
fn test_expiry_is_strict() {
    let (mut pool, clock) = manual_pool(
        PoolConfig::new()
            .with_expire_time(Duration::from_secs(10))
            .with_auto_clear_interval(Duration::from_secs(1)),
    );
    let a = Arc::new(Widget("a"));
    pool.register(a.clone()).unwrap();
    pool.unspawn(&a);

    let second = Duration::from_secs(1);
    clock.advance(Duration::from_secs(10));
    pool.update(second, second);
    assert!(pool.contains(&a), "idle for exactly the expire time");

    clock.advance(Duration::from_millis(1));
    pool.update(second, second);
    assert!(!pool.contains(&a));
}

#[test]
fn test_expiry_skips_locked_and_in_use() {
    let (mut pool, clock) = manual_pool(PoolConfig::new().with_expire_time(Duration::ZERO));
    let locked = Arc::new(Widget("locked"));
    let busy = Arc::new(Widget("busy"));
    pool.register(locked.clone()).unwrap();
    pool.register(busy.clone()).unwrap();
    pool.unspawn(&locked);
    pool.lock(&locked);

    clock.advance(Duration::from_secs(60));
    assert_eq!(pool.discard_all_expired(), 0);
    assert_eq!(pool.count(), 2);
}

#[test]
fn test_never_expire() {
    let (mut pool, clock) =
        manual_pool(PoolConfig::new().with_auto_clear_interval(Duration::from_secs(1)));
    let a = Arc::new(Widget("a"));
    pool.register(a.clone()).unwrap();
    pool.unspawn(&a);

    clock.advance(Duration::from_secs(1_000_000));
    pool.update(Duration::from_secs(1), Duration::from_secs(1));
    assert_eq!(pool.discard_all_expired(), 0);
    assert!(pool.contains(&a));
}

#[test]
fn test_update_counts_unscaled_time_only() {
    let (mut pool, clock) = manual_pool(
        PoolConfig::new()
            .with_expire_time(Duration::ZERO)
            .with_auto_clear_interval(Duration::from_secs(5)),
    );
    let a = Arc::new(Widget("a"));
    pool.register(a.clone()).unwrap();
    pool.unspawn(&a);
    clock.advance(Duration::from_secs(1));

    // game time runs fast, wall time barely moves
    pool.update(Duration::from_secs(100), Duration::from_secs(1));
    assert!(pool.contains(&a));

    // game time paused, wall time reaches the interval
    pool.update(Duration::ZERO, Duration::from_secs(4));
    assert!(!pool.contains(&a));
}

#[test]
fn test_discard() {
    let journal = Journal::default();
    let mut pool = Pool::new(PoolConfig::new());
    let a = Arc::new(Widget("a"));
    pool.register_with(a.clone(), discard_journal(&journal))
        .unwrap();

    assert!(!pool.discard(&a), "in use");
    pool.unspawn(&a);
    pool.lock(&a);
    assert!(!pool.discard(&a), "locked");
    pool.unlock(&a);
    assert!(pool.discard(&a));
    assert!(pool.is_empty());
    assert_eq!(*journal.lock().unwrap(), ["a"]);
}

#[test]
fn test_discard_all_unused() {
    let mut pool = Pool::new(PoolConfig::new());
    let targets: Vec<_> = (0..4).map(|_| Arc::new(Widget("w"))).collect();
    for t in &targets {
        pool.register(t.clone()).unwrap();
    }
    pool.unspawn(&targets[0]);
    pool.unspawn(&targets[1]);
    pool.unspawn(&targets[2]);
    pool.lock(&targets[2]);

    assert_eq!(pool.discard_all_unused(), 2);
    assert!(pool.contains(&targets[2]));
    assert!(pool.contains(&targets[3]));
}

#[test]
fn test_hooks_fire_per_reference() {
    let counts = Arc::new(Mutex::new((0, 0)));
    let spawned = counts.clone();
    let unspawned = counts.clone();
    let hooks = ObjectHooks::new()
        .on_spawn(move |_: &Widget| spawned.lock().unwrap().0 += 1)
        .on_unspawn(move |_: &Widget| unspawned.lock().unwrap().1 += 1);

    let mut pool = Pool::new(PoolConfig::new().with_multi_reference(true));
    let a = Arc::new(Widget("a"));
    pool.register_with(a.clone(), hooks).unwrap();
    pool.spawn().unwrap();
    pool.unspawn(&a);
    pool.unspawn(&a);

    assert_eq!(*counts.lock().unwrap(), (2, 2));
}

#[test]
fn test_object_infos_follow_registration_order() {
    let (mut pool, clock) = manual_pool(PoolConfig::new().with_capacity(8));
    let a = Arc::new(Widget("a"));
    let b = Arc::new(Widget("b"));
    pool.register(a.clone()).unwrap();
    pool.register(b.clone()).unwrap();
    pool.unspawn(&a);
    pool.lock(&b);
    clock.advance(Duration::from_secs(3));

    let infos = pool.object_infos();
    assert_eq!(infos.len(), 2);
    assert!(!infos[0].in_use);
    assert_eq!(infos[0].idle_for, Duration::from_secs(3));
    assert!(infos[1].in_use);
    assert!(infos[1].locked);

    let info = pool.info();
    assert_eq!(info.count, 2);
    assert_eq!(info.in_use_count, 1);
    assert_eq!(info.locked_count, 1);
    assert_eq!(info.capacity, Some(8));
    assert!(info.type_name.ends_with("Widget"));
}

#[test]
fn test_drop_discards_everything() {
    let journal = Journal::default();
    let mut pool = Pool::new(PoolConfig::new());
    let a = Arc::new(Widget("a"));
    let b = Arc::new(Widget("b"));
    pool.register_with(a.clone(), discard_journal(&journal))
        .unwrap();
    pool.register_with(b.clone(), discard_journal(&journal))
        .unwrap();
    pool.lock(&b);

    drop(pool);
    assert_eq!(*journal.lock().unwrap(), ["a", "b"]);
}
