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

//! A tiny frame loop that exercises pools, caches and state machines.
//!
//! Run with `RUST_LOG=debug` to see the sweeps.

use std::sync::Arc;
use std::time::Duration;

use spawnpool::CachePool;
use spawnpool::Cacheable;
use spawnpool::Fsm;
use spawnpool::FsmContext;
use spawnpool::FsmState;
use spawnpool::ObjectHooks;
use spawnpool::PoolConfig;
use spawnpool::PoolManager;

#[derive(Debug)]
struct Widget {
    name: &'static str,
}

#[derive(Debug, Default)]
struct ClickEvent {
    widget: Option<&'static str>,
    x: i32,
    y: i32,
}

impl Cacheable for ClickEvent {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

struct Hidden;

impl FsmState<Widget> for Hidden {
    fn on_enter(&mut self, fsm: &mut FsmContext<'_, Widget>) {
        if let Some(widget) = fsm.owner() {
            log::info!("{} hides", widget.name);
        }
    }

    fn on_update(&mut self, fsm: &mut FsmContext<'_, Widget>, _: Duration, _: Duration) {
        if fsm.current_state_time() >= Duration::from_millis(500) {
            fsm.change_state::<Shown>();
        }
    }
}

struct Shown;

impl FsmState<Widget> for Shown {
    fn on_enter(&mut self, fsm: &mut FsmContext<'_, Widget>) {
        if let Some(widget) = fsm.owner() {
            log::info!("{} shows", widget.name);
        }
    }
}

fn widget_hooks() -> ObjectHooks<Widget> {
    ObjectHooks::new()
        .on_spawn(|w: &Widget| log::info!("spawn {}", w.name))
        .on_unspawn(|w: &Widget| log::info!("unspawn {}", w.name))
        .on_discard(|w: &Widget| log::info!("discard {}", w.name))
}

fn main() -> spawnpool::Result<()> {
    use env_logger::Builder;
    use env_logger::Env;

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut manager = PoolManager::new();
    let pool = manager.create_pool::<Widget>(
        PoolConfig::new()
            .with_capacity(1)
            .with_expire_time(Duration::from_millis(200))
            .with_auto_clear_interval(Duration::from_millis(100)),
    )?;

    // capacity 1: the idle w1 makes room for w2
    let w1 = Arc::new(Widget { name: "w1" });
    pool.register_with(w1.clone(), widget_hooks())?;
    pool.unspawn(&w1);
    let w2 = Arc::new(Widget { name: "w2" });
    pool.register_with(w2.clone(), widget_hooks())?;
    log::info!("pool after registering w2: {:?}", pool.info());

    let mut fsm = Fsm::builder("w2-visibility", &w2)
        .with_state(Hidden)
        .with_state(Shown)
        .create()?;
    fsm.startup::<Hidden>()?;

    let frame = Duration::from_millis(100);
    for tick in 0..6 {
        let mut click = CachePool::global().spawn::<ClickEvent>();
        click.widget = Some(w2.name);
        click.x = tick * 10;
        click.y = tick * 5;
        log::debug!("frame {tick}: {:?}", *click);

        manager.update(frame, frame);
        fsm.update(frame, frame)?;
    }

    if let Some(pool) = manager.get_pool_mut::<Widget>() {
        pool.unspawn(&w2);
    }
    fsm.shutdown();
    drop(fsm);

    for info in CachePool::global().collection_infos() {
        log::info!("{info:?}");
    }
    manager.shutdown();
    Ok(())
}
