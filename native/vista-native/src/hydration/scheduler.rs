//! When hydration work runs.

use futures::executor::LocalSpawner;
use futures::future::{self, FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::rc::Rc;

pub type VisibleCallback = Rc<dyn Fn(&str)>;

pub trait Scheduler {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
    fn delay(&self, ms: u64) -> LocalBoxFuture<'static, ()>;
    /// Resolves at the next idle period, or after `timeout_ms` at the latest.
    fn idle(&self, timeout_ms: Option<u64>) -> LocalBoxFuture<'static, ()>;
    /// Calls `on_visible` with each id as its element comes within `margin`
    /// of the viewport. Returns false when the host cannot observe
    /// intersections.
    fn observe_intersection(&self, ids: Vec<String>, margin: f64, on_visible: VisibleCallback) -> bool;
}

struct Observation {
    ids: Vec<String>,
    margin: f64,
    on_visible: VisibleCallback,
}

/// Runs tasks on a `futures` local executor. Delays and idle periods
/// complete immediately and are recorded; intersections fire only through
/// [`LocalScheduler::trigger`].
pub struct LocalScheduler {
    spawner: LocalSpawner,
    intersection: bool,
    observations: RefCell<Vec<Observation>>,
    delays: RefCell<Vec<u64>>,
    idles: RefCell<usize>,
}

impl LocalScheduler {
    pub fn new(spawner: LocalSpawner) -> Self {
        Self {
            spawner,
            intersection: false,
            observations: RefCell::new(Vec::new()),
            delays: RefCell::new(Vec::new()),
            idles: RefCell::new(0),
        }
    }

    pub fn with_intersection(mut self) -> Self {
        self.intersection = true;
        self
    }

    /// Reports `id` as visible to every observation that watches it.
    pub fn trigger(&self, id: &str) {
        let callbacks: Vec<VisibleCallback> = self
            .observations
            .borrow()
            .iter()
            .filter(|o| o.ids.iter().any(|watched| watched == id))
            .map(|o| Rc::clone(&o.on_visible))
            .collect();
        for callback in callbacks {
            callback(id);
        }
    }

    pub fn observed(&self) -> Vec<(String, f64)> {
        self.observations
            .borrow()
            .iter()
            .flat_map(|o| o.ids.iter().map(move |id| (id.clone(), o.margin)))
            .collect()
    }

    pub fn delays(&self) -> Vec<u64> {
        self.delays.borrow().clone()
    }

    pub fn idle_periods(&self) -> usize {
        *self.idles.borrow()
    }
}

impl Scheduler for LocalScheduler {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.spawner.spawn_local(task) {
            tracing::error!(error = %e, "failed to spawn hydration task");
        }
    }

    fn delay(&self, ms: u64) -> LocalBoxFuture<'static, ()> {
        self.delays.borrow_mut().push(ms);
        future::ready(()).boxed_local()
    }

    fn idle(&self, _timeout_ms: Option<u64>) -> LocalBoxFuture<'static, ()> {
        *self.idles.borrow_mut() += 1;
        future::ready(()).boxed_local()
    }

    fn observe_intersection(&self, ids: Vec<String>, margin: f64, on_visible: VisibleCallback) -> bool {
        if !self.intersection {
            return false;
        }
        self.observations.borrow_mut().push(Observation {
            ids,
            margin,
            on_visible,
        });
        true
    }
}
