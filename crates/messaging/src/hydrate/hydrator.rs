//! Hydration dispatcher backed by a rayon thread pool

use anyhow::{Context, Result};
use log::{debug, warn};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::{Hydrate, Observers};
use crate::cache::Shared;
use crate::source::{ContactLookup, RowSource};

/// Count of dispatched jobs that have not finished yet
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn start(&self) {
        *self.count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Marks a job finished when dropped, including on unwind
struct FinishGuard(Arc<InFlight>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Fills in cached entities, on the caller's thread or in the background
pub struct Hydrator {
    source: Arc<dyn RowSource>,
    contacts: Arc<dyn ContactLookup>,
    observers: Observers,
    pool: rayon::ThreadPool,
    in_flight: Arc<InFlight>,
}

impl Hydrator {
    /// Create a hydrator with `threads` background workers
    pub fn new(
        source: Arc<dyn RowSource>,
        contacts: Arc<dyn ContactLookup>,
        observers: Observers,
        threads: usize,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("hydrate-{}", i))
            .panic_handler(|_| warn!("[HYDRATE] worker job panicked"))
            .build()
            .context("Failed to start hydration workers")?;

        Ok(Self {
            source,
            contacts,
            observers,
            pool,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Hydrate `entity`
    ///
    /// With `sync` the work runs before this returns; otherwise it is queued
    /// on the worker pool and this returns immediately. Invalid entities are
    /// ignored. Returns whether any work was started.
    pub fn fill<E: Hydrate>(&self, entity: &Shared<E>, sync: bool) -> bool {
        if !entity.read().unwrap_or_else(|e| e.into_inner()).is_valid() {
            return false;
        }

        if sync {
            run(&*self.source, &*self.contacts, &self.observers, entity);
            return true;
        }

        let source = Arc::clone(&self.source);
        let contacts = Arc::clone(&self.contacts);
        let observers = self.observers.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let entity = Arc::clone(entity);

        in_flight.start();
        let guard = FinishGuard(in_flight);
        self.pool.spawn(move || {
            let _guard = guard;
            run(&*source, &*contacts, &observers, &entity);
        });
        true
    }

    /// Block until every queued job has finished or `timeout` elapses
    ///
    /// Returns `true` when the pool is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self
            .in_flight
            .count
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self
                .in_flight
                .idle
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }
}

fn run<E: Hydrate>(
    source: &dyn RowSource,
    contacts: &dyn ContactLookup,
    observers: &Observers,
    entity: &Shared<E>,
) {
    let event = {
        let mut current = entity.write().unwrap_or_else(|e| e.into_inner());
        if !current.is_valid() {
            return;
        }
        let event = current.event();
        if let Err(e) = current.hydrate(source, contacts) {
            warn!("[HYDRATE] abandoned {:?}: {}", event, e);
            return;
        }
        event
    };

    debug!("[HYDRATE] filled {:?}", event);
    observers.notify(event);
}
