//! Pooling of reusable objects such as decoder players.
//!
//! Opening a decoder is costly, and clips start and stop constantly while a
//! timeline plays. Clips borrow a player from the pool on initialization and
//! hand it back on stop. At most `max_idle` returned objects are kept; the
//! rest are dropped.

use parking_lot::Mutex;
use reelflow_core::Result;
use std::sync::Arc;
use tracing::debug;

use crate::player::{MediaBackend, SharedPlayer};

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

/// Statistics about the current state of a pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Objects handed out and not yet returned.
    pub active: usize,
    /// Objects waiting for reuse.
    pub idle: usize,
    /// Cap on idle objects.
    pub max_idle: usize,
    /// Objects created since the pool was built.
    pub created: usize,
}

struct PoolState<T> {
    idle: Vec<T>,
    active: usize,
    created: usize,
}

/// A locked free list with a factory for misses.
pub struct ObjectPool<T> {
    state: Mutex<PoolState<T>>,
    factory: Factory<T>,
    max_idle: usize,
}

impl<T: Send> ObjectPool<T> {
    pub fn new(max_idle: usize, factory: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                active: 0,
                created: 0,
            }),
            factory: Box::new(factory),
            max_idle,
        }
    }

    /// Take an idle object, or build one if none is left.
    pub fn acquire(&self) -> Result<T> {
        let reused = {
            let mut state = self.state.lock();
            let obj = state.idle.pop();
            if obj.is_some() {
                state.active += 1;
            }
            obj
        };
        if let Some(obj) = reused {
            return Ok(obj);
        }

        // Build outside the lock, factories may be slow.
        let obj = (self.factory)()?;
        let mut state = self.state.lock();
        state.active += 1;
        state.created += 1;
        debug!(created = state.created, "pool allocated a new object");
        Ok(obj)
    }

    /// Return an object for reuse.
    pub fn release(&self, obj: T) {
        let dropped = {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            if state.idle.len() < self.max_idle {
                state.idle.push(obj);
                None
            } else {
                Some(obj)
            }
        };
        // Dropped outside the lock, teardown may join threads.
        drop(dropped);
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().created
    }

    /// Drop every idle object.
    pub fn clear(&self) {
        let idle = std::mem::take(&mut self.state.lock().idle);
        drop(idle);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            active: state.active,
            idle: state.idle.len(),
            max_idle: self.max_idle,
            created: state.created,
        }
    }
}

/// Pool of decoder players shared by every clip of a workflow.
pub type PlayerPool = ObjectPool<SharedPlayer>;

impl ObjectPool<SharedPlayer> {
    /// Pool that creates players from `backend` on demand.
    pub fn for_backend(backend: Arc<dyn MediaBackend>, max_idle: usize) -> Self {
        debug!(backend = backend.name(), max_idle, "creating player pool");
        Self::new(max_idle, move || backend.create_player())
    }
}
