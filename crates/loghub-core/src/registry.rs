//! The live backend list.
//!
//! [`BackendRegistry`] publishes an immutable [`BackendSnapshot`]. Searches
//! clone the current snapshot and keep it for their whole lifetime, so a
//! replacement never changes the backends a running search sees.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::backend::SharedBackend;

/// An ordered, immutable backend list.
#[derive(Debug)]
pub struct BackendSnapshot {
    generation: u64,
    loaded_at: DateTime<Utc>,
    backends: Vec<SharedBackend>,
}

impl BackendSnapshot {
    fn new(generation: u64, backends: Vec<SharedBackend>) -> Self {
        Self {
            generation,
            loaded_at: Utc::now(),
            backends,
        }
    }

    /// Monotonic generation number; the first snapshot is generation 1.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// When this snapshot was installed.
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// The backends, in configuration order.
    #[must_use]
    pub fn backends(&self) -> &[SharedBackend] {
        &self.backends
    }

    /// Number of backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True when there are no backends.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Holder of the current backend snapshot.
#[derive(Debug)]
pub struct BackendRegistry {
    current: RwLock<Arc<BackendSnapshot>>,
}

impl BackendRegistry {
    /// Creates a registry holding `backends` as generation 1.
    #[must_use]
    pub fn new(backends: Vec<SharedBackend>) -> Self {
        Self {
            current: RwLock::new(Arc::new(BackendSnapshot::new(1, backends))),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<BackendSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Installs a new backend list and returns its generation.
    pub fn replace(&self, backends: Vec<SharedBackend>) -> u64 {
        let count = backends.len();
        let generation = {
            let mut current = self.current.write();
            let generation = current.generation + 1;
            *current = Arc::new(BackendSnapshot::new(generation, backends));
            generation
        };
        info!(generation, backends = count, "backend snapshot replaced");
        generation
    }

    /// Generation of the current snapshot.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
