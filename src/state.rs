//! In-memory binding table refreshed from the Caddy admin API.
//!
//! The table maps fully-qualified hostnames (trailing-dot form, case as
//! configured) to the upstream address text Caddy proxies them to. It is
//! replaced wholesale on every refresh: readers always see exactly one
//! refresh generation.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;

/// Hostname → upstream address text.
pub type Bindings = HashMap<String, String>;

/// Thread-safe binding table shared by the fetcher and the interceptor.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    inner: Arc<RwLock<BindingTableInner>>,
}

#[derive(Debug, Default)]
struct BindingTableInner {
    /// Current snapshot. Swapped, never mutated in place.
    bindings: Arc<Bindings>,

    /// Incremented on every replace.
    generation: u64,

    /// True after the first replace.
    ready: bool,
}

impl BindingTable {
    /// Create an empty, not yet ready table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the address bound to `name`. The name must match the stored
    /// key exactly.
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.inner.read().bindings.get(name).cloned()
    }

    /// Install a complete new table, discarding the previous one.
    ///
    /// Returns the generation of the installed table.
    pub fn replace(&self, bindings: Bindings) -> u64 {
        let bindings = Arc::new(bindings);
        let count = bindings.len();

        let generation = {
            let mut inner = self.inner.write();
            inner.bindings = bindings;
            inner.generation = inner.generation.wrapping_add(1);
            inner.ready = true;
            inner.generation
        };

        debug!(bindings = count, generation, "replaced binding table");
        generation
    }

    /// The current snapshot as a whole.
    pub fn snapshot(&self) -> Arc<Bindings> {
        Arc::clone(&self.inner.read().bindings)
    }

    /// Number of bindings in the current snapshot.
    pub fn len(&self) -> usize {
        self.inner.read().bindings.len()
    }

    /// Whether the current snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Generation of the current snapshot (0 before the first replace).
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Whether the table has been populated at least once.
    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    /// Emit current table metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_table_state(inner.bindings.len(), inner.generation, inner.ready);
    }
}
