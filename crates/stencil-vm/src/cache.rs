//! Bounded LRU cache of compiled expressions.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::{CompileError, CompiledExpr, Compiler};

/// Default number of distinct expression strings kept compiled.
pub const DEFAULT_CAPACITY: usize = 1024;

type Entry = Result<Arc<CompiledExpr>, CompileError>;

/// Counters for [`ExprCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

struct Inner {
    /// Least recently used first.
    entries: IndexMap<Arc<str>, Entry>,
    compiler: Compiler,
    capacity: usize,
    hits: u64,
    misses: u64,
}

/// Thread-safe compile cache keyed by expression source.
///
/// Rejections are cached too, so an expression outside the compiled subset
/// costs one compile attempt, not one per evaluation.
pub struct ExprCache {
    inner: Mutex<Inner>,
}

impl Default for ExprCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for ExprCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExprCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ExprCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                compiler: Compiler::new(),
                capacity: capacity.max(1),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Return the compiled form of `source`, compiling it on a miss.
    pub fn get_or_compile(&self, source: &str) -> Entry {
        let mut inner = self.inner.lock();

        if let Some((key, entry)) = inner.entries.shift_remove_entry(source) {
            inner.hits += 1;
            inner.entries.insert(key, entry.clone());
            return entry;
        }

        inner.misses += 1;
        let entry = inner.compiler.compile(source).map(Arc::new);
        if let Err(err) = &entry {
            tracing::trace!(source, %err, "expression not compiled");
        }
        inner.entries.insert(Arc::from(source), entry.clone());
        while inner.entries.len() > inner.capacity {
            inner.entries.shift_remove_index(0);
        }
        entry
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            len: inner.entries.len(),
            capacity: inner.capacity,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }
}
