//! Deferred shard access.
//!
//! A [`ShardHandle`] does nothing until [`ShardHandle::materialize`] is
//! called. Handles do not cache; callers that want load-once semantics wrap
//! their handles in a [`ShardArena`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use celestial_sky::CellId;

use super::{read_shard_file, Shard};
use crate::error::RefcatResult;

pub trait ShardHandle: Send + Sync {
    /// Load the shard now. Blocks on I/O; failures are returned, never
    /// retried.
    fn materialize(&self) -> RefcatResult<Arc<Shard>>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// A shard file on disk, decoded through a memory map on each call.
#[derive(Debug, Clone)]
pub struct FileShardHandle {
    path: PathBuf,
}

impl FileShardHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ShardHandle for FileShardHandle {
    fn materialize(&self) -> RefcatResult<Arc<Shard>> {
        read_shard_file(&self.path).map(Arc::new)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A shard already in memory. Used for tests and for catalogs assembled in
/// process.
#[derive(Debug, Clone)]
pub struct InMemoryShardHandle {
    shard: Arc<Shard>,
}

impl InMemoryShardHandle {
    pub fn new(shard: Shard) -> Self {
        Self {
            shard: Arc::new(shard),
        }
    }
}

impl ShardHandle for InMemoryShardHandle {
    fn materialize(&self) -> RefcatResult<Arc<Shard>> {
        Ok(Arc::clone(&self.shard))
    }

    fn describe(&self) -> String {
        format!("in-memory shard for cell {}", self.shard.cell)
    }
}

/// Caller-side cache of materialized shards keyed by cell id.
///
/// Successful loads are kept for the arena's lifetime; failures are not
/// cached, so a later call tries the underlying handle again.
#[derive(Debug, Default)]
pub struct ShardArena {
    shards: Mutex<HashMap<CellId, Arc<Shard>>>,
}

impl ShardArena {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handle for `cell` that loads through `inner` at most once per
    /// successful materialization.
    pub fn wrap(self: &Arc<Self>, cell: CellId, inner: Arc<dyn ShardHandle>) -> Arc<dyn ShardHandle> {
        Arc::new(ArenaShardHandle {
            arena: Arc::clone(self),
            cell,
            inner,
        })
    }

    pub fn get_or_load(&self, cell: CellId, handle: &dyn ShardHandle) -> RefcatResult<Arc<Shard>> {
        if let Some(shard) = self.lock().get(&cell) {
            return Ok(Arc::clone(shard));
        }
        // Load outside the lock; a concurrent loser's copy is dropped.
        let loaded = handle.materialize()?;
        let mut shards = self.lock();
        Ok(Arc::clone(shards.entry(cell).or_insert(loaded)))
    }

    pub fn contains(&self, cell: CellId) -> bool {
        self.lock().contains_key(&cell)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CellId, Arc<Shard>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.shards.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct ArenaShardHandle {
    arena: Arc<ShardArena>,
    cell: CellId,
    inner: Arc<dyn ShardHandle>,
}

impl ShardHandle for ArenaShardHandle {
    fn materialize(&self) -> RefcatResult<Arc<Shard>> {
        self.arena.get_or_load(self.cell, self.inner.as_ref())
    }

    fn describe(&self) -> String {
        format!("arena[{}] {}", self.cell, self.inner.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefcatError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandle {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl ShardHandle for CountingHandle {
        fn materialize(&self) -> RefcatResult<Arc<Shard>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(RefcatError::shard_format("flaky"));
            }
            Ok(Arc::new(Shard::new(3, 0, Vec::new())))
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    #[test]
    fn test_in_memory_handle_shares_shard() {
        let handle = InMemoryShardHandle::new(Shard::new(1, 0, Vec::new()));
        let a = handle.materialize().unwrap();
        let b = handle.materialize().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_arena_loads_once() {
        let inner = Arc::new(CountingHandle {
            calls: AtomicUsize::new(0),
            fail_first: false,
        });
        let arena = ShardArena::new();
        let handle = arena.wrap(3, inner.clone());
        handle.materialize().unwrap();
        handle.materialize().unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert!(arena.contains(3));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_arena_does_not_cache_failures() {
        let inner = Arc::new(CountingHandle {
            calls: AtomicUsize::new(0),
            fail_first: true,
        });
        let arena = ShardArena::new();
        let handle = arena.wrap(3, inner.clone());
        assert!(handle.materialize().is_err());
        assert!(arena.is_empty());
        assert!(handle.materialize().is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_file_handle_reports_missing_file() {
        let handle = FileShardHandle::new("/nonexistent/0.shard");
        assert!(handle.materialize().is_err());
        assert!(handle.describe().contains("0.shard"));
    }
}
