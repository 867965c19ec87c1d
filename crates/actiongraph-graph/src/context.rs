use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::index::MultiIndex;
use crate::watch::{Subscription, WatchRegistry};

static PROCESS_CONTEXT: Lazy<Arc<GraphContext>> = Lazy::new(|| Arc::new(GraphContext::new()));

/// Search index and watch table shared by every graph bound to it.
///
/// Graphs built with [`Graph::new`](crate::Graph::new) share the
/// process-wide context. Commits are serialized per context, so a lookup
/// never observes a batch that is only partly applied.
#[derive(Debug, Default)]
pub struct GraphContext {
    index: RwLock<MultiIndex>,
    watches: RwLock<WatchRegistry>,
    commit_lock: Mutex<()>,
}

impl GraphContext {
    /// A context isolated from the process-wide one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide context. Lives until process exit.
    pub fn process() -> Arc<Self> {
        PROCESS_CONTEXT.clone()
    }

    pub fn index(&self) -> RwLockReadGuard<'_, MultiIndex> {
        self.index.read()
    }

    pub(crate) fn index_mut(&self) -> RwLockWriteGuard<'_, MultiIndex> {
        self.index.write()
    }

    pub fn watches(&self) -> RwLockReadGuard<'_, WatchRegistry> {
        self.watches.read()
    }

    pub fn watch(&self, subscription: Subscription) -> bool {
        debug!("watch {}", subscription);
        self.watches.write().watch(subscription)
    }

    pub fn unwatch(&self, subscription: &Subscription) -> bool {
        debug!("unwatch {}", subscription);
        self.watches.write().unwatch(subscription)
    }

    /// Held from the hand-off to the store until the last event of the
    /// batch is dispatched.
    pub(crate) async fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().await
    }
}
