use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;

use actiongraph_core::{GraphConfig, GraphError, ObjectKind, RecordStore, Result, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::GraphContext;
use crate::events::{ChangeKind, GraphDelegate, GraphEvent};
use crate::memory_store::MemoryStore;
use crate::node::{Action, Bond, Entity, GraphNode, NodeCell};
use crate::notifier::{self, CommitPhase, NodeChange, StagedBatch};
use crate::search::{Query, SearchResults};
use crate::session::Session;
use crate::watch::Subscription;

/// Outcome of a successful save.
#[derive(Debug, Clone, Default)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Events dispatched for the batch, in dispatch order.
    pub events: Vec<GraphEvent>,
}

impl CommitSummary {
    fn new(changes: &[NodeChange], events: Vec<GraphEvent>) -> Self {
        let count = |kind: ChangeKind| changes.iter().filter(|c| c.change == kind).count();
        Self {
            inserted: count(ChangeKind::Insert),
            updated: count(ChangeKind::Update),
            deleted: count(ChangeKind::Delete),
            events,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Entry point of the graph: creates nodes, runs searches, registers
/// watches and commits staged mutations.
///
/// A `Graph` is bound to one record store. Clones share the store, the
/// staged batch and the delegate.
#[derive(Clone)]
pub struct Graph {
    session: Arc<Session>,
}

impl Graph {
    /// A graph over a fresh [`MemoryStore`], sharing the process-wide
    /// index and watch table.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn context(&self) -> &Arc<GraphContext> {
        self.session.context()
    }

    pub fn config(&self) -> &GraphConfig {
        self.session.config()
    }

    pub fn set_delegate(&self, delegate: Arc<dyn GraphDelegate>) {
        self.session.set_delegate(Some(delegate));
    }

    pub fn clear_delegate(&self) {
        self.session.set_delegate(None);
    }

    /// Stream of every event dispatched by this graph's saves.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.session.subscribe()
    }

    pub fn watch(&self, subscription: Subscription) -> bool {
        self.context().watch(subscription)
    }

    pub fn unwatch(&self, subscription: &Subscription) -> bool {
        self.context().unwatch(subscription)
    }

    pub fn watches(&self) -> Vec<Subscription> {
        self.context().watches().subscriptions()
    }

    pub fn create_entity(&self, node_type: &str) -> Entity {
        Entity(NodeCell::create(&self.session, ObjectKind::Entity, node_type))
    }

    pub fn create_action(&self, node_type: &str) -> Action {
        Action(NodeCell::create(&self.session, ObjectKind::Action, node_type))
    }

    pub fn create_bond(&self, node_type: &str) -> Bond {
        Bond(NodeCell::create(&self.session, ObjectKind::Bond, node_type))
    }

    /// Committed nodes of kind `N` matching `query`. Unknown keys give an
    /// empty result.
    pub fn search<N: GraphNode>(&self, query: Query) -> SearchResults<N> {
        let key = query.key(N::KIND);
        SearchResults::new(self.context().index().lookup(&key))
    }

    /// Committed nodes of kind `N` whose property `name` lies within
    /// `bounds`, ordered by value.
    pub fn search_range<N, R>(&self, name: &str, bounds: R) -> SearchResults<N>
    where
        N: GraphNode,
        R: RangeBounds<Value>,
    {
        SearchResults::new(self.context().index().range(N::KIND, name, bounds))
    }

    pub fn phase(&self) -> CommitPhase {
        self.session.phase()
    }

    pub fn has_pending(&self) -> bool {
        self.session.has_touched() || self.session.store().has_pending()
    }

    /// Commit every staged mutation, then update the index and dispatch the
    /// matched events.
    ///
    /// Saves on graphs sharing a context run one at a time. A failed commit
    /// leaves the index untouched, fires nothing and keeps the batch staged
    /// for the next save. The commit runs on its own task: dropping the
    /// returned future does not stop a batch that already reached the store.
    /// A panicking delegate callback resumes on the caller.
    pub async fn save(&self) -> Result<CommitSummary> {
        let graph = self.clone();
        match tokio::spawn(async move { graph.commit_batch().await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(GraphError::CommitFailed(e.to_string())),
        }
    }

    async fn commit_batch(&self) -> Result<CommitSummary> {
        let session = &self.session;
        let context = session.context().clone();
        let _commit = context.lock_commits().await;

        let batch = StagedBatch::take(session);
        let mut phase = PhaseReset::new(session);
        if batch.is_empty() && !session.store().has_pending() {
            debug!("nothing to commit");
            return Ok(CommitSummary::default());
        }
        session.set_phase(CommitPhase::Committing);
        debug!("committing {} staged nodes", batch.len());

        let change_set = match session.store().commit().await {
            Ok(change_set) => change_set,
            Err(e) => {
                batch.restore(session);
                phase.failed();
                warn!("commit failed: {}", e);
                return Err(match e {
                    GraphError::CommitFailed(reason) => GraphError::CommitFailed(reason),
                    other => GraphError::CommitFailed(other.to_string()),
                });
            }
        };

        session.set_phase(CommitPhase::Notifying);
        let changes = batch.classify(&change_set);
        notifier::settle(&changes);
        notifier::apply_to_index(&mut context.index_mut(), &changes);
        let events = notifier::match_events(&context.watches(), &changes);

        let delegate = session.delegate();
        for event in &events {
            if let Some(delegate) = &delegate {
                event.dispatch(self, delegate.as_ref());
            }
            session.publish(event);
        }

        let summary = CommitSummary::new(&changes, events);
        info!(
            "commit: {} inserted, {} updated, {} deleted, {} events",
            summary.inserted,
            summary.updated,
            summary.deleted,
            summary.events.len()
        );
        Ok(summary)
    }

    /// Run [`save`](Self::save) on the current tokio runtime and hand the
    /// outcome to `completion`, exactly once.
    pub fn save_with<F>(&self, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<CommitSummary>) + Send + 'static,
    {
        let graph = self.clone();
        tokio::spawn(async move { completion(graph.save().await) })
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("phase", &self.phase())
            .field("has_pending", &self.has_pending())
            .finish()
    }
}

/// Leaves the commit cycle when dropped, unwinding included: `Idle` after a
/// failed commit, otherwise `Staging` if writes arrived meanwhile.
struct PhaseReset<'a> {
    session: &'a Session,
    failed: bool,
}

impl<'a> PhaseReset<'a> {
    fn new(session: &'a Session) -> Self {
        Self {
            session,
            failed: false,
        }
    }

    fn failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        let phase = if !self.failed && self.session.has_touched() {
            CommitPhase::Staging
        } else {
            CommitPhase::Idle
        };
        self.session.set_phase(phase);
    }
}

#[derive(Default)]
pub struct GraphBuilder {
    store: Option<Arc<dyn RecordStore>>,
    context: Option<Arc<GraphContext>>,
    config: GraphConfig,
}

impl GraphBuilder {
    /// Store to commit into. Defaults to a fresh [`MemoryStore`]. A store
    /// must not be shared between graphs; clone the graph instead.
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Index and watch table to use. Defaults to the process-wide context.
    pub fn context(mut self, context: Arc<GraphContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Graph {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn RecordStore>);
        let context = self.context.unwrap_or_else(GraphContext::process);
        Graph {
            session: Arc::new(Session::new(store, context, self.config)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated() -> Graph {
        Graph::builder().context(Arc::new(GraphContext::new())).build()
    }

    #[tokio::test]
    async fn phase_follows_the_commit_cycle() {
        let graph = isolated();
        assert_eq!(graph.phase(), CommitPhase::Idle);
        graph.create_entity("User");
        assert_eq!(graph.phase(), CommitPhase::Staging);
        assert!(graph.has_pending());
        graph.save().await.unwrap();
        assert_eq!(graph.phase(), CommitPhase::Idle);
        assert!(!graph.has_pending());
    }

    #[tokio::test]
    async fn empty_save_is_a_no_op() {
        let graph = isolated();
        let summary = graph.save().await.unwrap();
        assert!(summary.is_empty());
        assert!(summary.events.is_empty());
    }

    #[tokio::test]
    async fn save_with_reports_once() {
        let graph = isolated();
        graph.create_action("Read");
        let (tx, rx) = tokio::sync::oneshot::channel();
        graph
            .save_with(move |result| {
                let _ = tx.send(result.map(|s| s.inserted));
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn clones_share_staged_batch() {
        let graph = isolated();
        let other = graph.clone();
        other.create_bond("Friend");
        assert_eq!(graph.save().await.unwrap().inserted, 1);
    }
}
