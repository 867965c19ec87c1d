use std::collections::BTreeMap;
use std::sync::Arc;

use actiongraph_core::{GraphConfig, RecordRef, RecordStore};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

use crate::context::GraphContext;
use crate::events::{GraphDelegate, GraphEvent};
use crate::node::NodeCell;
use crate::notifier::CommitPhase;

/// State shared by every clone of one `Graph`: the bound store, the nodes
/// staged since the last commit and the delivery targets for its events.
pub(crate) struct Session {
    store: Arc<dyn RecordStore>,
    context: Arc<GraphContext>,
    touched: Mutex<BTreeMap<RecordRef, Arc<NodeCell>>>,
    phase: Mutex<CommitPhase>,
    delegate: RwLock<Option<Arc<dyn GraphDelegate>>>,
    events: broadcast::Sender<GraphEvent>,
    config: GraphConfig,
}

impl Session {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        context: Arc<GraphContext>,
        config: GraphConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.events.channel_capacity.max(1));
        Self {
            store,
            context,
            touched: Mutex::new(BTreeMap::new()),
            phase: Mutex::new(CommitPhase::Idle),
            delegate: RwLock::new(None),
            events,
            config,
        }
    }

    pub(crate) fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub(crate) fn context(&self) -> &Arc<GraphContext> {
        &self.context
    }

    pub(crate) fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Stage `cell` for the next commit.
    pub(crate) fn touch(&self, cell: &Arc<NodeCell>) {
        self.touched
            .lock()
            .entry(cell.record())
            .or_insert_with(|| cell.clone());
        let mut phase = self.phase.lock();
        if *phase == CommitPhase::Idle {
            trace!("graph staging");
            *phase = CommitPhase::Staging;
        }
    }

    pub(crate) fn take_touched(&self) -> BTreeMap<RecordRef, Arc<NodeCell>> {
        std::mem::take(&mut *self.touched.lock())
    }

    pub(crate) fn has_touched(&self) -> bool {
        !self.touched.lock().is_empty()
    }

    pub(crate) fn phase(&self) -> CommitPhase {
        *self.phase.lock()
    }

    pub(crate) fn set_phase(&self, phase: CommitPhase) {
        *self.phase.lock() = phase;
    }

    pub(crate) fn delegate(&self) -> Option<Arc<dyn GraphDelegate>> {
        self.delegate.read().clone()
    }

    pub(crate) fn set_delegate(&self, delegate: Option<Arc<dyn GraphDelegate>>) {
        *self.delegate.write() = delegate;
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    /// Publish on the event stream. Having no receivers is not an error.
    pub(crate) fn publish(&self, event: &GraphEvent) {
        if self.config.events.broadcast {
            let _ = self.events.send(event.clone());
        }
    }
}
