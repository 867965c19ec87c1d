use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use actiongraph_core::{
    ChangeSet, ChangedRecord, FieldValue, GraphError, NodeId, RecordKind, RecordRef, RecordStore,
    Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredRecord {
    kind: RecordKind,
    id: Option<NodeId>,
    fields: BTreeMap<String, FieldValue>,
}

impl StoredRecord {
    fn is_committed(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<RecordRef, StoredRecord>,
    inserted: BTreeSet<RecordRef>,
    updated: BTreeMap<RecordRef, BTreeSet<String>>,
    deleted: BTreeSet<RecordRef>,
    fail_next: Option<String>,
    commits: u64,
}

/// In-process [`RecordStore`] keeping every record in memory.
///
/// Field writes are applied immediately and tracked per transaction; a
/// commit stamps permanent ids on inserted records, drops deleted ones and
/// reports the three record sets. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    next_ref: AtomicU64,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every commit by `latency` before it is applied.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Make the next commit fail with `reason`, leaving its transaction
    /// pending.
    pub fn fail_next_commit(&self, reason: impl Into<String>) {
        self.state.lock().fail_next = Some(reason.into());
    }

    /// Records currently held, pending insertions included.
    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn committed_count(&self, kind: RecordKind) -> usize {
        self.state
            .lock()
            .records
            .values()
            .filter(|r| r.kind == kind && r.is_committed())
            .count()
    }

    pub fn commit_count(&self) -> u64 {
        self.state.lock().commits
    }

    pub fn field(&self, record: RecordRef, name: &str) -> Option<FieldValue> {
        self.state
            .lock()
            .records
            .get(&record)
            .and_then(|r| r.fields.get(name).cloned())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn create_record(&self, kind: RecordKind) -> RecordRef {
        let record = RecordRef(self.next_ref.fetch_add(1, Ordering::Relaxed) + 1);
        let mut state = self.state.lock();
        state.records.insert(
            record,
            StoredRecord {
                kind,
                id: None,
                fields: BTreeMap::new(),
            },
        );
        state.inserted.insert(record);
        record
    }

    fn delete_record(&self, record: RecordRef) -> bool {
        let mut state = self.state.lock();
        if state.deleted.contains(&record) {
            return false;
        }
        let committed = match state.records.get(&record) {
            Some(r) => r.is_committed(),
            None => return false,
        };
        state.updated.remove(&record);
        if committed {
            state.deleted.insert(record);
        } else {
            // never committed: discard outright
            state.inserted.remove(&record);
            state.records.remove(&record);
        }
        true
    }

    fn set_field(&self, record: RecordRef, name: &str, value: FieldValue) -> Result<()> {
        let mut state = self.state.lock();
        if state.deleted.contains(&record) {
            return Err(GraphError::InvalidMutation(format!(
                "record {} is pending deletion",
                record
            )));
        }
        let stored = state
            .records
            .get_mut(&record)
            .ok_or_else(|| GraphError::Store(format!("unknown record {}", record)))?;
        let committed = stored.is_committed();
        stored.fields.insert(name.to_string(), value);
        if committed {
            state
                .updated
                .entry(record)
                .or_default()
                .insert(name.to_string());
        }
        Ok(())
    }

    fn is_committed(&self, record: RecordRef) -> bool {
        self.state
            .lock()
            .records
            .get(&record)
            .map(StoredRecord::is_committed)
            .unwrap_or(false)
    }

    fn has_pending(&self) -> bool {
        let state = self.state.lock();
        !(state.inserted.is_empty() && state.updated.is_empty() && state.deleted.is_empty())
    }

    async fn commit(&self) -> Result<ChangeSet> {
        let outcome = self.apply();
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
        outcome
    }
}

impl MemoryStore {
    // The transaction is applied when `commit` is called; writes made while
    // the answer is delayed belong to the next transaction.
    fn apply(&self) -> Result<ChangeSet> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next.take() {
            warn!("memory store commit rejected: {}", reason);
            return Err(GraphError::CommitFailed(reason));
        }

        let mut change_set = ChangeSet::default();

        for record in std::mem::take(&mut state.inserted) {
            if let Some(stored) = state.records.get_mut(&record) {
                let id = Uuid::new_v4();
                stored.id = Some(id);
                change_set.inserted.push(ChangedRecord {
                    record,
                    kind: stored.kind,
                    id,
                    changed: stored.fields.keys().cloned().collect(),
                    fields: stored.fields.clone(),
                });
            }
        }

        for (record, changed) in std::mem::take(&mut state.updated) {
            if let Some(stored) = state.records.get(&record) {
                if let Some(id) = stored.id {
                    change_set.updated.push(ChangedRecord {
                        record,
                        kind: stored.kind,
                        id,
                        fields: stored.fields.clone(),
                        changed: changed.into_iter().collect(),
                    });
                }
            }
        }

        for record in std::mem::take(&mut state.deleted) {
            if let Some(stored) = state.records.remove(&record) {
                if let Some(id) = stored.id {
                    change_set.deleted.push(ChangedRecord {
                        record,
                        kind: stored.kind,
                        id,
                        fields: stored.fields,
                        changed: Vec::new(),
                    });
                }
            }
        }

        state.commits += 1;
        debug!(
            "memory store commit #{}: {} inserted, {} updated, {} deleted",
            state.commits,
            change_set.inserted.len(),
            change_set.updated.len(),
            change_set.deleted.len()
        );
        Ok(change_set)
    }
}
