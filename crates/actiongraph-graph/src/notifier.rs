//! Commit-time classification, index maintenance and event matching.
//!
//! A save moves through `Idle -> Staging -> Committing -> Notifying -> Idle`.
//! The pieces here run in that order once the store has confirmed the
//! transaction: [`StagedBatch::classify`] turns the raw record sets into
//! per-node changes, [`apply_to_index`] brings the search index up to date and
//! [`match_events`] produces the events to dispatch. Nothing here runs for a
//! failed commit; the batch is put back with [`StagedBatch::restore`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use actiongraph_core::{ChangeSet, NodeId, RecordRef, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::attributes::{AttributeDeltas, GroupDelta, PropertyDelta};
use crate::events::{ChangeKind, GraphEvent};
use crate::index::{IndexKey, MultiIndex};
use crate::node::{AnyNode, Lifecycle, NodeCell};
use crate::session::Session;
use crate::watch::{MatchKind, WatchRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPhase {
    /// No staged mutations.
    Idle,
    Staging,
    /// The store is applying the transaction.
    Committing,
    /// The index is updated and events are being dispatched.
    Notifying,
}

/// Touched nodes of one save together with the attribute deltas drained from
/// them.
pub(crate) struct StagedBatch {
    cells: BTreeMap<RecordRef, Arc<NodeCell>>,
    deltas: BTreeMap<RecordRef, AttributeDeltas>,
}

impl StagedBatch {
    pub(crate) fn take(session: &Session) -> Self {
        let cells = session.take_touched();
        let deltas = cells
            .iter()
            .map(|(record, cell)| (*record, cell.write().attributes.take_pending()))
            .collect();
        Self { cells, deltas }
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Hand the batch back to its nodes after a failed commit.
    pub(crate) fn restore(self, session: &Session) {
        let mut deltas = self.deltas;
        for (record, cell) in self.cells {
            if let Some(older) = deltas.remove(&record) {
                cell.write().attributes.restore_pending(older);
            }
            session.touch(&cell);
        }
    }

    /// Match the store's record sets against the staged nodes. Property and
    /// group records count as an update of their owner when the owner has
    /// attribute deltas; inserts and deletes of the node record win.
    pub(crate) fn classify(mut self, change_set: &ChangeSet) -> Vec<NodeChange> {
        let mut inserted: BTreeMap<RecordRef, NodeId> = BTreeMap::new();
        let mut updated: BTreeSet<RecordRef> = BTreeSet::new();
        let mut deleted: BTreeSet<RecordRef> = BTreeSet::new();

        for record in &change_set.inserted {
            if record.kind.is_node() {
                inserted.insert(record.record, record.id);
            }
        }
        for record in &change_set.deleted {
            if record.kind.is_node() {
                deleted.insert(record.record);
            }
        }
        for record in &change_set.updated {
            if record.kind.is_node() {
                updated.insert(record.record);
            }
        }
        for record in change_set
            .inserted
            .iter()
            .chain(&change_set.updated)
            .chain(&change_set.deleted)
            .filter(|r| !r.kind.is_node())
        {
            let Some(owner) = record.owner() else {
                continue;
            };
            let has_deltas = self.deltas.get(&owner).map_or(false, |d| !d.is_empty());
            if has_deltas {
                updated.insert(owner);
            }
        }

        let mut changes = Vec::new();
        for (record, id) in inserted {
            changes.extend(self.change(ChangeKind::Insert, record, Some(id)));
        }
        for record in updated {
            if !deleted.contains(&record) && self.cells.contains_key(&record) {
                changes.extend(self.change(ChangeKind::Update, record, None));
            }
        }
        for record in deleted {
            changes.extend(self.change(ChangeKind::Delete, record, None));
        }
        changes
    }

    fn change(&mut self, change: ChangeKind, record: RecordRef, id: Option<NodeId>) -> Option<NodeChange> {
        let cell = self.cells.remove(&record)?;
        Some(NodeChange {
            change,
            id,
            deltas: self.deltas.remove(&record).unwrap_or_default(),
            node: AnyNode::from_cell(cell),
        })
    }
}

/// One node's share of a confirmed commit.
#[derive(Debug, Clone)]
pub(crate) struct NodeChange {
    pub(crate) change: ChangeKind,
    pub(crate) node: AnyNode,
    /// Permanent id, for inserts.
    pub(crate) id: Option<NodeId>,
    pub(crate) deltas: AttributeDeltas,
}

/// Stamp ids and move lifecycles forward.
pub(crate) fn settle(changes: &[NodeChange]) {
    for change in changes {
        let mut state = change.node.cell().write();
        match change.change {
            ChangeKind::Insert => {
                state.id = change.id;
                if state.lifecycle == Lifecycle::Staged {
                    state.lifecycle = Lifecycle::Committed;
                }
            }
            ChangeKind::Update => {}
            ChangeKind::Delete => state.lifecycle = Lifecycle::Deleted,
        }
    }
}

/// Apply a confirmed batch to the index. The caller holds the index write
/// lock for the whole batch.
pub(crate) fn apply_to_index(index: &mut MultiIndex, changes: &[NodeChange]) {
    for change in changes {
        let node = &change.node;
        let kind = node.kind();
        match change.change {
            ChangeKind::Insert => {
                index.index(node, IndexKey::of_type(kind, node.node_type()));
                apply_deltas(index, node, &change.deltas);
            }
            ChangeKind::Update => apply_deltas(index, node, &change.deltas),
            ChangeKind::Delete => {
                let removed = index.deindex_node(node.key());
                trace!("{} left {} index keys", kind, removed);
            }
        }
    }
}

fn apply_deltas(index: &mut MultiIndex, node: &AnyNode, deltas: &AttributeDeltas) {
    let kind = node.kind();
    for (name, PropertyDelta { old, new }) in &deltas.properties {
        if let Some(old) = old {
            index.deindex(node.key(), &IndexKey::property_value(kind, name.as_str(), old.clone()));
        }
        if let Some(new) = new {
            index.index(node, IndexKey::property_value(kind, name.as_str(), new.clone()));
        }
        match (old, new) {
            (None, Some(_)) => {
                index.index(node, IndexKey::property(kind, name.as_str()));
            }
            (Some(_), None) => {
                index.deindex(node.key(), &IndexKey::property(kind, name.as_str()));
            }
            _ => {}
        }
    }
    for (name, delta) in &deltas.groups {
        let key = IndexKey::group(kind, name.as_str());
        match delta {
            GroupDelta::Added => {
                index.index(node, key);
            }
            GroupDelta::Removed => {
                index.deindex(node.key(), &key);
            }
        }
    }
}

/// Events for the watched parts of a confirmed batch, inserts first, then
/// updates, then deletes.
pub(crate) fn match_events(watches: &WatchRegistry, changes: &[NodeChange]) -> Vec<GraphEvent> {
    let mut events = Vec::new();
    for pass in [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete] {
        for change in changes.iter().filter(|c| c.change == pass) {
            match pass {
                ChangeKind::Delete => deleted_events(watches, &change.node, &mut events),
                _ => changed_events(watches, change, &mut events),
            }
        }
    }
    debug!("{} node changes matched {} events", changes.len(), events.len());
    events
}

fn changed_events(watches: &WatchRegistry, change: &NodeChange, events: &mut Vec<GraphEvent>) {
    let node = &change.node;
    let deltas = &change.deltas;
    let matched = watches.matching(
        node.kind(),
        &node.node_type(),
        deltas.groups.keys().map(String::as_str),
        deltas.properties.keys().map(String::as_str),
    );

    for subscription in matched {
        let event = match subscription.match_kind {
            MatchKind::Type if change.change == ChangeKind::Insert => GraphEvent::Inserted(node.clone()),
            MatchKind::Type => GraphEvent::Updated(node.clone()),
            MatchKind::Group => {
                let group = subscription.key;
                match deltas.groups.get(&group) {
                    Some(GroupDelta::Added) => GraphEvent::GroupInserted { node: node.clone(), group },
                    Some(GroupDelta::Removed) => GraphEvent::GroupDeleted { node: node.clone(), group },
                    None => continue,
                }
            }
            MatchKind::Property => {
                let name = subscription.key;
                let Some(delta) = deltas.properties.get(&name) else {
                    continue;
                };
                match property_event(node, name, delta) {
                    Some(event) => event,
                    None => continue,
                }
            }
        };
        events.push(event);
    }
}

fn property_event(node: &AnyNode, name: String, delta: &PropertyDelta) -> Option<GraphEvent> {
    let node = node.clone();
    Some(match (&delta.old, &delta.new) {
        (None, Some(value)) => GraphEvent::PropertyInserted { node, name, value: value.clone() },
        (Some(_), Some(value)) => GraphEvent::PropertyUpdated { node, name, value: value.clone() },
        (Some(value), None) => GraphEvent::PropertyDeleted { node, name, value: value.clone() },
        (None, None) => return None,
    })
}

// A deleted node keeps its attributes, so its groups and properties are
// reported as deleted along with it.
fn deleted_events(watches: &WatchRegistry, node: &AnyNode, events: &mut Vec<GraphEvent>) {
    let (node_type, groups, properties): (String, Vec<String>, Vec<(String, Value)>) = {
        let state = node.cell().read();
        (
            state.node_type.clone(),
            state.attributes.groups().map(str::to_string).collect(),
            state
                .attributes
                .properties()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    };
    let matched = watches.matching(
        node.kind(),
        &node_type,
        groups.iter().map(String::as_str),
        properties.iter().map(|(k, _)| k.as_str()),
    );

    for subscription in matched {
        let event = match subscription.match_kind {
            MatchKind::Type => GraphEvent::Deleted(node.clone()),
            MatchKind::Group => GraphEvent::GroupDeleted {
                node: node.clone(),
                group: subscription.key,
            },
            MatchKind::Property => {
                let Some((_, value)) = properties.iter().find(|(k, _)| *k == subscription.key) else {
                    continue;
                };
                GraphEvent::PropertyDeleted {
                    node: node.clone(),
                    value: value.clone(),
                    name: subscription.key,
                }
            }
        };
        events.push(event);
    }
}
