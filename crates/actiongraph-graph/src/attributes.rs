//! Per-node property and group storage.
//!
//! An [`AttributeBag`] mirrors the property and group side-table records a
//! node owns in the [`RecordStore`]. Every effective mutation writes through
//! to the store and leaves a pending delta behind; the deltas are drained by
//! the commit notifier once the store has the transaction in hand.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use actiongraph_core::store::fields;
use actiongraph_core::{FieldValue, ObjectKind, RecordKind, RecordRef, RecordStore, Value};
use tracing::{trace, warn};

#[derive(Debug, Clone)]
struct PropertyEntry {
    record: RecordRef,
    value: Value,
}

/// Uncommitted change to one property. `old` is the value as of the last
/// commit, `new` the latest write; `None` means absent.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDelta {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl PropertyDelta {
    pub fn is_insert(&self) -> bool {
        self.old.is_none() && self.new.is_some()
    }

    pub fn is_delete(&self) -> bool {
        self.old.is_some() && self.new.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupDelta {
    Added,
    Removed,
}

impl GroupDelta {
    fn opposite(self) -> Self {
        match self {
            GroupDelta::Added => GroupDelta::Removed,
            GroupDelta::Removed => GroupDelta::Added,
        }
    }
}

/// Deltas drained from a bag for one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeDeltas {
    pub properties: BTreeMap<String, PropertyDelta>,
    pub groups: BTreeMap<String, GroupDelta>,
}

impl AttributeDeltas {
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.groups.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct AttributeBag {
    properties: BTreeMap<String, PropertyEntry>,
    groups: BTreeMap<String, RecordRef>,
    pending: AttributeDeltas,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).map(|e| &e.value)
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, e)| (k.as_str(), &e.value))
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Every side-table record owned by this bag.
    pub fn records(&self) -> Vec<RecordRef> {
        self.properties
            .values()
            .map(|e| e.record)
            .chain(self.groups.values().copied())
            .collect()
    }

    /// Assign `value` to `name`, or delete the entry when `value` is `None`.
    /// Returns `true` when the bag changed.
    pub fn set(
        &mut self,
        store: &dyn RecordStore,
        owner: RecordRef,
        kind: ObjectKind,
        name: &str,
        value: Option<Value>,
    ) -> bool {
        match value {
            Some(value) => self.assign(store, owner, kind, name, value),
            None => self.delete(store, name),
        }
    }

    fn assign(
        &mut self,
        store: &dyn RecordStore,
        owner: RecordRef,
        kind: ObjectKind,
        name: &str,
        value: Value,
    ) -> bool {
        if let Some(entry) = self.properties.get_mut(name) {
            if entry.value == value {
                return false;
            }
            if let Err(e) = store.set_field(entry.record, fields::VALUE, value.clone().into()) {
                warn!("property {} on {} not updated: {}", name, owner, e);
                return false;
            }
            let old = std::mem::replace(&mut entry.value, value.clone());
            self.record_property_delta(name, Some(old), Some(value));
            return true;
        }

        let record = store.create_record(RecordKind::Property(kind));
        let written = store
            .set_field(record, fields::NAME, Value::from(name).into())
            .and_then(|_| store.set_field(record, fields::VALUE, value.clone().into()))
            .and_then(|_| store.set_field(record, fields::OWNER, FieldValue::Ref(Some(owner))));
        if let Err(e) = written {
            warn!("property {} on {} not created: {}", name, owner, e);
            store.delete_record(record);
            return false;
        }
        trace!("property {} created as {} for {}", name, record, owner);
        self.properties.insert(
            name.to_string(),
            PropertyEntry {
                record,
                value: value.clone(),
            },
        );
        self.record_property_delta(name, None, Some(value));
        true
    }

    fn delete(&mut self, store: &dyn RecordStore, name: &str) -> bool {
        match self.properties.remove(name) {
            Some(entry) => {
                store.delete_record(entry.record);
                self.record_property_delta(name, Some(entry.value), None);
                true
            }
            None => false,
        }
    }

    /// Returns `false` if the bag already belongs to `name`.
    pub fn add_group(
        &mut self,
        store: &dyn RecordStore,
        owner: RecordRef,
        kind: ObjectKind,
        name: &str,
    ) -> bool {
        if self.groups.contains_key(name) {
            return false;
        }
        let record = store.create_record(RecordKind::Group(kind));
        let written = store
            .set_field(record, fields::NAME, Value::from(name).into())
            .and_then(|_| store.set_field(record, fields::OWNER, FieldValue::Ref(Some(owner))));
        if let Err(e) = written {
            warn!("group {} on {} not created: {}", name, owner, e);
            store.delete_record(record);
            return false;
        }
        self.groups.insert(name.to_string(), record);
        self.record_group_delta(name, GroupDelta::Added);
        true
    }

    /// Returns `false` if the bag does not belong to `name`.
    pub fn remove_group(&mut self, store: &dyn RecordStore, name: &str) -> bool {
        match self.groups.remove(name) {
            Some(record) => {
                store.delete_record(record);
                self.record_group_delta(name, GroupDelta::Removed);
                true
            }
            None => false,
        }
    }

    // Last writer wins: the first delta of a transaction fixes `old`, later
    // writes only move `new`. A write that restores `old` cancels the delta.
    fn record_property_delta(&mut self, name: &str, old: Option<Value>, new: Option<Value>) {
        match self.pending.properties.entry(name.to_string()) {
            Entry::Occupied(mut e) => {
                e.get_mut().new = new;
                if e.get().old == e.get().new {
                    e.remove();
                }
            }
            Entry::Vacant(e) => {
                e.insert(PropertyDelta { old, new });
            }
        }
    }

    fn record_group_delta(&mut self, name: &str, delta: GroupDelta) {
        match self.pending.groups.entry(name.to_string()) {
            Entry::Occupied(e) if *e.get() == delta.opposite() => {
                e.remove();
            }
            Entry::Occupied(mut e) => {
                e.insert(delta);
            }
            Entry::Vacant(e) => {
                e.insert(delta);
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> &AttributeDeltas {
        &self.pending
    }

    pub fn take_pending(&mut self) -> AttributeDeltas {
        std::mem::take(&mut self.pending)
    }

    /// Put back deltas taken for a commit that failed. Deltas recorded since
    /// then are newer and win.
    pub fn restore_pending(&mut self, older: AttributeDeltas) {
        for (name, delta) in older.properties {
            match self.pending.properties.entry(name) {
                Entry::Occupied(mut e) => {
                    e.get_mut().old = delta.old;
                    if e.get().old == e.get().new {
                        e.remove();
                    }
                }
                Entry::Vacant(e) => {
                    e.insert(delta);
                }
            }
        }
        for (name, delta) in older.groups {
            match self.pending.groups.entry(name) {
                Entry::Occupied(e) => {
                    if *e.get() == delta.opposite() {
                        e.remove();
                    }
                }
                Entry::Vacant(e) => {
                    e.insert(delta);
                }
            }
        }
    }
}
