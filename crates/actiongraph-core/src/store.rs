//! Persistence collaborator contract.
//!
//! The graph layer never persists anything itself. It creates, links and
//! deletes records through a [`RecordStore`], then asks the store to commit
//! the pending transaction. The store answers with a [`ChangeSet`] that lists
//! every inserted, updated and deleted record of that transaction; the commit
//! notifier turns those raw sets into typed graph events.

use crate::{NodeId, ObjectKind, Result, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Store-local handle to a record. Valid from creation, before the record has
/// a permanent [`NodeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordRef(pub u64);

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Declared record kinds: one node record kind per object kind, plus the
/// property and group side tables owned by each node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Node(ObjectKind),
    Property(ObjectKind),
    Group(ObjectKind),
}

impl RecordKind {
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            RecordKind::Node(k) | RecordKind::Property(k) | RecordKind::Group(k) => *k,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, RecordKind::Node(_))
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Node(k) => write!(f, "{}", k),
            RecordKind::Property(k) => write!(f, "{}_property", k),
            RecordKind::Group(k) => write!(f, "{}_group", k),
        }
    }
}

/// Field names shared between the graph layer and store implementations.
pub mod fields {
    pub const TYPE: &str = "type";
    pub const CREATED_AT: &str = "created_at";
    pub const NAME: &str = "name";
    pub const VALUE: &str = "value";
    pub const OWNER: &str = "node";
    pub const SUBJECTS: &str = "subjects";
    pub const OBJECTS: &str = "objects";
    pub const SUBJECT: &str = "subject";
    pub const OBJECT: &str = "object";
}

/// Value of a record field: a scalar, a to-one link or a to-many link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Scalar(Value),
    Ref(Option<RecordRef>),
    RefSet(Vec<RecordRef>),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<RecordRef> {
        match self {
            FieldValue::Ref(r) => *r,
            _ => None,
        }
    }

    pub fn as_links(&self) -> &[RecordRef] {
        match self {
            FieldValue::RefSet(refs) => refs,
            _ => &[],
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Scalar(v)
    }
}

/// Snapshot of a record as seen at commit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedRecord {
    pub record: RecordRef,
    pub kind: RecordKind,
    pub id: NodeId,
    pub fields: BTreeMap<String, FieldValue>,
    /// Names of fields written in this transaction. Empty for deletions.
    pub changed: Vec<String>,
}

impl ChangedRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn owner(&self) -> Option<RecordRef> {
        self.field(crate::store::fields::OWNER).and_then(FieldValue::as_link)
    }
}

/// Per-transaction record sets returned by a successful commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub inserted: Vec<ChangedRecord>,
    pub updated: Vec<ChangedRecord>,
    pub deleted: Vec<ChangedRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Stage a new record of `kind` for insertion.
    fn create_record(&self, kind: RecordKind) -> RecordRef;

    /// Stage `record` for deletion. Deleting a record that was created in the
    /// pending transaction discards it; deleting an unknown record is a no-op
    /// returning `false`.
    fn delete_record(&self, record: RecordRef) -> bool;

    fn set_field(&self, record: RecordRef, name: &str, value: FieldValue) -> Result<()>;

    /// Whether `record` has been durably committed at least once.
    fn is_committed(&self, record: RecordRef) -> bool;

    fn has_pending(&self) -> bool;

    /// Durably apply the pending transaction. On failure the pending
    /// transaction is left untouched.
    async fn commit(&self) -> Result<ChangeSet>;
}
