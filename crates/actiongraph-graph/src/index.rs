//! Multi-valued search index.
//!
//! Maps a search key to the nodes that currently match it. Keys of one
//! property are adjacent in key order and sorted by value, which is what
//! makes [`MultiIndex::range`] a single ordered scan. Within a key, nodes are
//! returned in the order they were indexed.

use std::collections::{BTreeMap, HashMap};
use std::ops::{Bound, RangeBounds};

use actiongraph_core::{ObjectKind, Value};
use tracing::trace;

use crate::node::{AnyNode, NodeKey};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Type { kind: ObjectKind, name: String },
    Group { kind: ObjectKind, name: String },
    /// Presence of a property, whatever its value.
    Property { kind: ObjectKind, name: String },
    PropertyValue { kind: ObjectKind, name: String, value: Value },
}

impl IndexKey {
    pub fn of_type(kind: ObjectKind, name: impl Into<String>) -> Self {
        IndexKey::Type { kind, name: name.into() }
    }

    pub fn group(kind: ObjectKind, name: impl Into<String>) -> Self {
        IndexKey::Group { kind, name: name.into() }
    }

    pub fn property(kind: ObjectKind, name: impl Into<String>) -> Self {
        IndexKey::Property { kind, name: name.into() }
    }

    pub fn property_value(kind: ObjectKind, name: impl Into<String>, value: impl Into<Value>) -> Self {
        IndexKey::PropertyValue {
            kind,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            IndexKey::Type { kind, .. }
            | IndexKey::Group { kind, .. }
            | IndexKey::Property { kind, .. }
            | IndexKey::PropertyValue { kind, .. } => *kind,
        }
    }

    fn value_of(&self, kind: ObjectKind, name: &str) -> Option<&Value> {
        match self {
            IndexKey::PropertyValue { kind: k, name: n, value } if *k == kind && n == name => {
                Some(value)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MultiIndex {
    entries: BTreeMap<IndexKey, BTreeMap<u64, AnyNode>>,
    /// Reverse map: every key a node is filed under, with its sequence.
    postings: HashMap<NodeKey, BTreeMap<IndexKey, u64>>,
    next_seq: u64,
}

impl MultiIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `node` under `key`. Returns `false` if it already was.
    pub fn index(&mut self, node: &AnyNode, key: IndexKey) -> bool {
        let postings = self.postings.entry(node.key()).or_default();
        if postings.contains_key(&key) {
            return false;
        }
        self.next_seq += 1;
        let seq = self.next_seq;
        trace!("index {:?} under {:?}", node.key(), key);
        postings.insert(key.clone(), seq);
        self.entries.entry(key).or_default().insert(seq, node.clone());
        true
    }

    /// Remove `node` from `key`. Absent pairings are a no-op.
    pub fn deindex(&mut self, node: NodeKey, key: &IndexKey) -> bool {
        let Some(postings) = self.postings.get_mut(&node) else {
            return false;
        };
        let Some(seq) = postings.remove(key) else {
            return false;
        };
        if postings.is_empty() {
            self.postings.remove(&node);
        }
        self.remove_entry(key, seq);
        trace!("deindex {:?} from {:?}", node, key);
        true
    }

    /// Remove `node` from every key. Returns the number of keys it left.
    pub fn deindex_node(&mut self, node: NodeKey) -> usize {
        let Some(postings) = self.postings.remove(&node) else {
            return 0;
        };
        let count = postings.len();
        for (key, seq) in postings {
            self.remove_entry(&key, seq);
        }
        count
    }

    fn remove_entry(&mut self, key: &IndexKey, seq: u64) {
        if let Some(nodes) = self.entries.get_mut(key) {
            nodes.remove(&seq);
            if nodes.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Snapshot of the nodes filed under `key`, in indexing order. Unknown
    /// keys yield an empty vector.
    pub fn lookup(&self, key: &IndexKey) -> Vec<AnyNode> {
        self.entries
            .get(key)
            .map(|nodes| nodes.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &IndexKey, node: NodeKey) -> bool {
        self.postings
            .get(&node)
            .map_or(false, |postings| postings.contains_key(key))
    }

    pub fn count(&self, key: &IndexKey) -> usize {
        self.entries.get(key).map_or(0, BTreeMap::len)
    }

    /// Nodes of `kind` whose property `name` lies within `bounds`, ordered by
    /// value and then by indexing order.
    pub fn range<R>(&self, kind: ObjectKind, name: &str, bounds: R) -> Vec<AnyNode>
    where
        R: RangeBounds<Value>,
    {
        let to_key = |value: &Value| IndexKey::property_value(kind, name, value.clone());
        let start = match bounds.start_bound() {
            Bound::Included(v) => Bound::Included(to_key(v)),
            Bound::Excluded(v) => Bound::Excluded(to_key(v)),
            Bound::Unbounded => Bound::Unbounded,
        };

        self.entries
            .range((start, Bound::Unbounded))
            .skip_while(|(key, _)| key.value_of(kind, name).is_none())
            .map_while(|(key, nodes)| key.value_of(kind, name).map(|value| (value, nodes)))
            .take_while(|(value, _)| match bounds.end_bound() {
                Bound::Included(end) => *value <= end,
                Bound::Excluded(end) => *value < end,
                Bound::Unbounded => true,
            })
            .flat_map(|(_, nodes)| nodes.values().cloned())
            .collect()
    }

    /// Every key `node` is filed under.
    pub fn keys_for(&self, node: NodeKey) -> Vec<IndexKey> {
        self.postings
            .get(&node)
            .map(|postings| postings.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct keys with at least one node.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
