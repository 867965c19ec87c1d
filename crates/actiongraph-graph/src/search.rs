use std::marker::PhantomData;

use actiongraph_core::{ObjectKind, Value};

use crate::index::IndexKey;
use crate::node::{AnyNode, GraphNode};

/// What to look up. The object kind comes from the node type searched for,
/// e.g. `graph.search::<Action>(Query::group("Holiday"))`.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Type(String),
    Group(String),
    /// Nodes having the property, whatever its value.
    Property(String),
    PropertyValue(String, Value),
}

impl Query {
    pub fn of_type(name: impl Into<String>) -> Self {
        Query::Type(name.into())
    }

    pub fn group(name: impl Into<String>) -> Self {
        Query::Group(name.into())
    }

    pub fn property(name: impl Into<String>) -> Self {
        Query::Property(name.into())
    }

    pub fn property_value(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::PropertyValue(name.into(), value.into())
    }

    pub(crate) fn key(&self, kind: ObjectKind) -> IndexKey {
        match self {
            Query::Type(name) => IndexKey::of_type(kind, name.as_str()),
            Query::Group(name) => IndexKey::group(kind, name.as_str()),
            Query::Property(name) => IndexKey::property(kind, name.as_str()),
            Query::PropertyValue(name, value) => {
                IndexKey::property_value(kind, name.as_str(), value.clone())
            }
        }
    }
}

/// Snapshot of a search, taken when the search ran. Later commits do not
/// change it; clone it to iterate again.
#[derive(Debug, Clone)]
pub struct SearchResults<N> {
    nodes: std::vec::IntoIter<AnyNode>,
    _kind: PhantomData<N>,
}

impl<N: GraphNode> SearchResults<N> {
    pub(crate) fn new(nodes: Vec<AnyNode>) -> Self {
        Self {
            nodes: nodes.into_iter(),
            _kind: PhantomData,
        }
    }
}

impl<N: GraphNode> Iterator for SearchResults<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        self.nodes.by_ref().find_map(N::from_any)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.nodes.len()))
    }
}
