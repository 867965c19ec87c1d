//! Committed change events and the delegate that receives them.

use actiongraph_core::{ObjectKind, Value};

use crate::graph::Graph;
use crate::node::{Action, AnyNode, Bond, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One matched change of a committed batch. Property events carry the new
/// value, or the last value for deletions.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    Inserted(AnyNode),
    Updated(AnyNode),
    Deleted(AnyNode),
    GroupInserted { node: AnyNode, group: String },
    GroupDeleted { node: AnyNode, group: String },
    PropertyInserted { node: AnyNode, name: String, value: Value },
    PropertyUpdated { node: AnyNode, name: String, value: Value },
    PropertyDeleted { node: AnyNode, name: String, value: Value },
}

impl GraphEvent {
    pub fn node(&self) -> &AnyNode {
        match self {
            GraphEvent::Inserted(node) | GraphEvent::Updated(node) | GraphEvent::Deleted(node) => {
                node
            }
            GraphEvent::GroupInserted { node, .. }
            | GraphEvent::GroupDeleted { node, .. }
            | GraphEvent::PropertyInserted { node, .. }
            | GraphEvent::PropertyUpdated { node, .. }
            | GraphEvent::PropertyDeleted { node, .. } => node,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.node().kind()
    }

    pub fn change(&self) -> ChangeKind {
        match self {
            GraphEvent::Inserted(_)
            | GraphEvent::GroupInserted { .. }
            | GraphEvent::PropertyInserted { .. } => ChangeKind::Insert,
            GraphEvent::Updated(_) | GraphEvent::PropertyUpdated { .. } => ChangeKind::Update,
            GraphEvent::Deleted(_)
            | GraphEvent::GroupDeleted { .. }
            | GraphEvent::PropertyDeleted { .. } => ChangeKind::Delete,
        }
    }

    /// Group or property name the event is about, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            GraphEvent::GroupInserted { group, .. } | GraphEvent::GroupDeleted { group, .. } => {
                Some(group)
            }
            GraphEvent::PropertyInserted { name, .. }
            | GraphEvent::PropertyUpdated { name, .. }
            | GraphEvent::PropertyDeleted { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            GraphEvent::PropertyInserted { value, .. }
            | GraphEvent::PropertyUpdated { value, .. }
            | GraphEvent::PropertyDeleted { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Invoke the delegate method matching this event.
    pub fn dispatch(&self, graph: &Graph, delegate: &dyn GraphDelegate) {
        use AnyNode as N;
        use GraphEvent as E;

        match self {
            E::Inserted(N::Entity(e)) => delegate.did_insert_entity(graph, e),
            E::Inserted(N::Action(a)) => delegate.did_insert_action(graph, a),
            E::Inserted(N::Bond(b)) => delegate.did_insert_bond(graph, b),
            E::Updated(N::Entity(e)) => delegate.did_update_entity(graph, e),
            E::Updated(N::Action(a)) => delegate.did_update_action(graph, a),
            E::Updated(N::Bond(b)) => delegate.did_update_bond(graph, b),
            E::Deleted(N::Entity(e)) => delegate.did_delete_entity(graph, e),
            E::Deleted(N::Action(a)) => delegate.did_delete_action(graph, a),
            E::Deleted(N::Bond(b)) => delegate.did_delete_bond(graph, b),

            E::GroupInserted { node, group } => match node {
                N::Entity(e) => delegate.did_insert_entity_group(graph, e, group),
                N::Action(a) => delegate.did_insert_action_group(graph, a, group),
                N::Bond(b) => delegate.did_insert_bond_group(graph, b, group),
            },
            E::GroupDeleted { node, group } => match node {
                N::Entity(e) => delegate.did_delete_entity_group(graph, e, group),
                N::Action(a) => delegate.did_delete_action_group(graph, a, group),
                N::Bond(b) => delegate.did_delete_bond_group(graph, b, group),
            },

            E::PropertyInserted { node, name, value } => match node {
                N::Entity(e) => delegate.did_insert_entity_property(graph, e, name, value),
                N::Action(a) => delegate.did_insert_action_property(graph, a, name, value),
                N::Bond(b) => delegate.did_insert_bond_property(graph, b, name, value),
            },
            E::PropertyUpdated { node, name, value } => match node {
                N::Entity(e) => delegate.did_update_entity_property(graph, e, name, value),
                N::Action(a) => delegate.did_update_action_property(graph, a, name, value),
                N::Bond(b) => delegate.did_update_bond_property(graph, b, name, value),
            },
            E::PropertyDeleted { node, name, value } => match node {
                N::Entity(e) => delegate.did_delete_entity_property(graph, e, name, value),
                N::Action(a) => delegate.did_delete_action_property(graph, a, name, value),
                N::Bond(b) => delegate.did_delete_bond_property(graph, b, name, value),
            },
        }
    }
}

/// Receiver of committed changes matched by the graph's watches.
///
/// Every method defaults to doing nothing; implement the ones you watch for.
/// Callbacks of one batch arrive on the commit task spawned by `save`,
/// inserts before updates before deletes, and never interleave with another
/// batch.
#[allow(unused_variables)]
pub trait GraphDelegate: Send + Sync {
    fn did_insert_entity(&self, graph: &Graph, entity: &Entity) {}
    fn did_update_entity(&self, graph: &Graph, entity: &Entity) {}
    fn did_delete_entity(&self, graph: &Graph, entity: &Entity) {}
    fn did_insert_entity_group(&self, graph: &Graph, entity: &Entity, group: &str) {}
    fn did_delete_entity_group(&self, graph: &Graph, entity: &Entity, group: &str) {}
    fn did_insert_entity_property(&self, graph: &Graph, entity: &Entity, name: &str, value: &Value) {}
    fn did_update_entity_property(&self, graph: &Graph, entity: &Entity, name: &str, value: &Value) {}
    fn did_delete_entity_property(&self, graph: &Graph, entity: &Entity, name: &str, value: &Value) {}

    fn did_insert_action(&self, graph: &Graph, action: &Action) {}
    fn did_update_action(&self, graph: &Graph, action: &Action) {}
    fn did_delete_action(&self, graph: &Graph, action: &Action) {}
    fn did_insert_action_group(&self, graph: &Graph, action: &Action, group: &str) {}
    fn did_delete_action_group(&self, graph: &Graph, action: &Action, group: &str) {}
    fn did_insert_action_property(&self, graph: &Graph, action: &Action, name: &str, value: &Value) {}
    fn did_update_action_property(&self, graph: &Graph, action: &Action, name: &str, value: &Value) {}
    fn did_delete_action_property(&self, graph: &Graph, action: &Action, name: &str, value: &Value) {}

    fn did_insert_bond(&self, graph: &Graph, bond: &Bond) {}
    fn did_update_bond(&self, graph: &Graph, bond: &Bond) {}
    fn did_delete_bond(&self, graph: &Graph, bond: &Bond) {}
    fn did_insert_bond_group(&self, graph: &Graph, bond: &Bond, group: &str) {}
    fn did_delete_bond_group(&self, graph: &Graph, bond: &Bond, group: &str) {}
    fn did_insert_bond_property(&self, graph: &Graph, bond: &Bond, name: &str, value: &Value) {}
    fn did_update_bond_property(&self, graph: &Graph, bond: &Bond, name: &str, value: &Value) {}
    fn did_delete_bond_property(&self, graph: &Graph, bond: &Bond, name: &str, value: &Value) {}
}
