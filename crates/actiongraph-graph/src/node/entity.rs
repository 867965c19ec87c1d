use std::fmt;
use std::sync::Arc;

use actiongraph_core::ObjectKind;

use super::{action, bond, upgrade_all, Action, Bond, GraphNode, Links, NodeCell, Role};
use crate::session::Session;

/// A standalone graph node. Entities take part in Actions and Bonds but are
/// never owned by them.
#[derive(Clone)]
pub struct Entity(pub(crate) Arc<NodeCell>);

impl GraphNode for Entity {
    const KIND: ObjectKind = ObjectKind::Entity;

    fn cell(&self) -> &Arc<NodeCell> {
        &self.0
    }

    fn from_cell(cell: Arc<NodeCell>) -> Self {
        Entity(cell)
    }
}

impl Entity {
    fn related<T, F>(&self, pick: F, wrap: fn(Arc<NodeCell>) -> T) -> Vec<T>
    where
        F: Fn(&super::EntityLinks) -> &Vec<std::sync::Weak<NodeCell>>,
    {
        let state = self.0.read();
        match &state.links {
            Links::Entity(links) => upgrade_all(pick(links), wrap),
            _ => Vec::new(),
        }
    }

    /// Actions listing this entity among their subjects.
    pub fn actions_when_subject(&self) -> Vec<Action> {
        self.related(|l| &l.actions_as_subject, Action)
    }

    /// Actions listing this entity among their objects.
    pub fn actions_when_object(&self) -> Vec<Action> {
        self.related(|l| &l.actions_as_object, Action)
    }

    pub fn bonds_when_subject(&self) -> Vec<Bond> {
        self.related(|l| &l.bonds_as_subject, Bond)
    }

    pub fn bonds_when_object(&self) -> Vec<Bond> {
        self.related(|l| &l.bonds_as_object, Bond)
    }
}

/// Drop a deleted entity from every relation that references it. The
/// relations themselves survive with one endpoint fewer.
pub(super) fn detach(cell: &Arc<NodeCell>, session: &Session) {
    let links = {
        let mut state = cell.write();
        match &mut state.links {
            Links::Entity(links) => std::mem::take(links),
            _ => return,
        }
    };
    let entity = Entity(cell.clone());

    for (cells, role) in [
        (&links.actions_as_subject, Role::Subject),
        (&links.actions_as_object, Role::Object),
    ] {
        for action in cells.iter().filter_map(std::sync::Weak::upgrade) {
            action::drop_entity(&action, &entity, role, session);
        }
    }
    for (cells, role) in [
        (&links.bonds_as_subject, Role::Subject),
        (&links.bonds_as_object, Role::Object),
    ] {
        for bond in cells.iter().filter_map(std::sync::Weak::upgrade) {
            bond::drop_endpoint(&bond, &entity, role, session);
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.read();
        f.debug_struct("Entity")
            .field("type", &state.node_type)
            .field("id", &state.id)
            .field("lifecycle", &state.lifecycle)
            .finish()
    }
}
