use std::fmt;
use std::sync::Arc;

use actiongraph_core::ObjectKind;
use tracing::warn;

use super::{push_unique, retain_others, write_links, Entity, GraphNode, Links, NodeCell, Role};
use crate::session::Session;

/// A hyper-relation from a set of subject entities to a set of object
/// entities. Both sets keep insertion order and hold each entity once.
#[derive(Clone)]
pub struct Action(pub(crate) Arc<NodeCell>);

impl GraphNode for Action {
    const KIND: ObjectKind = ObjectKind::Action;

    fn cell(&self) -> &Arc<NodeCell> {
        &self.0
    }

    fn from_cell(cell: Arc<NodeCell>) -> Self {
        Action(cell)
    }
}

impl Action {
    fn members(&self, role: Role) -> Vec<Entity> {
        match &self.0.read().links {
            Links::Action(links) => links.list(role).clone(),
            _ => Vec::new(),
        }
    }

    pub fn subjects(&self) -> Vec<Entity> {
        self.members(Role::Subject)
    }

    pub fn objects(&self) -> Vec<Entity> {
        self.members(Role::Object)
    }

    pub fn has_subject(&self, entity: &Entity) -> bool {
        self.members(Role::Subject).contains(entity)
    }

    pub fn has_object(&self, entity: &Entity) -> bool {
        self.members(Role::Object).contains(entity)
    }

    /// Returns `false` if `entity` is already a subject.
    pub fn add_subject(&self, entity: &Entity) -> bool {
        self.link(entity, Role::Subject)
    }

    pub fn add_object(&self, entity: &Entity) -> bool {
        self.link(entity, Role::Object)
    }

    /// Returns `false` if `entity` is not a subject.
    pub fn remove_subject(&self, entity: &Entity) -> bool {
        self.unlink(entity, Role::Subject)
    }

    pub fn remove_object(&self, entity: &Entity) -> bool {
        self.unlink(entity, Role::Object)
    }

    fn link(&self, entity: &Entity, role: Role) -> bool {
        let Some(session) = self.0.session() else {
            return false;
        };
        if !self.0.same_session(&entity.0) {
            warn!("cannot relate nodes from different graphs");
            return false;
        }
        if !entity.0.is_mutable() {
            return false;
        }

        let refs = {
            let mut state = self.0.write();
            if !state.lifecycle.is_mutable() {
                return false;
            }
            let Links::Action(links) = &mut state.links else {
                return false;
            };
            let list = links.list_mut(role);
            if list.contains(entity) {
                return false;
            }
            list.push(entity.clone());
            list.iter().map(|e| e.0.record()).collect::<Vec<_>>()
        };

        if !write_links(&session, &self.0, role.set_field(), refs) {
            if let Links::Action(links) = &mut self.0.write().links {
                links.list_mut(role).retain(|e| e != entity);
            }
            return false;
        }

        if let Links::Entity(links) = &mut entity.0.write().links {
            push_unique(links.actions_mut(role), &self.0);
        }
        true
    }

    fn unlink(&self, entity: &Entity, role: Role) -> bool {
        let Some(session) = self.0.session() else {
            return false;
        };
        if !self.0.is_mutable() {
            return false;
        }
        if !drop_entity(&self.0, entity, role, &session) {
            return false;
        }
        if let Links::Entity(links) = &mut entity.0.write().links {
            retain_others(links.actions_mut(role), &self.0);
        }
        true
    }
}

/// Remove `entity` from one role set of `cell`, writing the new set through
/// unless the action itself is being deleted.
pub(super) fn drop_entity(cell: &Arc<NodeCell>, entity: &Entity, role: Role, session: &Session) -> bool {
    let refs = {
        let mut state = cell.write();
        let mutable = state.lifecycle.is_mutable();
        let Links::Action(links) = &mut state.links else {
            return false;
        };
        let list = links.list_mut(role);
        let before = list.len();
        list.retain(|e| e != entity);
        if list.len() == before {
            return false;
        }
        if !mutable {
            return true;
        }
        list.iter().map(|e| e.0.record()).collect::<Vec<_>>()
    };
    write_links(session, cell, role.set_field(), refs);
    true
}

/// Forget back-references held by the action's entities. The action keeps
/// its own member lists for inspection after deletion.
pub(super) fn detach(cell: &Arc<NodeCell>) {
    let (subjects, objects) = match &cell.read().links {
        Links::Action(links) => (links.subjects.clone(), links.objects.clone()),
        _ => return,
    };
    for (members, role) in [(subjects, Role::Subject), (objects, Role::Object)] {
        for entity in members {
            if let Links::Entity(links) = &mut entity.0.write().links {
                retain_others(links.actions_mut(role), cell);
            }
        }
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Action {}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.read();
        let (subjects, objects) = match &state.links {
            Links::Action(links) => (links.subjects.len(), links.objects.len()),
            _ => (0, 0),
        };
        f.debug_struct("Action")
            .field("type", &state.node_type)
            .field("id", &state.id)
            .field("lifecycle", &state.lifecycle)
            .field("subjects", &subjects)
            .field("objects", &objects)
            .finish()
    }
}
