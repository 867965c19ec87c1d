use std::fmt;
use std::sync::Arc;

use actiongraph_core::ObjectKind;
use tracing::warn;

use super::{push_unique, retain_others, write_endpoint, Entity, GraphNode, Links, NodeCell, Role};
use crate::session::Session;

/// A directed, typed edge from one subject entity to one object entity.
/// Either endpoint may be unset.
#[derive(Clone)]
pub struct Bond(pub(crate) Arc<NodeCell>);

impl GraphNode for Bond {
    const KIND: ObjectKind = ObjectKind::Bond;

    fn cell(&self) -> &Arc<NodeCell> {
        &self.0
    }

    fn from_cell(cell: Arc<NodeCell>) -> Self {
        Bond(cell)
    }
}

impl Bond {
    fn endpoint(&self, role: Role) -> Option<Entity> {
        match &self.0.read().links {
            Links::Bond(links) => match role {
                Role::Subject => links.subject.clone(),
                Role::Object => links.object.clone(),
            },
            _ => None,
        }
    }

    pub fn subject(&self) -> Option<Entity> {
        self.endpoint(Role::Subject)
    }

    pub fn object(&self) -> Option<Entity> {
        self.endpoint(Role::Object)
    }

    /// Replace the subject. The previous subject is only unlinked, never
    /// deleted. Returns `false` when nothing changed.
    pub fn set_subject(&self, entity: Option<&Entity>) -> bool {
        self.replace(entity, Role::Subject)
    }

    pub fn set_object(&self, entity: Option<&Entity>) -> bool {
        self.replace(entity, Role::Object)
    }

    fn replace(&self, entity: Option<&Entity>, role: Role) -> bool {
        let Some(session) = self.0.session() else {
            return false;
        };
        if let Some(entity) = entity {
            if !self.0.same_session(&entity.0) {
                warn!("cannot relate nodes from different graphs");
                return false;
            }
            if !entity.0.is_mutable() {
                return false;
            }
        }

        let previous = {
            let mut state = self.0.write();
            if !state.lifecycle.is_mutable() {
                return false;
            }
            let Links::Bond(links) = &mut state.links else {
                return false;
            };
            let slot = links.endpoint_mut(role);
            if slot.as_ref() == entity {
                return false;
            }
            std::mem::replace(slot, entity.cloned())
        };

        let target = entity.map(|e| e.0.record());
        if !write_endpoint(&session, &self.0, role.endpoint_field(), target) {
            if let Links::Bond(links) = &mut self.0.write().links {
                *links.endpoint_mut(role) = previous;
            }
            return false;
        }

        if let Some(previous) = previous {
            if let Links::Entity(links) = &mut previous.0.write().links {
                retain_others(links.bonds_mut(role), &self.0);
            }
        }
        if let Some(entity) = entity {
            if let Links::Entity(links) = &mut entity.0.write().links {
                push_unique(links.bonds_mut(role), &self.0);
            }
        }
        true
    }
}

/// Clear the endpoint pointing at a deleted entity.
pub(super) fn drop_endpoint(cell: &Arc<NodeCell>, entity: &Entity, role: Role, session: &Session) {
    let mutable = {
        let mut state = cell.write();
        let mutable = state.lifecycle.is_mutable();
        let Links::Bond(links) = &mut state.links else {
            return;
        };
        let slot = links.endpoint_mut(role);
        if slot.as_ref() != Some(entity) {
            return;
        }
        *slot = None;
        mutable
    };
    if mutable {
        write_endpoint(session, cell, role.endpoint_field(), None);
    }
}

pub(super) fn detach(cell: &Arc<NodeCell>) {
    let (subject, object) = match &cell.read().links {
        Links::Bond(links) => (links.subject.clone(), links.object.clone()),
        _ => return,
    };
    for (endpoint, role) in [(subject, Role::Subject), (object, Role::Object)] {
        if let Some(entity) = endpoint {
            if let Links::Entity(links) = &mut entity.0.write().links {
                retain_others(links.bonds_mut(role), cell);
            }
        }
    }
}

impl PartialEq for Bond {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Bond {}

impl fmt::Debug for Bond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.read();
        f.debug_struct("Bond")
            .field("type", &state.node_type)
            .field("id", &state.id)
            .field("lifecycle", &state.lifecycle)
            .finish()
    }
}
