//! Node model: Entities, Actions and Bonds.
//!
//! The three kinds are thin handles around a shared [`NodeCell`]. Cloning a
//! handle clones the reference, not the node. Every kind carries the same
//! property and group capability through [`GraphNode`]; relation state lives
//! in kind-specific [`Links`].

mod action;
mod bond;
mod entity;

pub use action::Action;
pub use bond::Bond;
pub use entity::Entity;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use actiongraph_core::store::fields;
use actiongraph_core::{
    FieldValue, NodeId, ObjectKind, RecordKind, RecordRef, RecordStore, Timestamp, Value,
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::attributes::AttributeBag;
use crate::session::Session;

static NEXT_NODE_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an in-memory node, valid before commit and
/// across graphs sharing one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey(u64);

impl NodeKey {
    fn next() -> Self {
        NodeKey(NEXT_NODE_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created in memory, not yet committed.
    Staged,
    Committed,
    /// Deletion staged for the next commit.
    Deleting,
    Deleted,
}

impl Lifecycle {
    pub fn is_mutable(&self) -> bool {
        matches!(self, Lifecycle::Staged | Lifecycle::Committed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Subject,
    Object,
}

impl Role {
    fn set_field(self) -> &'static str {
        match self {
            Role::Subject => fields::SUBJECTS,
            Role::Object => fields::OBJECTS,
        }
    }

    fn endpoint_field(self) -> &'static str {
        match self {
            Role::Subject => fields::SUBJECT,
            Role::Object => fields::OBJECT,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct EntityLinks {
    pub(crate) actions_as_subject: Vec<Weak<NodeCell>>,
    pub(crate) actions_as_object: Vec<Weak<NodeCell>>,
    pub(crate) bonds_as_subject: Vec<Weak<NodeCell>>,
    pub(crate) bonds_as_object: Vec<Weak<NodeCell>>,
}

impl EntityLinks {
    fn actions_mut(&mut self, role: Role) -> &mut Vec<Weak<NodeCell>> {
        match role {
            Role::Subject => &mut self.actions_as_subject,
            Role::Object => &mut self.actions_as_object,
        }
    }

    fn bonds_mut(&mut self, role: Role) -> &mut Vec<Weak<NodeCell>> {
        match role {
            Role::Subject => &mut self.bonds_as_subject,
            Role::Object => &mut self.bonds_as_object,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ActionLinks {
    pub(crate) subjects: Vec<Entity>,
    pub(crate) objects: Vec<Entity>,
}

impl ActionLinks {
    fn list(&self, role: Role) -> &Vec<Entity> {
        match role {
            Role::Subject => &self.subjects,
            Role::Object => &self.objects,
        }
    }

    fn list_mut(&mut self, role: Role) -> &mut Vec<Entity> {
        match role {
            Role::Subject => &mut self.subjects,
            Role::Object => &mut self.objects,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct BondLinks {
    pub(crate) subject: Option<Entity>,
    pub(crate) object: Option<Entity>,
}

impl BondLinks {
    fn endpoint_mut(&mut self, role: Role) -> &mut Option<Entity> {
        match role {
            Role::Subject => &mut self.subject,
            Role::Object => &mut self.object,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Links {
    Entity(EntityLinks),
    Action(ActionLinks),
    Bond(BondLinks),
}

impl Links {
    fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Entity => Links::Entity(EntityLinks::default()),
            ObjectKind::Action => Links::Action(ActionLinks::default()),
            ObjectKind::Bond => Links::Bond(BondLinks::default()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct NodeState {
    pub(crate) id: Option<NodeId>,
    pub(crate) node_type: String,
    pub(crate) created_at: Timestamp,
    pub(crate) attributes: AttributeBag,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) links: Links,
}

/// Shared state behind every node handle.
pub struct NodeCell {
    key: NodeKey,
    kind: ObjectKind,
    record: RecordRef,
    session: Weak<Session>,
    state: RwLock<NodeState>,
}

impl NodeCell {
    /// Create the node record in the session's store and stage it.
    pub(crate) fn create(session: &Arc<Session>, kind: ObjectKind, node_type: &str) -> Arc<Self> {
        let store = session.store();
        let created_at = chrono::Utc::now();
        let record = store.create_record(RecordKind::Node(kind));
        let written = store
            .set_field(record, fields::TYPE, Value::from(node_type).into())
            .and_then(|_| store.set_field(record, fields::CREATED_AT, Value::from(created_at).into()));
        if let Err(e) = written {
            warn!("{} record {} created without header fields: {}", kind, record, e);
        }

        let cell = Arc::new(Self {
            key: NodeKey::next(),
            kind,
            record,
            session: Arc::downgrade(session),
            state: RwLock::new(NodeState {
                id: None,
                node_type: node_type.to_string(),
                created_at,
                attributes: AttributeBag::new(),
                lifecycle: Lifecycle::Staged,
                links: Links::for_kind(kind),
            }),
        });
        session.touch(&cell);
        cell
    }

    /// A cell bound to no session; every mutation on it is a no-op.
    #[cfg(test)]
    pub(crate) fn detached(kind: ObjectKind, node_type: &str) -> Arc<Self> {
        Arc::new(Self {
            key: NodeKey::next(),
            kind,
            record: RecordRef(0),
            session: Weak::new(),
            state: RwLock::new(NodeState {
                id: None,
                node_type: node_type.to_string(),
                created_at: chrono::Utc::now(),
                attributes: AttributeBag::new(),
                lifecycle: Lifecycle::Staged,
                links: Links::for_kind(kind),
            }),
        })
    }

    pub(crate) fn key(&self) -> NodeKey {
        self.key
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub(crate) fn record(&self) -> RecordRef {
        self.record
    }

    pub(crate) fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    pub(crate) fn same_session(&self, other: &NodeCell) -> bool {
        Weak::ptr_eq(&self.session, &other.session)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, NodeState> {
        self.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, NodeState> {
        self.state.write()
    }

    fn is_mutable(&self) -> bool {
        self.read().lifecycle.is_mutable()
    }

    /// Run an attribute mutation against the bag and the store, staging the
    /// node when anything changed.
    fn mutate_attributes<F>(self: &Arc<Self>, f: F) -> bool
    where
        F: FnOnce(&mut AttributeBag, &dyn RecordStore, RecordRef, ObjectKind) -> bool,
    {
        let Some(session) = self.session() else {
            return false;
        };
        let changed = {
            let mut state = self.write();
            if !state.lifecycle.is_mutable() {
                debug!("ignoring mutation of deleted {} {}", self.kind, self.record);
                return false;
            }
            f(&mut state.attributes, session.store(), self.record, self.kind)
        };
        if changed {
            session.touch(self);
        }
        changed
    }

    /// Stage deletion of the node and its property and group records.
    fn delete(self: &Arc<Self>) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        let store = session.store();
        {
            let mut state = self.write();
            if state.lifecycle != Lifecycle::Committed || !store.is_committed(self.record) {
                debug!(
                    "ignoring delete of uncommitted {} {}",
                    self.kind, self.record
                );
                return false;
            }
            for record in state.attributes.records() {
                store.delete_record(record);
            }
            store.delete_record(self.record);
            state.lifecycle = Lifecycle::Deleting;
        }

        match self.kind {
            ObjectKind::Entity => entity::detach(self, &session),
            ObjectKind::Action => action::detach(self),
            ObjectKind::Bond => bond::detach(self),
        }
        session.touch(self);
        debug!("{} {} staged for deletion", self.kind, self.record);
        true
    }
}

impl fmt::Debug for NodeCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("NodeCell")
            .field("kind", &self.kind)
            .field("type", &state.node_type)
            .field("id", &state.id)
            .field("record", &self.record)
            .field("lifecycle", &state.lifecycle)
            .finish()
    }
}

/// Capability shared by Entity, Action and Bond: identity, dynamic
/// properties, group membership and deletion.
///
/// Mutations never fail loudly. They return `false` (or `None`) when they
/// had no effect, e.g. on a deleted node or a duplicate group.
pub trait GraphNode: Clone + fmt::Debug + Send + Sync + Sized + 'static {
    const KIND: ObjectKind;

    #[doc(hidden)]
    fn cell(&self) -> &Arc<NodeCell>;

    #[doc(hidden)]
    fn from_cell(cell: Arc<NodeCell>) -> Self;

    fn from_any(node: AnyNode) -> Option<Self> {
        let cell = node.into_cell();
        (cell.kind() == Self::KIND).then(|| Self::from_cell(cell))
    }

    fn to_any(&self) -> AnyNode {
        AnyNode::from_cell(self.cell().clone())
    }

    fn key(&self) -> NodeKey {
        self.cell().key()
    }

    /// Permanent id, assigned by the first successful commit.
    fn id(&self) -> Option<NodeId> {
        self.cell().read().id
    }

    fn node_type(&self) -> String {
        self.cell().read().node_type.clone()
    }

    fn created_at(&self) -> Timestamp {
        self.cell().read().created_at
    }

    fn lifecycle(&self) -> Lifecycle {
        self.cell().read().lifecycle
    }

    fn is_committed(&self) -> bool {
        self.lifecycle() == Lifecycle::Committed
    }

    fn is_deleted(&self) -> bool {
        matches!(self.lifecycle(), Lifecycle::Deleting | Lifecycle::Deleted)
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.cell().read().attributes.get(name).cloned()
    }

    fn has(&self, name: &str) -> bool {
        self.cell().read().attributes.has(name)
    }

    fn properties(&self) -> Vec<(String, Value)> {
        self.cell()
            .read()
            .attributes
            .properties()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn set(&self, name: &str, value: impl Into<Value>) -> bool {
        self.set_property(name, Some(value.into()))
    }

    /// Assign `value` to `name`; `None` deletes the property.
    fn set_property(&self, name: &str, value: Option<Value>) -> bool {
        self.cell()
            .mutate_attributes(|bag, store, owner, kind| bag.set(store, owner, kind, name, value))
    }

    fn remove_property(&self, name: &str) -> bool {
        self.set_property(name, None)
    }

    fn add_group(&self, name: &str) -> bool {
        self.cell()
            .mutate_attributes(|bag, store, owner, kind| bag.add_group(store, owner, kind, name))
    }

    fn has_group(&self, name: &str) -> bool {
        self.cell().read().attributes.has_group(name)
    }

    fn remove_group(&self, name: &str) -> bool {
        self.cell()
            .mutate_attributes(|bag, store, _, _| bag.remove_group(store, name))
    }

    fn groups(&self) -> Vec<String> {
        self.cell()
            .read()
            .attributes
            .groups()
            .map(str::to_string)
            .collect()
    }

    /// Stage the node for deletion at the next commit. A node that was
    /// never committed, or is already being deleted, is left alone.
    fn delete(&self) -> bool {
        self.cell().delete()
    }
}

/// A node of any kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnyNode {
    Entity(Entity),
    Action(Action),
    Bond(Bond),
}

impl AnyNode {
    pub(crate) fn from_cell(cell: Arc<NodeCell>) -> Self {
        match cell.kind() {
            ObjectKind::Entity => AnyNode::Entity(Entity::from_cell(cell)),
            ObjectKind::Action => AnyNode::Action(Action::from_cell(cell)),
            ObjectKind::Bond => AnyNode::Bond(Bond::from_cell(cell)),
        }
    }

    pub(crate) fn cell(&self) -> &Arc<NodeCell> {
        match self {
            AnyNode::Entity(n) => n.cell(),
            AnyNode::Action(n) => n.cell(),
            AnyNode::Bond(n) => n.cell(),
        }
    }

    fn into_cell(self) -> Arc<NodeCell> {
        match self {
            AnyNode::Entity(n) => n.0,
            AnyNode::Action(n) => n.0,
            AnyNode::Bond(n) => n.0,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.cell().kind()
    }

    pub fn key(&self) -> NodeKey {
        self.cell().key()
    }

    pub fn id(&self) -> Option<NodeId> {
        self.cell().read().id
    }

    pub fn node_type(&self) -> String {
        self.cell().read().node_type.clone()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.cell().read().attributes.get(name).cloned()
    }

    pub fn groups(&self) -> Vec<String> {
        self.cell()
            .read()
            .attributes
            .groups()
            .map(str::to_string)
            .collect()
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            AnyNode::Entity(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&Action> {
        match self {
            AnyNode::Action(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bond(&self) -> Option<&Bond> {
        match self {
            AnyNode::Bond(n) => Some(n),
            _ => None,
        }
    }
}

impl From<Entity> for AnyNode {
    fn from(n: Entity) -> Self {
        AnyNode::Entity(n)
    }
}

impl From<Action> for AnyNode {
    fn from(n: Action) -> Self {
        AnyNode::Action(n)
    }
}

impl From<Bond> for AnyNode {
    fn from(n: Bond) -> Self {
        AnyNode::Bond(n)
    }
}

/// Write a to-many relation field and stage its owner.
fn write_links(session: &Session, cell: &Arc<NodeCell>, field: &str, refs: Vec<RecordRef>) -> bool {
    match session.store().set_field(cell.record(), field, FieldValue::RefSet(refs)) {
        Ok(()) => {
            session.touch(cell);
            true
        }
        Err(e) => {
            warn!("{} on {} not written: {}", field, cell.record(), e);
            false
        }
    }
}

fn write_endpoint(
    session: &Session,
    cell: &Arc<NodeCell>,
    field: &str,
    target: Option<RecordRef>,
) -> bool {
    match session.store().set_field(cell.record(), field, FieldValue::Ref(target)) {
        Ok(()) => {
            session.touch(cell);
            true
        }
        Err(e) => {
            warn!("{} on {} not written: {}", field, cell.record(), e);
            false
        }
    }
}

fn upgrade_all<T, F>(cells: &[Weak<NodeCell>], wrap: F) -> Vec<T>
where
    F: Fn(Arc<NodeCell>) -> T,
{
    cells.iter().filter_map(Weak::upgrade).map(wrap).collect()
}

fn retain_others(cells: &mut Vec<Weak<NodeCell>>, target: &Arc<NodeCell>) {
    cells.retain(|w| w.upgrade().map_or(false, |c| !Arc::ptr_eq(&c, target)));
}

fn push_unique(cells: &mut Vec<Weak<NodeCell>>, target: &Arc<NodeCell>) {
    let present = cells
        .iter()
        .any(|w| w.upgrade().map_or(false, |c| Arc::ptr_eq(&c, target)));
    if !present {
        cells.push(Arc::downgrade(target));
    }
}
