#![allow(dead_code)]

use std::sync::Arc;

use actiongraph_graph::{
    Action, Bond, Entity, Graph, GraphContext, GraphDelegate, GraphNode, MemoryStore, Value,
};
use parking_lot::Mutex;

/// Graph over its own store and its own index, so tests never see each
/// other's nodes or watches.
pub fn isolated_graph() -> (Graph, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let graph = Graph::builder()
        .store(store.clone())
        .context(Arc::new(GraphContext::new()))
        .build();
    (graph, store)
}

/// Delegate that records every callback as `"<method>:<type>[:<detail>]"`.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn install(graph: &Graph) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        graph.set_delegate(recorder.clone());
        recorder
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn push(&self, method: &str, node: &impl GraphNode, detail: Option<String>) {
        let mut call = format!("{}:{}", method, node.node_type());
        if let Some(detail) = detail {
            call.push(':');
            call.push_str(&detail);
        }
        self.calls.lock().push(call);
    }
}

fn pair(name: &str, value: &Value) -> Option<String> {
    Some(format!("{}={}", name, value))
}

impl GraphDelegate for Recorder {
    fn did_insert_entity(&self, _: &Graph, entity: &Entity) {
        self.push("insert_entity", entity, None);
    }
    fn did_update_entity(&self, _: &Graph, entity: &Entity) {
        self.push("update_entity", entity, None);
    }
    fn did_delete_entity(&self, _: &Graph, entity: &Entity) {
        self.push("delete_entity", entity, None);
    }
    fn did_insert_entity_group(&self, _: &Graph, entity: &Entity, group: &str) {
        self.push("insert_entity_group", entity, Some(group.to_string()));
    }
    fn did_delete_entity_group(&self, _: &Graph, entity: &Entity, group: &str) {
        self.push("delete_entity_group", entity, Some(group.to_string()));
    }
    fn did_insert_entity_property(&self, _: &Graph, entity: &Entity, name: &str, value: &Value) {
        self.push("insert_entity_property", entity, pair(name, value));
    }
    fn did_update_entity_property(&self, _: &Graph, entity: &Entity, name: &str, value: &Value) {
        self.push("update_entity_property", entity, pair(name, value));
    }
    fn did_delete_entity_property(&self, _: &Graph, entity: &Entity, name: &str, value: &Value) {
        self.push("delete_entity_property", entity, pair(name, value));
    }

    fn did_insert_action(&self, _: &Graph, action: &Action) {
        self.push("insert_action", action, None);
    }
    fn did_update_action(&self, _: &Graph, action: &Action) {
        self.push("update_action", action, None);
    }
    fn did_delete_action(&self, _: &Graph, action: &Action) {
        self.push("delete_action", action, None);
    }
    fn did_insert_action_group(&self, _: &Graph, action: &Action, group: &str) {
        self.push("insert_action_group", action, Some(group.to_string()));
    }
    fn did_delete_action_group(&self, _: &Graph, action: &Action, group: &str) {
        self.push("delete_action_group", action, Some(group.to_string()));
    }
    fn did_insert_action_property(&self, _: &Graph, action: &Action, name: &str, value: &Value) {
        self.push("insert_action_property", action, pair(name, value));
    }
    fn did_update_action_property(&self, _: &Graph, action: &Action, name: &str, value: &Value) {
        self.push("update_action_property", action, pair(name, value));
    }
    fn did_delete_action_property(&self, _: &Graph, action: &Action, name: &str, value: &Value) {
        self.push("delete_action_property", action, pair(name, value));
    }

    fn did_insert_bond(&self, _: &Graph, bond: &Bond) {
        self.push("insert_bond", bond, None);
    }
    fn did_update_bond(&self, _: &Graph, bond: &Bond) {
        self.push("update_bond", bond, None);
    }
    fn did_delete_bond(&self, _: &Graph, bond: &Bond) {
        self.push("delete_bond", bond, None);
    }
    fn did_insert_bond_group(&self, _: &Graph, bond: &Bond, group: &str) {
        self.push("insert_bond_group", bond, Some(group.to_string()));
    }
    fn did_delete_bond_group(&self, _: &Graph, bond: &Bond, group: &str) {
        self.push("delete_bond_group", bond, Some(group.to_string()));
    }
    fn did_insert_bond_property(&self, _: &Graph, bond: &Bond, name: &str, value: &Value) {
        self.push("insert_bond_property", bond, pair(name, value));
    }
    fn did_update_bond_property(&self, _: &Graph, bond: &Bond, name: &str, value: &Value) {
        self.push("update_bond_property", bond, pair(name, value));
    }
    fn did_delete_bond_property(&self, _: &Graph, bond: &Bond, name: &str, value: &Value) {
        self.push("delete_bond_property", bond, pair(name, value));
    }
}
