use std::collections::{BTreeSet, HashMap};
use std::fmt;

use actiongraph_core::ObjectKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Type,
    Group,
    Property,
}

/// A standing interest in committed changes, matched by object kind plus a
/// type name, group name or property name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub kind: ObjectKind,
    pub match_kind: MatchKind,
    pub key: String,
}

impl Subscription {
    pub fn new(kind: ObjectKind, match_kind: MatchKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            match_kind,
            key: key.into(),
        }
    }

    pub fn entity_type(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Entity, MatchKind::Type, key)
    }

    pub fn entity_group(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Entity, MatchKind::Group, key)
    }

    pub fn entity_property(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Entity, MatchKind::Property, key)
    }

    pub fn action_type(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Action, MatchKind::Type, key)
    }

    pub fn action_group(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Action, MatchKind::Group, key)
    }

    pub fn action_property(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Action, MatchKind::Property, key)
    }

    pub fn bond_type(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Bond, MatchKind::Type, key)
    }

    pub fn bond_group(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Bond, MatchKind::Group, key)
    }

    pub fn bond_property(key: impl Into<String>) -> Self {
        Self::new(ObjectKind::Bond, MatchKind::Property, key)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}:{}", self.kind, self.match_kind, self.key)
    }
}

/// Active subscriptions. Registration is a set: watching a tuple twice is
/// the same as watching it once.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    keys: HashMap<(ObjectKind, MatchKind), BTreeSet<String>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the subscription was already registered.
    pub fn watch(&mut self, subscription: Subscription) -> bool {
        self.keys
            .entry((subscription.kind, subscription.match_kind))
            .or_default()
            .insert(subscription.key)
    }

    /// Returns `false` if the subscription was not registered.
    pub fn unwatch(&mut self, subscription: &Subscription) -> bool {
        let slot = (subscription.kind, subscription.match_kind);
        let Some(keys) = self.keys.get_mut(&slot) else {
            return false;
        };
        let removed = keys.remove(&subscription.key);
        if keys.is_empty() {
            self.keys.remove(&slot);
        }
        removed
    }

    pub fn is_watched(&self, kind: ObjectKind, match_kind: MatchKind, key: &str) -> bool {
        self.keys
            .get(&(kind, match_kind))
            .map_or(false, |keys| keys.contains(key))
    }

    /// Subscriptions satisfied by a node of `kind` with the given type,
    /// groups and property names.
    pub fn matching<'a, G, P>(
        &self,
        kind: ObjectKind,
        node_type: &str,
        groups: G,
        properties: P,
    ) -> Vec<Subscription>
    where
        G: IntoIterator<Item = &'a str>,
        P: IntoIterator<Item = &'a str>,
    {
        let mut hits = Vec::new();
        if self.is_watched(kind, MatchKind::Type, node_type) {
            hits.push(Subscription::new(kind, MatchKind::Type, node_type));
        }
        for (match_kind, names) in [
            (MatchKind::Group, groups.into_iter().collect::<Vec<_>>()),
            (MatchKind::Property, properties.into_iter().collect()),
        ] {
            hits.extend(
                names
                    .into_iter()
                    .filter(|name| self.is_watched(kind, match_kind, name))
                    .map(|name| Subscription::new(kind, match_kind, name)),
            );
        }
        hits
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut all: Vec<_> = self
            .keys
            .iter()
            .flat_map(|(&(kind, match_kind), keys)| {
                keys.iter().map(move |key| Subscription::new(kind, match_kind, key.as_str()))
            })
            .collect();
        all.sort();
        all
    }

    pub fn len(&self) -> usize {
        self.keys.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_is_idempotent() {
        let mut registry = WatchRegistry::new();
        assert!(registry.watch(Subscription::action_group("Holiday")));
        assert!(!registry.watch(Subscription::action_group("Holiday")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unwatch_removes_exact_tuple() {
        let mut registry = WatchRegistry::new();
        registry.watch(Subscription::action_group("Holiday"));
        registry.watch(Subscription::bond_group("Holiday"));
        assert!(!registry.unwatch(&Subscription::entity_group("Holiday")));
        assert!(registry.unwatch(&Subscription::action_group("Holiday")));
        assert!(!registry.is_watched(ObjectKind::Action, MatchKind::Group, "Holiday"));
        assert!(registry.is_watched(ObjectKind::Bond, MatchKind::Group, "Holiday"));
    }

    #[test]
    fn matching_filters_by_kind_and_name() {
        let mut registry = WatchRegistry::new();
        registry.watch(Subscription::action_type("Read"));
        registry.watch(Subscription::action_property("name"));
        registry.watch(Subscription::entity_property("session"));

        let hits = registry.matching(
            ObjectKind::Action,
            "Read",
            ["Holiday"],
            ["name", "session"],
        );
        assert_eq!(
            hits,
            vec![
                Subscription::action_type("Read"),
                Subscription::action_property("name"),
            ]
        );
        assert!(registry
            .matching(ObjectKind::Action, "Write", ["Holiday"], ["session"])
            .is_empty());
    }

    #[test]
    fn subscriptions_are_listed_in_order() {
        let mut registry = WatchRegistry::new();
        registry.watch(Subscription::bond_type("Friend"));
        registry.watch(Subscription::entity_type("User"));
        let all = registry.subscriptions();
        assert_eq!(all[0], Subscription::entity_type("User"));
        assert_eq!(all.len(), 2);
    }
}
