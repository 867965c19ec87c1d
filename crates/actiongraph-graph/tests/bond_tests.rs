mod common;

use actiongraph_graph::{Bond, GraphNode, Query, Subscription, Value};
use common::{isolated_graph, Recorder};

#[tokio::test]
async fn test_replacing_endpoint_keeps_previous_entity() {
    let (graph, _store) = isolated_graph();
    let alice = graph.create_entity("User");
    let bob = graph.create_entity("User");
    let carol = graph.create_entity("User");
    let friend = graph.create_bond("Friend");

    assert!(friend.set_subject(Some(&alice)));
    assert!(friend.set_object(Some(&bob)));
    assert!(!friend.set_object(Some(&bob)));
    graph.save().await.unwrap();

    assert!(friend.set_object(Some(&carol)));
    assert_eq!(friend.object(), Some(carol.clone()));
    assert!(bob.bonds_when_object().is_empty());
    assert_eq!(carol.bonds_when_object(), vec![friend.clone()]);
    graph.save().await.unwrap();

    assert!(!bob.is_deleted());
    assert!(bob.is_committed());
    assert_eq!(friend.subject(), Some(alice.clone()));
}

#[tokio::test]
async fn test_endpoints_may_dangle() {
    let (graph, _store) = isolated_graph();
    let alice = graph.create_entity("User");
    let friend = graph.create_bond("Friend");
    assert_eq!(friend.subject(), None);
    assert_eq!(friend.object(), None);

    friend.set_subject(Some(&alice));
    graph.save().await.unwrap();
    assert!(friend.set_subject(None));
    assert!(!friend.set_subject(None));
    assert!(alice.bonds_when_subject().is_empty());
    graph.save().await.unwrap();
    assert_eq!(friend.subject(), None);
}

#[tokio::test]
async fn test_deleting_endpoint_updates_bond() {
    let (graph, _store) = isolated_graph();
    graph.watch(Subscription::bond_type("Friend"));
    let alice = graph.create_entity("User");
    let bob = graph.create_entity("User");
    let friend = graph.create_bond("Friend");
    friend.set_subject(Some(&alice));
    friend.set_object(Some(&bob));
    graph.save().await.unwrap();

    let recorder = Recorder::install(&graph);
    assert!(bob.delete());
    graph.save().await.unwrap();
    assert_eq!(recorder.calls(), vec!["update_bond:Friend".to_string()]);
    assert!(!friend.is_deleted());
    assert_eq!(friend.object(), None);
    assert_eq!(friend.subject(), Some(alice.clone()));
}

#[tokio::test]
async fn test_bond_properties_and_groups_are_searchable() {
    let (graph, _store) = isolated_graph();
    graph.watch(Subscription::bond_group("Close"));
    graph.watch(Subscription::bond_property("since"));
    let recorder = Recorder::install(&graph);

    let friend = graph.create_bond("Friend");
    friend.set("since", 2019);
    friend.add_group("Close");
    graph.save().await.unwrap();

    assert_eq!(recorder.count("insert_bond_group:Friend:Close"), 1);
    assert_eq!(recorder.count("insert_bond_property:Friend:since=2019"), 1);
    // the type itself is not watched
    assert_eq!(recorder.count("insert_bond:Friend"), 0);

    let close: Vec<Bond> = graph.search(Query::group("Close")).collect();
    assert_eq!(close, vec![friend.clone()]);

    friend.set("since", 2020);
    graph.save().await.unwrap();
    assert_eq!(recorder.count("update_bond_property:Friend:since=2020"), 1);

    friend.remove_property("since");
    graph.save().await.unwrap();
    assert_eq!(recorder.count("delete_bond_property:Friend:since=2020"), 1);
    assert_eq!(friend.get("since"), None::<Value>);
}

#[tokio::test]
async fn test_deleted_bond_is_dropped_from_endpoints() {
    let (graph, _store) = isolated_graph();
    let alice = graph.create_entity("User");
    let friend = graph.create_bond("Friend");
    friend.set_subject(Some(&alice));
    graph.save().await.unwrap();

    assert!(friend.delete());
    assert!(alice.bonds_when_subject().is_empty());
    // the deleted bond still reports its endpoints
    assert_eq!(friend.subject(), Some(alice.clone()));
    assert!(!friend.set_subject(None));
    graph.save().await.unwrap();
    assert_eq!(graph.search::<Bond>(Query::of_type("Friend")).count(), 0);
}
