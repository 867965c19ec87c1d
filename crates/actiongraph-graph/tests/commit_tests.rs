mod common;

use std::sync::Arc;
use std::time::Duration;

use actiongraph_graph::{
    Action, CommitPhase, Entity, Graph, GraphConfig, GraphContext, GraphDelegate, GraphError,
    GraphEvent, GraphNode, IndexKey, MemoryStore, ObjectKind, Query, Subscription, Value,
};
use common::{isolated_graph, Recorder};

struct PanickingDelegate;

impl GraphDelegate for PanickingDelegate {
    fn did_insert_entity(&self, _: &Graph, _: &Entity) {
        panic!("delegate failure");
    }
}

#[tokio::test]
async fn test_failed_commit_changes_nothing() {
    let (graph, store) = isolated_graph();
    graph.watch(Subscription::action_type("Read"));
    graph.watch(Subscription::action_property("name"));
    let recorder = Recorder::install(&graph);

    let read = graph.create_action("Read");
    read.set("name", "New Years");
    store.fail_next_commit("disk full");

    let err = graph.save().await.unwrap_err();
    assert!(matches!(err, GraphError::CommitFailed(ref reason) if reason == "disk full"));
    assert!(recorder.calls().is_empty());
    assert_eq!(graph.search::<Action>(Query::of_type("Read")).count(), 0);
    assert!(graph.context().index().is_empty());
    assert_eq!(graph.phase(), CommitPhase::Idle);
    assert!(graph.has_pending());
    assert_eq!(read.id(), None);

    let summary = graph.save().await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(recorder.count("insert_action:Read"), 1);
    assert_eq!(recorder.count("insert_action_property:Read:name=New Years"), 1);
    assert!(read.is_committed());
}

#[tokio::test]
async fn test_failed_update_keeps_old_index_entries() {
    let (graph, store) = isolated_graph();
    graph.watch(Subscription::action_property("name"));
    let read = graph.create_action("Read");
    read.set("name", "a");
    graph.save().await.unwrap();

    let recorder = Recorder::install(&graph);
    read.set("name", "b");
    store.fail_next_commit("timeout");
    assert!(graph.save().await.is_err());
    let by_name = |name: &str| {
        graph
            .search::<Action>(Query::property_value("name", name))
            .count()
    };
    assert_eq!(by_name("a"), 1);
    assert_eq!(by_name("b"), 0);

    // a write after the failure folds into the restored batch
    read.set("name", "c");
    graph.save().await.unwrap();
    assert_eq!(by_name("a"), 0);
    assert_eq!(by_name("b"), 0);
    assert_eq!(by_name("c"), 1);
    assert_eq!(recorder.calls(), vec!["update_action_property:Read:name=c".to_string()]);
}

#[tokio::test]
async fn test_save_with_reports_failure_once() {
    let (graph, store) = isolated_graph();
    graph.create_entity("User");
    store.fail_next_commit("offline");

    let (tx, rx) = tokio::sync::oneshot::channel();
    graph
        .save_with(move |result| {
            let _ = tx.send(result.is_err());
        })
        .await
        .unwrap();
    assert!(rx.await.unwrap());
    assert!(graph.has_pending());
}

#[tokio::test]
async fn test_unwatch_stops_callbacks() {
    let (graph, _store) = isolated_graph();
    let recorder = Recorder::install(&graph);
    let subscription = Subscription::entity_type("User");
    assert!(graph.watch(subscription.clone()));
    assert!(!graph.watch(subscription.clone()));
    assert_eq!(graph.watches(), vec![subscription.clone()]);

    assert!(graph.unwatch(&subscription));
    assert!(!graph.unwatch(&subscription));
    graph.create_entity("User");
    graph.save().await.unwrap();
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_events_are_broadcast_in_dispatch_order() {
    let (graph, _store) = isolated_graph();
    graph.watch(Subscription::entity_type("User"));
    graph.watch(Subscription::entity_property("name"));
    let mut events = graph.subscribe();

    let user = graph.create_entity("User");
    user.set("name", "ada");
    let summary = graph.save().await.unwrap();
    assert_eq!(summary.events.len(), 2);

    let first = events.try_recv().unwrap();
    assert_eq!(first, GraphEvent::Inserted(user.to_any()));
    let second = events.try_recv().unwrap();
    assert_eq!(second, summary.events[1]);
    assert_eq!(second.value(), Some(&Value::from("ada")));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_broadcast_can_be_disabled() {
    let mut config = GraphConfig::default();
    config.events.broadcast = false;
    let graph = Graph::builder()
        .context(Arc::new(GraphContext::new()))
        .config(config)
        .build();
    graph.watch(Subscription::entity_type("User"));
    let mut events = graph.subscribe();

    graph.create_entity("User");
    let summary = graph.save().await.unwrap();
    assert_eq!(summary.events.len(), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_range_search_orders_by_value() -> anyhow::Result<()> {
    let (graph, _store) = isolated_graph();
    let sessions = [300, 100, 500, 200, 400];
    let actions: Vec<Action> = sessions
        .iter()
        .map(|session| {
            let action = graph.create_action("Read");
            action.set("session", *session);
            action
        })
        .collect();
    graph.save().await?;

    let hits: Vec<Action> = graph
        .search_range::<Action, _>("session", Value::from(200)..=Value::from(400))
        .collect();
    assert_eq!(
        hits,
        vec![actions[3].clone(), actions[0].clone(), actions[4].clone()]
    );
    assert_eq!(graph.search_range::<Entity, _>("session", ..).count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_graphs_share_the_process_context() {
    let writer = Graph::new();
    let reader = Graph::new();
    assert!(Arc::ptr_eq(writer.context(), reader.context()));

    let probe = writer.create_entity("ProcessContextProbe");
    writer.save().await.unwrap();
    let found: Vec<Entity> = reader
        .search(Query::of_type("ProcessContextProbe"))
        .collect();
    assert_eq!(found, vec![probe]);
}

#[tokio::test]
async fn test_mutation_during_commit_lands_in_next_batch() {
    let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(20)));
    let graph = Graph::builder()
        .store(store.clone())
        .context(Arc::new(GraphContext::new()))
        .build();
    graph.create_entity("User");

    let saving = tokio::spawn({
        let graph = graph.clone();
        async move { graph.save().await }
    });
    while graph.phase() != CommitPhase::Committing {
        tokio::task::yield_now().await;
    }
    let late = graph.create_entity("User");
    let first = saving.await.unwrap().unwrap();
    assert_eq!(first.inserted, 1);
    assert_eq!(late.id(), None);
    assert_eq!(graph.phase(), CommitPhase::Staging);

    let second = graph.save().await.unwrap();
    assert_eq!(second.inserted, 1);
    assert!(late.id().is_some());
    assert_eq!(store.commit_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_batches_never_interleave() {
    let context = Arc::new(GraphContext::new());
    let recorder = Arc::new(Recorder::default());
    let graphs: Vec<Graph> = ["Left", "Right"]
        .iter()
        .map(|node_type| {
            let graph = Graph::builder()
                .store(Arc::new(MemoryStore::with_latency(Duration::from_millis(5))))
                .context(context.clone())
                .build();
            graph.set_delegate(recorder.clone());
            graph.watch(Subscription::entity_type(*node_type));
            for _ in 0..20 {
                graph.create_entity(node_type);
            }
            graph
        })
        .collect();

    let handles: Vec<_> = graphs
        .iter()
        .cloned()
        .map(|graph| tokio::spawn(async move { graph.save().await }))
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().inserted, 20);
    }

    let calls = recorder.calls();
    assert_eq!(calls.len(), 40);
    let switches = calls.windows(2).filter(|w| w[0] != w[1]).count();
    assert_eq!(switches, 1);
    let left = IndexKey::of_type(ObjectKind::Entity, "Left");
    assert_eq!(context.index().count(&left), 20);
}

#[tokio::test]
async fn test_one_batch_fires_inserts_then_updates_then_deletes() {
    let (graph, _store) = isolated_graph();
    graph.watch(Subscription::entity_type("User"));
    graph.watch(Subscription::action_type("Read"));
    let leaving = graph.create_entity("User");
    let read = graph.create_action("Read");
    read.set("name", "New Years");
    graph.save().await.unwrap();

    let recorder = Recorder::install(&graph);
    assert!(leaving.delete());
    read.set("name", "X-MASS");
    let joining = graph.create_entity("User");
    let summary = graph.save().await.unwrap();

    assert_eq!((summary.inserted, summary.updated, summary.deleted), (1, 1, 1));
    assert_eq!(
        recorder.calls(),
        vec![
            "insert_entity:User".to_string(),
            "update_action:Read".to_string(),
            "delete_entity:User".to_string(),
        ]
    );
    assert_eq!(summary.events[0], GraphEvent::Inserted(joining.to_any()));
    assert_eq!(summary.events[2], GraphEvent::Deleted(leaving.to_any()));
}

#[tokio::test]
async fn test_abandoned_save_still_completes() {
    let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(50)));
    let graph = Graph::builder()
        .store(store.clone())
        .context(Arc::new(GraphContext::new()))
        .build();
    graph.watch(Subscription::action_type("Read"));
    let recorder = Recorder::install(&graph);
    let read = graph.create_action("Read");
    read.set("session", 123);

    let abandoned = tokio::time::timeout(Duration::from_millis(5), graph.save()).await;
    assert!(abandoned.is_err());

    // waits for the abandoned batch, then finds nothing left to commit
    let summary = graph.save().await.unwrap();
    assert!(summary.is_empty());
    assert_eq!(store.commit_count(), 1);
    assert_eq!(graph.phase(), CommitPhase::Idle);
    assert!(!graph.has_pending());

    assert!(read.id().is_some());
    assert!(read.is_committed());
    assert_eq!(recorder.calls(), vec!["insert_action:Read".to_string()]);
    let found: Vec<Action> = graph.search(Query::property_value("session", 123)).collect();
    assert_eq!(found, vec![read.clone()]);
    assert!(read.delete());
}

#[tokio::test]
async fn test_panicking_delegate_leaves_commit_cycle() {
    let (graph, _store) = isolated_graph();
    graph.watch(Subscription::entity_type("User"));
    graph.set_delegate(Arc::new(PanickingDelegate));
    graph.create_entity("User");

    let outcome = tokio::spawn({
        let graph = graph.clone();
        async move { graph.save().await }
    })
    .await;
    assert!(outcome.unwrap_err().is_panic());

    assert_eq!(graph.phase(), CommitPhase::Idle);
    let users = IndexKey::of_type(ObjectKind::Entity, "User");
    assert_eq!(graph.context().index().count(&users), 1);

    graph.clear_delegate();
    graph.create_entity("User");
    assert_eq!(graph.phase(), CommitPhase::Staging);
    let summary = graph.save().await.unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(graph.context().index().count(&users), 2);
}
