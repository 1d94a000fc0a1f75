//! Literal scenario tests for sandbox isolation and watch replay (spec.md §8 S5/S6),
//! run through the public crate API.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use scaling_advisor::core::common::{KubeObject, Resources};
use scaling_advisor::core::node::Node;
use scaling_advisor::core::pod::Pod;
use scaling_advisor::core::selector::LabelSelector;
use scaling_advisor::core::store::WatchEventKind;
use scaling_advisor::view::base::BaseView;
use scaling_advisor::view::sandbox::SandboxView;
use scaling_advisor::view::View;

/// S5 — sandbox isolation: start base with node `N`; create sandbox `X`; delete `N`
/// in `X`; `List(X).nodes == []` and `List(base).nodes == [N]`.
#[test]
fn s5_sandbox_isolation() {
    let base = Arc::new(BaseView::new(16));
    base.store_node(Node::new("n", Resources::default())).unwrap();

    let sandbox = SandboxView::new(base.clone(), base.counter(), 16);
    sandbox.delete_node("n").unwrap();

    let (sandbox_nodes, _) = sandbox.list_nodes().unwrap();
    assert!(sandbox_nodes.is_empty(), "sandbox must see no nodes after deleting the only one");

    let (base_nodes, _) = base.list_nodes().unwrap();
    assert_eq!(base_nodes.len(), 1, "deleting through the sandbox must not mutate the base");
    assert_eq!(base_nodes[0].name(), "n");
}

/// S6 — watch replay: start with pods `p1..p5`; subscribe with `startRV=0`; receive
/// five `Added` events before any live event; then add `p6`; receive one further
/// `Added` event.
#[tokio::test]
async fn s6_watch_replay_then_live() {
    let base = BaseView::new(16);
    for i in 1..=5 {
        base.store_pod(Pod::new(&format!("p{i}"), "default", Resources::default())).unwrap();
    }

    let mut stream = Box::pin(base.pod_store().watch(0, None, LabelSelector::everything(), Duration::from_secs(5)));

    let mut replayed = Vec::new();
    for _ in 0..5 {
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.kind, WatchEventKind::Added);
        replayed.push(event.object.metadata.name.clone());
    }
    replayed.sort();
    assert_eq!(replayed, vec!["p1", "p2", "p3", "p4", "p5"]);

    base.store_pod(Pod::new("p6", "default", Resources::default())).unwrap();
    let live = stream.next().await.unwrap().unwrap();
    assert_eq!(live.kind, WatchEventKind::Added);
    assert_eq!(live.object.metadata.name, "p6");
}
