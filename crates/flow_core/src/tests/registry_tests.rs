use super::*;

use std::collections::BTreeMap;

use shared::domain::{Port, DEFAULT_FLOW_COLOR};

async fn registry_with(ids: &[&str]) -> Registry {
    let registry = Registry::new();
    for id in ids {
        registry
            .add_process(Process::new(*id, id.to_uppercase()))
            .await
            .expect("add process");
    }
    registry
}

#[tokio::test]
async fn add_process_forces_idle_and_refuses_duplicates() {
    let registry = Registry::new();
    let mut process = Process::new("a", "A");
    process.status = ProcessStatus::Running;
    registry.add_process(process).await.expect("add");

    let stored = registry.process(&"a".into()).await.expect("stored");
    assert_eq!(stored.status, ProcessStatus::Idle);

    let err = registry
        .add_process(Process::new("a", "other"))
        .await
        .expect_err("duplicate");
    assert_eq!(err, RegistryError::DuplicateProcess("a".into()));
    assert_eq!(registry.process(&"a".into()).await.expect("kept").name, "A");
}

#[tokio::test]
async fn remove_process_cascades_and_is_idempotent() {
    let registry = registry_with(&["a", "b", "c"]).await;
    registry
        .connect(FlowEndpoints::new("a", "out", "b", "in"), &FlowPatch::default())
        .await
        .expect("a->b");
    registry
        .connect(FlowEndpoints::new("c", "out", "a", "in"), &FlowPatch::default())
        .await
        .expect("c->a");
    registry
        .connect(FlowEndpoints::new("b", "out", "c", "in"), &FlowPatch::default())
        .await
        .expect("b->c");

    assert!(registry.remove_process(&"a".into()).await);
    let flows = registry.flows().await;
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].id.as_str(), "b:out->c:in");

    assert!(!registry.remove_process(&"a".into()).await);
    assert_eq!(registry.flows().await.len(), 1);
    assert_eq!(registry.process_ids().await, vec!["b".into(), "c".into()]);
}

#[tokio::test]
async fn removing_middle_of_chain_isolates_both_ends() {
    let registry = registry_with(&["A", "B", "C"]).await;
    registry
        .connect(FlowEndpoints::new("A", "out", "B", "in"), &FlowPatch::default())
        .await
        .expect("A->B");
    registry
        .connect(FlowEndpoints::new("B", "out", "C", "in"), &FlowPatch::default())
        .await
        .expect("B->C");

    registry.remove_process(&"B".into()).await;

    assert!(registry.flows().await.is_empty());
    assert_eq!(registry.process_ids().await, vec!["A".into(), "C".into()]);
}

#[tokio::test]
async fn colon_bearing_ids_get_separate_flows() {
    let registry = registry_with(&["a:b", "a", "x"]).await;
    let first = registry
        .connect(FlowEndpoints::new("a:b", "c", "x", "y"), &FlowPatch::default())
        .await
        .expect("a:b/c -> x/y");
    let second = registry
        .connect(FlowEndpoints::new("a", "b:c", "x", "y"), &FlowPatch::default())
        .await
        .expect("a/b:c -> x/y");

    assert_ne!(first, second);
    assert_eq!(registry.flows().await.len(), 2);

    assert!(registry.remove_process(&"a".into()).await);
    let remaining = registry.flows().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].endpoints.source_process_id.as_str(), "a:b");
}

#[tokio::test]
async fn double_connect_keeps_one_flow_and_applies_second_call() {
    let registry = registry_with(&["a", "b"]).await;
    let endpoints = FlowEndpoints::new("a", "out", "b", "in");

    let first = registry
        .connect(endpoints.clone(), &FlowPatch::default())
        .await
        .expect("first connect");
    registry
        .update_flow(
            &first,
            &FlowPatch {
                flow_rate: Some(42.0),
                ..FlowPatch::default()
            },
        )
        .await;
    let second = registry
        .connect(
            endpoints,
            &FlowPatch {
                color: Some("#ff0000".into()),
                ..FlowPatch::default()
            },
        )
        .await
        .expect("second connect");

    assert_eq!(first, second);
    let flows = registry.flows().await;
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].color, "#ff0000");
    assert_eq!(flows[0].flow_rate, 42.0);
}

#[tokio::test]
async fn new_flow_starts_with_defaults() {
    let registry = registry_with(&["a", "b"]).await;
    let flow_id = registry
        .connect(FlowEndpoints::new("a", "out", "b", "in"), &FlowPatch::default())
        .await
        .expect("connect");
    let flow = registry.flow(&flow_id).await.expect("flow");
    assert_eq!(flow.flow_rate, 0.0);
    assert_eq!(flow.latency, 0.0);
    assert_eq!(flow.color, DEFAULT_FLOW_COLOR);
    assert_eq!(flow.intensity, 1.0);
}

#[tokio::test]
async fn connect_refuses_unknown_endpoint() {
    let registry = registry_with(&["a"]).await;
    let err = registry
        .connect(FlowEndpoints::new("a", "out", "ghost", "in"), &FlowPatch::default())
        .await
        .expect_err("dangling target");
    assert_eq!(err, RegistryError::UnknownProcess("ghost".into()));
    assert!(registry.flows().await.is_empty());
}

#[tokio::test]
async fn disconnect_leaves_processes_alone() {
    let registry = registry_with(&["a", "b"]).await;
    let flow_id = registry
        .connect(FlowEndpoints::new("a", "out", "b", "in"), &FlowPatch::default())
        .await
        .expect("connect");

    assert!(registry.disconnect(&flow_id).await);
    assert!(!registry.disconnect(&flow_id).await);
    assert!(registry.flows().await.is_empty());
    assert_eq!(registry.processes().await.len(), 2);
}

#[tokio::test]
async fn update_process_merges_and_never_creates() {
    let registry = registry_with(&["a"]).await;
    let mut patch = ProcessPatch {
        name: Some("renamed".into()),
        ports: Some(vec![Port::output("out")]),
        metrics: BTreeMap::from([("cpu".to_string(), 0.5)]),
        ..ProcessPatch::default()
    };
    assert!(registry.update_process(&"a".into(), &patch).await);

    patch = ProcessPatch {
        metrics: BTreeMap::from([("mem".to_string(), 128.0)]),
        ..ProcessPatch::default()
    };
    assert!(registry.update_process(&"a".into(), &patch).await);
    assert!(!registry.update_process(&"missing".into(), &patch).await);

    let stored = registry.process(&"a".into()).await.expect("stored");
    assert_eq!(stored.name, "renamed");
    assert_eq!(stored.ports, vec![Port::output("out")]);
    assert_eq!(stored.metrics.get("cpu"), Some(&0.5));
    assert_eq!(stored.metrics.get("mem"), Some(&128.0));
    assert!(registry.process(&"missing".into()).await.is_none());
}

#[tokio::test]
async fn status_patches_follow_the_state_machine() {
    let registry = registry_with(&["a"]).await;
    let to = |status| ProcessPatch {
        status: Some(status),
        ..ProcessPatch::default()
    };

    registry.update_process(&"a".into(), &to(ProcessStatus::Paused)).await;
    assert_eq!(
        registry.process(&"a".into()).await.expect("a").status,
        ProcessStatus::Idle
    );

    registry.update_process(&"a".into(), &to(ProcessStatus::Running)).await;
    registry.update_process(&"a".into(), &to(ProcessStatus::Paused)).await;
    assert_eq!(
        registry.process(&"a".into()).await.expect("a").status,
        ProcessStatus::Paused
    );
}

#[tokio::test]
async fn clear_errors_resets_error_status() {
    let registry = registry_with(&["a"]).await;
    {
        let slot = registry.process_slot(&"a".into()).await.expect("slot");
        let mut guard = slot.lock().await;
        guard.record_error(ProcessErrorEntry {
            action: shared::domain::ControlAction::Start,
            message: "boom".into(),
            recorded_at: chrono::Utc::now(),
        });
    }

    assert!(registry.clear_errors(&"a".into()).await);
    let stored = registry.process(&"a".into()).await.expect("a");
    assert!(stored.errors.is_empty());
    assert_eq!(stored.status, ProcessStatus::Idle);
}

#[tokio::test]
async fn mutations_are_broadcast() {
    let registry = Registry::new();
    let mut events = registry.subscribe_events();

    registry
        .add_process(Process::new("a", "A"))
        .await
        .expect("add");
    registry.remove_process(&"a".into()).await;

    assert!(matches!(
        events.recv().await.expect("event"),
        ModelEvent::ProcessAdded(process) if process.id.as_str() == "a"
    ));
    assert!(matches!(
        events.recv().await.expect("event"),
        ModelEvent::ProcessRemoved { process_id, removed_flows }
            if process_id.as_str() == "a" && removed_flows.is_empty()
    ));
}
