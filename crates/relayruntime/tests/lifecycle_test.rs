use relaycore::memory::MemoryAdapterRegistry;
use relaycore::{Adapter, AdapterDirection, AdapterError, AdapterStatus, EventBus, ExecutionEvent};
use relayruntime::AdapterLifecycle;
use std::sync::Arc;
use uuid::Uuid;

async fn setup(adapters: Vec<Adapter>) -> (AdapterLifecycle, Arc<EventBus>) {
    let registry = MemoryAdapterRegistry::new();
    for adapter in adapters {
        registry.insert(adapter).await;
    }
    let bus = Arc::new(EventBus::new(64));
    (AdapterLifecycle::new(Arc::new(registry), bus.clone()), bus)
}

#[tokio::test]
async fn start_sets_started() {
    let adapter = Adapter::new("a", AdapterDirection::Sender);
    let id = adapter.id;
    let (lifecycle, _bus) = setup(vec![adapter]).await;

    let updated = lifecycle.start(id).await.unwrap();
    assert_eq!(updated.status, AdapterStatus::Started);
}

#[tokio::test]
async fn start_requires_active() {
    let adapter = Adapter::new("a", AdapterDirection::Sender).inactive();
    let id = adapter.id;
    let (lifecycle, _bus) = setup(vec![adapter]).await;

    let err = lifecycle.start(id).await.unwrap_err();
    assert!(matches!(err, AdapterError::Inactive(got) if got == id));
}

#[tokio::test]
async fn start_is_a_noop_when_already_started() {
    let mut adapter = Adapter::new("a", AdapterDirection::Sender);
    adapter.status = AdapterStatus::Started;
    let id = adapter.id;
    let (lifecycle, bus) = setup(vec![adapter]).await;

    let mut events = bus.subscribe();
    let updated = lifecycle.start(id).await.unwrap();
    assert_eq!(updated.status, AdapterStatus::Started);
    // no status-change event for a no-op
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn stop_is_a_noop_when_already_stopped() {
    let adapter = Adapter::new("a", AdapterDirection::Sender);
    let id = adapter.id;
    let (lifecycle, bus) = setup(vec![adapter]).await;

    let mut events = bus.subscribe();
    let updated = lifecycle.stop(id).await.unwrap();
    assert_eq!(updated.status, AdapterStatus::Stopped);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn stop_clears_an_errored_adapter() {
    let mut adapter = Adapter::new("a", AdapterDirection::Sender);
    adapter.status = AdapterStatus::errored("connection refused");
    let id = adapter.id;
    let (lifecycle, _bus) = setup(vec![adapter]).await;

    let updated = lifecycle.stop(id).await.unwrap();
    assert_eq!(updated.status, AdapterStatus::Stopped);
}

#[tokio::test]
async fn restart_cycles_a_started_adapter() {
    let mut adapter = Adapter::new("a", AdapterDirection::Sender);
    adapter.status = AdapterStatus::Started;
    let id = adapter.id;
    let (lifecycle, _bus) = setup(vec![adapter]).await;

    let updated = lifecycle.restart(id).await.unwrap();
    assert_eq!(updated.status, AdapterStatus::Started);
}

#[tokio::test]
async fn deactivating_a_started_adapter_stops_it_first() {
    let mut adapter = Adapter::new("a", AdapterDirection::Sender);
    adapter.status = AdapterStatus::Started;
    let id = adapter.id;
    let (lifecycle, _bus) = setup(vec![adapter]).await;

    let updated = lifecycle.set_active(id, false).await.unwrap();
    assert!(!updated.active);
    assert_eq!(updated.status, AdapterStatus::Stopped);
}

#[tokio::test]
async fn set_error_records_the_failure_in_the_state() {
    let mut adapter = Adapter::new("a", AdapterDirection::Sender);
    adapter.status = AdapterStatus::Started;
    let id = adapter.id;
    let (lifecycle, bus) = setup(vec![adapter]).await;

    let mut events = bus.subscribe();
    let updated = lifecycle.set_error(id, "broken pipe").await.unwrap();
    match &updated.status {
        AdapterStatus::Errored { message, .. } => assert_eq!(message, "broken pipe"),
        other => panic!("expected errored, got {:?}", other),
    }
    assert!(updated.status.is_stopped());

    // the status change is the audit trail
    match events.recv().await.unwrap() {
        ExecutionEvent::AdapterStatusChanged {
            adapter_id, status, ..
        } => {
            assert_eq!(adapter_id, id);
            assert!(matches!(status, AdapterStatus::Errored { .. }));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn an_errored_adapter_can_be_started_again() {
    let mut adapter = Adapter::new("a", AdapterDirection::Sender);
    adapter.status = AdapterStatus::errored("timeout");
    let id = adapter.id;
    let (lifecycle, _bus) = setup(vec![adapter]).await;

    let updated = lifecycle.start(id).await.unwrap();
    assert_eq!(updated.status, AdapterStatus::Started);
}

#[tokio::test]
async fn operations_on_missing_adapters_fail_with_not_found() {
    let (lifecycle, _bus) = setup(vec![]).await;
    let ghost = Uuid::new_v4();

    assert!(matches!(
        lifecycle.start(ghost).await.unwrap_err(),
        AdapterError::NotFound(got) if got == ghost
    ));
    assert!(matches!(
        lifecycle.set_error(ghost, "x").await.unwrap_err(),
        AdapterError::NotFound(_)
    ));
}
