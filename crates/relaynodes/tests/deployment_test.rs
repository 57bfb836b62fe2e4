use async_trait::async_trait;
use relaycore::memory::{
    EchoAdapterExecution, EchoUtilityExecution, MemoryAdapterRegistry, MemoryDeploymentStore,
    MemoryFlowStore, MemoryRunStore, NullScheduler,
};
use relaycore::{
    keys, Adapter, AdapterDirection, AdapterId, AdapterRegistry, AdapterStatus, DeployError,
    DeployedFlow, DeploymentId, FlowDefinition, FlowNode, NodeKind, Scheduler, SchedulerError,
    StoreError,
};
use relayruntime::{EngineSettings, HandlerRegistry, RelayRuntime, Services};
use std::sync::Arc;

/// Adapter registry that refuses to start one specific adapter
struct FlakyAdapterRegistry {
    inner: MemoryAdapterRegistry,
    fail_start_for: AdapterId,
}

#[async_trait]
impl AdapterRegistry for FlakyAdapterRegistry {
    async fn get(&self, id: AdapterId) -> Result<Adapter, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Adapter>, StoreError> {
        self.inner.list().await
    }

    async fn update_status(
        &self,
        id: AdapterId,
        status: AdapterStatus,
    ) -> Result<Adapter, StoreError> {
        if id == self.fail_start_for && status.is_started() {
            return Err(StoreError::Backend("simulated start failure".to_string()));
        }
        self.inner.update_status(id, status).await
    }

    async fn set_active(&self, id: AdapterId, active: bool) -> Result<Adapter, StoreError> {
        self.inner.set_active(id, active).await
    }
}

/// Scheduler whose registration always fails
struct FailingScheduler;

#[async_trait]
impl Scheduler for FailingScheduler {
    async fn on_flow_deployed(&self, _deployment: &DeployedFlow) -> Result<(), SchedulerError> {
        Err(SchedulerError("quartz is down".to_string()))
    }

    async fn on_flow_undeployed(&self, _id: DeploymentId) -> Result<(), SchedulerError> {
        Err(SchedulerError("quartz is down".to_string()))
    }
}

fn two_adapter_flow(sender: &Adapter, receiver: &Adapter) -> FlowDefinition {
    let mut flow = FlowDefinition::new("transfer");
    flow.add_node(
        FlowNode::new("start", NodeKind::Start)
            .with_data(keys::SENDER_ADAPTER_ID, sender.id.to_string()),
    );
    flow.add_node(
        FlowNode::new("deliver", NodeKind::Adapter)
            .with_data(keys::ADAPTER_ID, receiver.id.to_string()),
    );
    flow.add_node(FlowNode::new("end", NodeKind::End));
    flow.connect("start", "deliver");
    flow.connect("deliver", "end");
    flow
}

fn services_over(
    adapters: Arc<dyn AdapterRegistry>,
    scheduler: Arc<dyn Scheduler>,
) -> Arc<Services> {
    Arc::new(Services {
        adapters,
        flows: Arc::new(MemoryFlowStore::new()),
        deployments: Arc::new(MemoryDeploymentStore::new()),
        runs: Arc::new(MemoryRunStore::new()),
        adapter_exec: Arc::new(EchoAdapterExecution),
        utility_exec: Arc::new(EchoUtilityExecution),
        scheduler,
    })
}

async fn memory_services(adapters: Vec<Adapter>) -> Arc<Services> {
    let registry = MemoryAdapterRegistry::new();
    for adapter in adapters {
        registry.insert(adapter).await;
    }
    services_over(Arc::new(registry), Arc::new(NullScheduler))
}

async fn runtime_for(flow: &FlowDefinition, services: Arc<Services>) -> RelayRuntime {
    services.flows.put(flow.clone()).await.unwrap();
    let mut handlers = HandlerRegistry::new();
    relaynodes::register_builtin(&mut handlers);
    RelayRuntime::with_registry(services, Arc::new(handlers), EngineSettings::default())
}

async fn status_of(services: &Arc<Services>, id: AdapterId) -> AdapterStatus {
    services.adapters.get(id).await.unwrap().status
}

#[tokio::test]
async fn deploy_starts_adapters_and_snapshots_the_flow() {
    let sender = Adapter::new("in", AdapterDirection::Sender);
    let receiver = Adapter::new("out", AdapterDirection::Receiver);
    let services = memory_services(vec![sender.clone(), receiver.clone()]).await;
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services.clone()).await;

    let summary = runtime.deploy(flow.id, "ops").await.unwrap();
    assert_eq!(summary.flow_id, flow.id);
    assert_eq!(summary.adapters_started.len(), 2);
    assert_eq!(status_of(&services, sender.id).await, AdapterStatus::Started);
    assert_eq!(status_of(&services, receiver.id).await, AdapterStatus::Started);

    let deployment = &services.deployments.find_by_flow(flow.id).await.unwrap()[0];
    assert_eq!(deployment.sender_adapter_id, sender.id);
    assert_eq!(deployment.receiver_adapter_ids, vec![receiver.id]);
    assert_eq!(deployment.deployed_by, "ops");
    assert_eq!(deployment.flow_snapshot.version, flow.version);
    assert!(deployment.adapter_snapshots.contains_key(&sender.id));

    // later edits to the stored flow never reach the snapshot
    let mut edited = flow.clone();
    edited.version += 1;
    services.flows.put(edited).await.unwrap();
    let deployment = &services.deployments.find_by_flow(flow.id).await.unwrap()[0];
    assert_eq!(deployment.flow_snapshot.version, flow.version);
}

#[tokio::test]
async fn deploy_rejects_a_second_deployment() {
    let sender = Adapter::new("in", AdapterDirection::Sender);
    let receiver = Adapter::new("out", AdapterDirection::Receiver);
    let services = memory_services(vec![sender.clone(), receiver.clone()]).await;
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services).await;

    runtime.deploy(flow.id, "ops").await.unwrap();
    let err = runtime.deploy(flow.id, "ops").await.unwrap_err();
    assert!(matches!(err, DeployError::AlreadyDeployed(got) if got == flow.id));
}

#[tokio::test]
async fn deploy_is_atomic_when_an_adapter_is_inactive() {
    let sender = Adapter::new("in", AdapterDirection::Sender);
    let receiver = Adapter::new("out", AdapterDirection::Receiver).inactive();
    let services = memory_services(vec![sender.clone(), receiver.clone()]).await;
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services.clone()).await;

    let err = runtime.deploy(flow.id, "ops").await.unwrap_err();
    match err {
        DeployError::AdapterNotReady { id, reason } => {
            assert_eq!(id, receiver.id, "the error must name the bad adapter");
            assert!(reason.contains("inactive"));
        }
        other => panic!("unexpected error: {}", other),
    }
    // zero side effects: nothing was started, nothing was recorded
    assert_eq!(status_of(&services, sender.id).await, AdapterStatus::Stopped);
    assert!(services.deployments.find_by_flow(flow.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deploy_rolls_back_started_adapters_on_mid_sequence_failure() {
    let sender = Adapter::new("in", AdapterDirection::Sender);
    let receiver = Adapter::new("out", AdapterDirection::Receiver);
    let inner = MemoryAdapterRegistry::new();
    inner.insert(sender.clone()).await;
    inner.insert(receiver.clone()).await;
    let services = services_over(
        Arc::new(FlakyAdapterRegistry {
            inner,
            fail_start_for: receiver.id,
        }),
        Arc::new(NullScheduler),
    );
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services.clone()).await;

    let err = runtime.deploy(flow.id, "ops").await.unwrap_err();
    match err {
        DeployError::StartFailed { id, .. } => assert_eq!(id, receiver.id),
        other => panic!("unexpected error: {}", other),
    }
    // the sender had been started and was rolled back to stopped
    assert_eq!(status_of(&services, sender.id).await, AdapterStatus::Stopped);
    assert_eq!(status_of(&services, receiver.id).await, AdapterStatus::Stopped);
    assert!(services.deployments.find_by_flow(flow.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deploy_requires_adapter_references() {
    let services = memory_services(vec![]).await;
    let mut flow = FlowDefinition::new("no-adapters");
    flow.add_node(FlowNode::new("start", NodeKind::Start));
    flow.add_node(FlowNode::new("end", NodeKind::End));
    flow.connect("start", "end");
    let runtime = runtime_for(&flow, services).await;

    let err = runtime.deploy(flow.id, "ops").await.unwrap_err();
    assert!(matches!(err, DeployError::NoAdaptersReferenced));
}

#[tokio::test]
async fn scheduler_failure_does_not_undo_the_deploy() {
    let sender = Adapter::new("in", AdapterDirection::Sender);
    let receiver = Adapter::new("out", AdapterDirection::Receiver);
    let registry = MemoryAdapterRegistry::new();
    registry.insert(sender.clone()).await;
    registry.insert(receiver.clone()).await;
    let services = services_over(Arc::new(registry), Arc::new(FailingScheduler));
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services.clone()).await;

    // logged, not propagated; adapters stay started
    runtime.deploy(flow.id, "ops").await.unwrap();
    assert_eq!(status_of(&services, sender.id).await, AdapterStatus::Started);
    assert_eq!(services.deployments.find_by_flow(flow.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn undeploy_stops_adapters_and_removes_records() {
    let sender = Adapter::new("in", AdapterDirection::Sender);
    let receiver = Adapter::new("out", AdapterDirection::Receiver);
    let services = memory_services(vec![sender.clone(), receiver.clone()]).await;
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services.clone()).await;

    runtime.deploy(flow.id, "ops").await.unwrap();
    let summary = runtime.undeploy(flow.id, "ops").await.unwrap();

    assert_eq!(summary.adapters_referenced, 2);
    assert_eq!(summary.adapters_stopped, 2);
    assert_eq!(summary.deployments_found, 1);
    assert_eq!(summary.deployments_removed, 1);
    assert_eq!(status_of(&services, sender.id).await, AdapterStatus::Stopped);
    assert_eq!(status_of(&services, receiver.id).await, AdapterStatus::Stopped);
    assert!(services.deployments.find_by_flow(flow.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn undeploy_of_an_undeployed_flow_fails_cleanly_both_times() {
    let sender = Adapter::new("in", AdapterDirection::Sender);
    let receiver = Adapter::new("out", AdapterDirection::Receiver);
    let services = memory_services(vec![sender.clone(), receiver.clone()]).await;
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services).await;

    let first = runtime.undeploy(flow.id, "ops").await.unwrap_err();
    assert!(matches!(first, DeployError::NotDeployed(got) if got == flow.id));
    // the second attempt is the same failure, not a crash
    let second = runtime.undeploy(flow.id, "ops").await.unwrap_err();
    assert!(matches!(second, DeployError::NotDeployed(got) if got == flow.id));
}

#[tokio::test]
async fn validate_deployment_reports_every_problem_without_side_effects() {
    let sender = Adapter::new("in", AdapterDirection::Sender).inactive();
    let mut receiver = Adapter::new("out", AdapterDirection::Receiver);
    receiver.status = AdapterStatus::Started;
    let services = memory_services(vec![sender.clone(), receiver.clone()]).await;
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services.clone()).await;

    let validation = runtime.validate_deployment(flow.id).await.unwrap();
    assert!(!validation.can_deploy);
    assert!(validation.errors.iter().any(|e| e.contains("inactive")));
    assert!(validation.errors.iter().any(|e| e.contains("already started")));
    assert_eq!(status_of(&services, sender.id).await, AdapterStatus::Stopped);
}

#[tokio::test]
async fn validate_deployment_passes_a_ready_flow() {
    let sender = Adapter::new("in", AdapterDirection::Sender);
    let receiver = Adapter::new("out", AdapterDirection::Receiver);
    let services = memory_services(vec![sender.clone(), receiver.clone()]).await;
    let flow = two_adapter_flow(&sender, &receiver);
    let runtime = runtime_for(&flow, services).await;

    let validation = runtime.validate_deployment(flow.id).await.unwrap();
    assert!(validation.can_deploy, "errors: {:?}", validation.errors);
    assert!(validation.errors.is_empty());
}
