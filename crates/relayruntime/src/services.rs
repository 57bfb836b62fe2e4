use relaycore::memory::{
    EchoAdapterExecution, EchoUtilityExecution, MemoryAdapterRegistry, MemoryDeploymentStore,
    MemoryFlowStore, MemoryRunStore, NullScheduler,
};
use relaycore::{
    AdapterExecution, AdapterRegistry, DeploymentStore, FlowStore, RunStore, Scheduler,
    UtilityExecution,
};
use std::sync::Arc;

/// The collaborator handle set threaded through the engine and orchestrator.
///
/// Implementations are external; the engine only sees these trait objects.
pub struct Services {
    pub adapters: Arc<dyn AdapterRegistry>,
    pub flows: Arc<dyn FlowStore>,
    pub deployments: Arc<dyn DeploymentStore>,
    pub runs: Arc<dyn RunStore>,
    pub adapter_exec: Arc<dyn AdapterExecution>,
    pub utility_exec: Arc<dyn UtilityExecution>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl Services {
    /// Fully in-memory collaborator set for tests and the CLI
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self {
            adapters: Arc::new(MemoryAdapterRegistry::new()),
            flows: Arc::new(MemoryFlowStore::new()),
            deployments: Arc::new(MemoryDeploymentStore::new()),
            runs: Arc::new(MemoryRunStore::new()),
            adapter_exec: Arc::new(EchoAdapterExecution),
            utility_exec: Arc::new(EchoUtilityExecution),
            scheduler: Arc::new(NullScheduler),
        })
    }
}
