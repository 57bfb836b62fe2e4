//! In-memory collaborator implementations
//!
//! Backing stores for tests and the CLI. Everything lives in
//! `tokio::sync::RwLock`-guarded maps; the write-lock scope of
//! `update_status` is what makes it the atomic status write.

use crate::adapter::{Adapter, AdapterId, AdapterStatus};
use crate::collab::{
    AdapterExecution, AdapterRegistry, DeploymentStore, FlowStore, RunStore, Scheduler,
    SchedulerError, UtilityExecution,
};
use crate::context::{keys, ExecutionContext};
use crate::deployment::{DeployedFlow, DeploymentId};
use crate::error::{NodeError, StoreError};
use crate::execution::{ExecutionId, FlowExecution, FlowExecutionStep};
use crate::flow::{FlowDefinition, FlowId};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryAdapterRegistry {
    adapters: RwLock<HashMap<AdapterId, Adapter>>,
}

impl MemoryAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, adapter: Adapter) {
        self.adapters.write().await.insert(adapter.id, adapter);
    }
}

#[async_trait]
impl AdapterRegistry for MemoryAdapterRegistry {
    async fn get(&self, id: AdapterId) -> Result<Adapter, StoreError> {
        self.adapters
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("adapter {}", id)))
    }

    async fn list(&self) -> Result<Vec<Adapter>, StoreError> {
        Ok(self.adapters.read().await.values().cloned().collect())
    }

    async fn update_status(
        &self,
        id: AdapterId,
        status: AdapterStatus,
    ) -> Result<Adapter, StoreError> {
        let mut adapters = self.adapters.write().await;
        let adapter = adapters
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("adapter {}", id)))?;
        adapter.status = status;
        Ok(adapter.clone())
    }

    async fn set_active(&self, id: AdapterId, active: bool) -> Result<Adapter, StoreError> {
        let mut adapters = self.adapters.write().await;
        let adapter = adapters
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("adapter {}", id)))?;
        adapter.active = active;
        Ok(adapter.clone())
    }
}

#[derive(Default)]
pub struct MemoryFlowStore {
    flows: RwLock<HashMap<FlowId, FlowDefinition>>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn get(&self, id: FlowId) -> Result<FlowDefinition, StoreError> {
        self.flows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("flow {}", id)))
    }

    async fn put(&self, flow: FlowDefinition) -> Result<(), StoreError> {
        self.flows.write().await.insert(flow.id, flow);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FlowDefinition>, StoreError> {
        Ok(self.flows.read().await.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryDeploymentStore {
    deployments: RwLock<HashMap<DeploymentId, DeployedFlow>>,
}

impl MemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn insert(&self, deployment: DeployedFlow) -> Result<(), StoreError> {
        let mut deployments = self.deployments.write().await;
        if deployments.contains_key(&deployment.id) {
            return Err(StoreError::Conflict(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }
        deployments.insert(deployment.id, deployment);
        Ok(())
    }

    async fn get(&self, id: DeploymentId) -> Result<DeployedFlow, StoreError> {
        self.deployments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("deployment {}", id)))
    }

    async fn find_by_flow(&self, flow_id: FlowId) -> Result<Vec<DeployedFlow>, StoreError> {
        Ok(self
            .deployments
            .read()
            .await
            .values()
            .filter(|d| d.flow_id == flow_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: DeploymentId) -> Result<(), StoreError> {
        self.deployments
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("deployment {}", id)))
    }

    async fn list(&self) -> Result<Vec<DeployedFlow>, StoreError> {
        Ok(self.deployments.read().await.values().cloned().collect())
    }

    async fn record_execution(
        &self,
        id: DeploymentId,
        execution: &FlowExecution,
    ) -> Result<(), StoreError> {
        let mut deployments = self.deployments.write().await;
        let deployment = deployments
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("deployment {}", id)))?;
        deployment.stats.record(execution);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRunStore {
    executions: RwLock<HashMap<ExecutionId, FlowExecution>>,
    steps: RwLock<HashMap<ExecutionId, Vec<FlowExecutionStep>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_execution(&self, execution: &FlowExecution) -> Result<(), StoreError> {
        self.executions
            .write()
            .await
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &FlowExecution) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        if !executions.contains_key(&execution.id) {
            return Err(StoreError::NotFound(format!("execution {}", execution.id)));
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn find_execution(&self, id: ExecutionId) -> Result<FlowExecution, StoreError> {
        self.executions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("execution {}", id)))
    }

    async fn create_step(&self, step: &FlowExecutionStep) -> Result<(), StoreError> {
        self.steps
            .write()
            .await
            .entry(step.execution_id)
            .or_default()
            .push(step.clone());
        Ok(())
    }

    async fn update_step(&self, step: &FlowExecutionStep) -> Result<(), StoreError> {
        let mut steps = self.steps.write().await;
        let for_execution = steps
            .get_mut(&step.execution_id)
            .ok_or_else(|| StoreError::NotFound(format!("execution {}", step.execution_id)))?;
        let slot = for_execution
            .iter_mut()
            .find(|s| s.id == step.id)
            .ok_or_else(|| StoreError::NotFound(format!("step {}", step.id)))?;
        *slot = step.clone();
        Ok(())
    }

    async fn steps_for_execution(
        &self,
        id: ExecutionId,
    ) -> Result<Vec<FlowExecutionStep>, StoreError> {
        let mut steps = self
            .steps
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default();
        steps.sort_by_key(|s| s.sequence);
        Ok(steps)
    }

    async fn delete_steps(&self, id: ExecutionId) -> Result<usize, StoreError> {
        Ok(self
            .steps
            .write()
            .await
            .remove(&id)
            .map(|s| s.len())
            .unwrap_or(0))
    }

    async fn total_files_processed(&self, id: ExecutionId) -> Result<u64, StoreError> {
        Ok(self
            .steps
            .read()
            .await
            .get(&id)
            .map(|steps| steps.iter().map(|s| s.files_processed).sum())
            .unwrap_or(0))
    }

    async fn total_bytes_processed(&self, id: ExecutionId) -> Result<u64, StoreError> {
        Ok(self
            .steps
            .read()
            .await
            .get(&id)
            .map(|steps| steps.iter().map(|s| s.bytes_processed).sum())
            .unwrap_or(0))
    }
}

/// Scheduler that registers nothing; scheduled triggering belongs to the
/// enclosing service layer
#[derive(Default)]
pub struct NullScheduler;

#[async_trait]
impl Scheduler for NullScheduler {
    async fn on_flow_deployed(&self, deployment: &DeployedFlow) -> Result<(), SchedulerError> {
        tracing::debug!(deployment = %deployment.id, "null scheduler: deploy registration skipped");
        Ok(())
    }

    async fn on_flow_undeployed(&self, deployment_id: DeploymentId) -> Result<(), SchedulerError> {
        tracing::debug!(deployment = %deployment_id, "null scheduler: deregistration skipped");
        Ok(())
    }
}

/// Adapter execution that moves no bytes: it reports the queued files as
/// transferred, summing any `size` fields for the byte count
#[derive(Default)]
pub struct EchoAdapterExecution;

fn file_metrics(files: Option<&Value>) -> (u64, u64) {
    let Some(files) = files.and_then(Value::as_array) else {
        return (0, 0);
    };
    let bytes = files
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|f| f.get("size").and_then(Value::as_u64))
        .sum();
    (files.len() as u64, bytes)
}

#[async_trait]
impl AdapterExecution for EchoAdapterExecution {
    async fn execute(
        &self,
        adapter: &Adapter,
        context: &ExecutionContext,
        _step: &FlowExecutionStep,
    ) -> Result<HashMap<String, Value>, NodeError> {
        let (files, bytes) = file_metrics(
            context
                .get(keys::RECEIVER_FILES)
                .or_else(|| context.get(keys::FILES_TO_PROCESS)),
        );
        tracing::debug!(adapter = %adapter.id, files, bytes, "echo adapter execution");
        let mut result = HashMap::new();
        result.insert(keys::FILES_PROCESSED.to_string(), Value::from(files));
        result.insert(keys::BYTES_PROCESSED.to_string(), Value::from(bytes));
        Ok(result)
    }
}

/// Utility execution that performs no payload processing and passes the
/// file list through untouched
#[derive(Default)]
pub struct EchoUtilityExecution;

#[async_trait]
impl UtilityExecution for EchoUtilityExecution {
    async fn execute(
        &self,
        utility_type: &str,
        _config: &HashMap<String, Value>,
        context: &ExecutionContext,
        _step: &FlowExecutionStep,
    ) -> Result<HashMap<String, Value>, NodeError> {
        tracing::debug!(utility_type, "echo utility execution");
        let mut result = HashMap::new();
        result.insert(keys::UTILITY_TYPE.to_string(), Value::from(utility_type));
        if let Some(files) = context.get(keys::FILES_TO_PROCESS) {
            result.insert(keys::FILES_TO_PROCESS.to_string(), files.clone());
        }
        Ok(result)
    }
}
