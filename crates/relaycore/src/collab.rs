use crate::adapter::{Adapter, AdapterId, AdapterStatus};
use crate::context::ExecutionContext;
use crate::deployment::{DeployedFlow, DeploymentId};
use crate::error::{NodeError, StoreError};
use crate::execution::{ExecutionId, FlowExecution, FlowExecutionStep};
use crate::flow::{FlowDefinition, FlowId};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Persisted adapter records. `update_status` is the single atomic status
/// write the whole system goes through.
#[async_trait]
pub trait AdapterRegistry: Send + Sync {
    async fn get(&self, id: AdapterId) -> Result<Adapter, StoreError>;

    async fn list(&self) -> Result<Vec<Adapter>, StoreError>;

    /// Atomically replace the status, returning the updated record
    async fn update_status(&self, id: AdapterId, status: AdapterStatus)
        -> Result<Adapter, StoreError>;

    async fn set_active(&self, id: AdapterId, active: bool) -> Result<Adapter, StoreError>;
}

/// Persisted flow definitions
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn get(&self, id: FlowId) -> Result<FlowDefinition, StoreError>;

    async fn put(&self, flow: FlowDefinition) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<FlowDefinition>, StoreError>;
}

/// Persisted deployment records
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn insert(&self, deployment: DeployedFlow) -> Result<(), StoreError>;

    async fn get(&self, id: DeploymentId) -> Result<DeployedFlow, StoreError>;

    async fn find_by_flow(&self, flow_id: FlowId) -> Result<Vec<DeployedFlow>, StoreError>;

    async fn delete(&self, id: DeploymentId) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<DeployedFlow>, StoreError>;

    /// Fold a terminal run into the deployment's rolling statistics
    async fn record_execution(
        &self,
        id: DeploymentId,
        execution: &FlowExecution,
    ) -> Result<(), StoreError>;
}

/// Persistence for runs and their steps, plus the aggregate metric queries
/// the engine folds into terminal run records
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_execution(&self, execution: &FlowExecution) -> Result<(), StoreError>;

    async fn update_execution(&self, execution: &FlowExecution) -> Result<(), StoreError>;

    async fn find_execution(&self, id: ExecutionId) -> Result<FlowExecution, StoreError>;

    async fn create_step(&self, step: &FlowExecutionStep) -> Result<(), StoreError>;

    async fn update_step(&self, step: &FlowExecutionStep) -> Result<(), StoreError>;

    /// Steps of a run ordered by sequence
    async fn steps_for_execution(
        &self,
        id: ExecutionId,
    ) -> Result<Vec<FlowExecutionStep>, StoreError>;

    /// Remove all step records of a run (retry regenerates them), returning
    /// how many were deleted
    async fn delete_steps(&self, id: ExecutionId) -> Result<usize, StoreError>;

    async fn total_files_processed(&self, id: ExecutionId) -> Result<u64, StoreError>;

    async fn total_bytes_processed(&self, id: ExecutionId) -> Result<u64, StoreError>;
}

/// Performs the actual data transfer for an adapter node. Errors propagate
/// as node-handler failures and abort the run.
#[async_trait]
pub trait AdapterExecution: Send + Sync {
    async fn execute(
        &self,
        adapter: &Adapter,
        context: &ExecutionContext,
        step: &FlowExecutionStep,
    ) -> Result<HashMap<String, Value>, NodeError>;
}

/// Runs a utility payload processor (compression, PGP, ...) against the
/// current context
#[async_trait]
pub trait UtilityExecution: Send + Sync {
    async fn execute(
        &self,
        utility_type: &str,
        config: &HashMap<String, Value>,
        context: &ExecutionContext,
        step: &FlowExecutionStep,
    ) -> Result<HashMap<String, Value>, NodeError>;
}

#[derive(Error, Debug, Clone)]
#[error("Scheduler error: {0}")]
pub struct SchedulerError(pub String);

/// Registers and removes recurring triggers for deployments. Failures are
/// logged by the orchestrator and never unwind a deploy or undeploy.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn on_flow_deployed(&self, deployment: &DeployedFlow) -> Result<(), SchedulerError>;

    async fn on_flow_undeployed(&self, deployment_id: DeploymentId) -> Result<(), SchedulerError>;
}
