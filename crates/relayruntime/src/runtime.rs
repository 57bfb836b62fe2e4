use crate::engine::FlowEngine;
use crate::lifecycle::AdapterLifecycle;
use crate::orchestrator::DeploymentOrchestrator;
use crate::registry::HandlerRegistry;
use crate::services::Services;
use crate::settings::EngineSettings;
use crate::worker::WorkerPool;
use relaycore::{
    DeployError, DeploymentSummary, DeploymentValidation, EventBus, ExecutionEvent, ExecutionId,
    ExecutionStatus, FlowDefinition, FlowExecution, FlowId, RelayError, StoreError, TriggerType,
    UndeploySummary, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Main entry point: wires settings, collaborators, handler registry,
/// engine, orchestrator, and lifecycle controller together
pub struct RelayRuntime {
    settings: EngineSettings,
    services: Arc<Services>,
    bus: Arc<EventBus>,
    registry: Arc<HandlerRegistry>,
    engine: Arc<FlowEngine>,
    orchestrator: Arc<DeploymentOrchestrator>,
    lifecycle: Arc<AdapterLifecycle>,
    pool: Arc<WorkerPool>,
    /// Cancellation tokens of runs currently in flight
    active: Arc<RwLock<HashMap<ExecutionId, CancellationToken>>>,
    /// Scheduled retries, removable before they fire
    retries: Arc<RwLock<HashMap<ExecutionId, JoinHandle<()>>>>,
}

impl RelayRuntime {
    pub fn new(services: Arc<Services>) -> Self {
        Self::with_registry(services, Arc::new(HandlerRegistry::new()), EngineSettings::default())
    }

    pub fn with_settings(services: Arc<Services>, settings: EngineSettings) -> Self {
        Self::with_registry(services, Arc::new(HandlerRegistry::new()), settings)
    }

    pub fn with_registry(
        services: Arc<Services>,
        registry: Arc<HandlerRegistry>,
        settings: EngineSettings,
    ) -> Self {
        let bus = Arc::new(EventBus::new(settings.event_capacity));
        let pool = Arc::new(WorkerPool::new(settings.worker_pool_size));
        let lifecycle = Arc::new(AdapterLifecycle::new(services.adapters.clone(), bus.clone()));
        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            services.clone(),
            lifecycle.clone(),
            bus.clone(),
            settings.clone(),
        ));
        let engine = Arc::new(FlowEngine::new(
            registry.clone(),
            services.clone(),
            bus.clone(),
            pool.clone(),
            settings.clone(),
        ));
        Self {
            settings,
            services,
            bus,
            registry,
            engine,
            orchestrator,
            lifecycle,
            pool,
            active: Arc::new(RwLock::new(HashMap::new())),
            retries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<AdapterLifecycle> {
        &self.lifecycle
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.bus.subscribe()
    }

    /// Submit a run for asynchronous execution.
    ///
    /// The PENDING record is persisted before handoff, so the run is
    /// immediately visible to "fire and look up later" callers; the
    /// returned handle can also be awaited directly.
    pub async fn submit(
        &self,
        flow_id: FlowId,
        trigger: TriggerType,
        payload: HashMap<String, Value>,
    ) -> Result<RunHandle, RelayError> {
        let (execution, flow, deployment) = self.prepare(flow_id, trigger, payload).await?;
        let execution_id = execution.id;
        let cancel = CancellationToken::new();
        self.active
            .write()
            .await
            .insert(execution_id, cancel.clone());

        let engine = self.engine.clone();
        let active = self.active.clone();
        let handle = self.pool.spawn(async move {
            let terminal = engine.run(execution, flow, Some(deployment), cancel).await;
            active.write().await.remove(&execution_id);
            terminal
        });
        Ok(RunHandle {
            execution_id,
            handle,
        })
    }

    /// Run a flow and wait for the terminal execution record
    pub async fn execute(
        &self,
        flow_id: FlowId,
        trigger: TriggerType,
        payload: HashMap<String, Value>,
    ) -> Result<FlowExecution, RelayError> {
        self.submit(flow_id, trigger, payload).await?.join().await
    }

    /// Retry a failed run under its original identity: prior steps are
    /// deleted, the attempt counter is bumped, and the run goes back
    /// through PENDING before executing again.
    pub async fn retry(&self, execution_id: ExecutionId) -> Result<FlowExecution, RelayError> {
        if let Some(ticket) = self.retries.write().await.remove(&execution_id) {
            ticket.abort();
        }
        run_retry(
            self.services.clone(),
            self.engine.clone(),
            self.active.clone(),
            execution_id,
        )
        .await
    }

    /// Schedule a retry after `delay`, leaving the run in RETRY_PENDING.
    /// Cancelling the run before the delay elapses removes the scheduled
    /// retry.
    pub async fn schedule_retry(
        &self,
        execution_id: ExecutionId,
        delay: Duration,
    ) -> Result<(), RelayError> {
        let mut execution = self.find_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Failed {
            return Err(RelayError::NotRetryable {
                id: execution_id,
                status: execution.status,
            });
        }
        execution.status = ExecutionStatus::RetryPending;
        self.services.runs.update_execution(&execution).await?;

        let services = self.services.clone();
        let engine = self.engine.clone();
        let active = self.active.clone();
        let retries = self.retries.clone();
        let ticket = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            retries.write().await.remove(&execution_id);
            if let Err(e) = run_retry(services, engine, active, execution_id).await {
                tracing::error!(execution = %execution_id, error = %e, "scheduled retry failed");
            }
        });
        self.retries.write().await.insert(execution_id, ticket);
        tracing::info!(execution = %execution_id, delay_secs = delay.as_secs(), "retry scheduled");
        Ok(())
    }

    /// Cooperative cancellation: transitions the run and any RUNNING steps,
    /// but never interrupts a handler already executing. A RETRY_PENDING
    /// run is cancelled by removing its scheduled retry.
    pub async fn cancel(&self, execution_id: ExecutionId) -> Result<FlowExecution, RelayError> {
        let mut execution = self.find_execution(execution_id).await?;
        match execution.status {
            ExecutionStatus::RetryPending => {
                if let Some(ticket) = self.retries.write().await.remove(&execution_id) {
                    ticket.abort();
                }
                execution.mark_cancelled();
                self.services.runs.update_execution(&execution).await?;
                tracing::info!(execution = %execution_id, "scheduled retry removed, run cancelled");
            }
            ExecutionStatus::Pending | ExecutionStatus::Running => {
                if let Some(token) = self.active.read().await.get(&execution_id) {
                    token.cancel();
                }
                let steps = self.services.runs.steps_for_execution(execution_id).await?;
                for mut step in steps {
                    if step.status == relaycore::StepStatus::Running {
                        step.mark_cancelled();
                        self.services.runs.update_step(&step).await?;
                    }
                }
                execution.mark_cancelled();
                self.services.runs.update_execution(&execution).await?;
                tracing::info!(execution = %execution_id, "run cancelled");
            }
            _ => {
                tracing::debug!(
                    execution = %execution_id,
                    status = %execution.status,
                    "cancel is a no-op on a terminal run"
                );
            }
        }
        Ok(execution)
    }

    pub async fn deploy(
        &self,
        flow_id: FlowId,
        actor: &str,
    ) -> Result<DeploymentSummary, DeployError> {
        self.orchestrator.deploy(flow_id, actor).await
    }

    pub async fn undeploy(
        &self,
        flow_id: FlowId,
        actor: &str,
    ) -> Result<UndeploySummary, DeployError> {
        self.orchestrator.undeploy(flow_id, actor).await
    }

    pub async fn validate_deployment(
        &self,
        flow_id: FlowId,
    ) -> Result<DeploymentValidation, DeployError> {
        self.orchestrator.validate_deployment(flow_id).await
    }

    async fn find_execution(&self, id: ExecutionId) -> Result<FlowExecution, RelayError> {
        find_execution(&self.services, id).await
    }

    async fn prepare(
        &self,
        flow_id: FlowId,
        trigger: TriggerType,
        payload: HashMap<String, Value>,
    ) -> Result<(FlowExecution, Arc<FlowDefinition>, Arc<relaycore::DeployedFlow>), RelayError>
    {
        let (flow, deployment) = deployment_for(&self.services, flow_id).await?;
        let mut execution = FlowExecution::new(flow_id, trigger, payload);
        execution.deployment_id = Some(deployment.id);
        execution.correlation_id = Some(Uuid::new_v4().to_string());
        self.services.runs.create_execution(&execution).await?;
        Ok((execution, flow, deployment))
    }
}

async fn find_execution(
    services: &Arc<Services>,
    id: ExecutionId,
) -> Result<FlowExecution, RelayError> {
    match services.runs.find_execution(id).await {
        Ok(execution) => Ok(execution),
        Err(StoreError::NotFound(_)) => Err(RelayError::ExecutionNotFound(id)),
        Err(e) => Err(e.into()),
    }
}

/// A run always executes against the deployment's immutable snapshot
async fn deployment_for(
    services: &Arc<Services>,
    flow_id: FlowId,
) -> Result<(Arc<FlowDefinition>, Arc<relaycore::DeployedFlow>), RelayError> {
    let deployment = services
        .deployments
        .find_by_flow(flow_id)
        .await?
        .into_iter()
        .next()
        .ok_or(RelayError::Deploy(DeployError::NotDeployed(flow_id)))?;
    let flow = Arc::new(deployment.flow_snapshot.clone());
    Ok((flow, Arc::new(deployment)))
}

/// Shared by the public retry and the scheduled-retry task
async fn run_retry(
    services: Arc<Services>,
    engine: Arc<FlowEngine>,
    active: Arc<RwLock<HashMap<ExecutionId, CancellationToken>>>,
    execution_id: ExecutionId,
) -> Result<FlowExecution, RelayError> {
    let mut execution = find_execution(&services, execution_id).await?;
    if !matches!(
        execution.status,
        ExecutionStatus::Failed | ExecutionStatus::RetryPending
    ) {
        return Err(RelayError::NotRetryable {
            id: execution_id,
            status: execution.status,
        });
    }

    let deleted = services.runs.delete_steps(execution_id).await?;
    tracing::info!(
        execution = %execution_id,
        deleted_steps = deleted,
        attempt = execution.retry_attempt + 1,
        "retrying flow execution"
    );
    execution.reset_for_retry();
    services.runs.update_execution(&execution).await?;

    let (flow, deployment) = deployment_for(&services, execution.flow_id).await?;
    let cancel = CancellationToken::new();
    active.write().await.insert(execution_id, cancel.clone());
    let terminal = engine.run(execution, flow, Some(deployment), cancel).await;
    active.write().await.remove(&execution_id);
    Ok(terminal)
}

/// Handle to an in-flight run submitted through `RelayRuntime::submit`
pub struct RunHandle {
    pub execution_id: ExecutionId,
    handle: JoinHandle<FlowExecution>,
}

impl RunHandle {
    pub async fn join(self) -> Result<FlowExecution, RelayError> {
        self.handle
            .await
            .map_err(|e| RelayError::TaskJoin(e.to_string()))
    }
}
