use crate::registry::{HandlerContext, HandlerRegistry};
use crate::services::Services;
use crate::settings::EngineSettings;
use crate::worker::WorkerPool;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use relaycore::{
    keys, DeployedFlow, EngineError, ErrorDetail, EventBus, ExecutionContext, ExecutionEvent,
    ExecutionId, FlowDefinition, FlowError, FlowExecution, FlowExecutionStep, NodeError, StepStatus,
    Value,
};
use std::error::Error as _;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Interprets a flow graph at run time.
///
/// `run` never fails outward: every error becomes the terminal state of the
/// returned execution record.
pub struct FlowEngine {
    registry: Arc<HandlerRegistry>,
    services: Arc<Services>,
    bus: Arc<EventBus>,
    pool: Arc<WorkerPool>,
    settings: EngineSettings,
}

/// Per-run state shared by every branch of the walk
struct RunState {
    execution_id: ExecutionId,
    flow: Arc<FlowDefinition>,
    deployment: Option<Arc<DeployedFlow>>,
    registry: Arc<HandlerRegistry>,
    services: Arc<Services>,
    bus: Arc<EventBus>,
    pool: Arc<WorkerPool>,
    cancel: CancellationToken,
    join_timeout: std::time::Duration,
    sequence: AtomicU32,
}

impl FlowEngine {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        services: Arc<Services>,
        bus: Arc<EventBus>,
        pool: Arc<WorkerPool>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            services,
            bus,
            pool,
            settings,
        }
    }

    /// Execute a run to its terminal state.
    ///
    /// The execution record must already be persisted (PENDING) by the
    /// caller; this method owns it until it is terminal.
    pub async fn run(
        &self,
        mut execution: FlowExecution,
        flow: Arc<FlowDefinition>,
        deployment: Option<Arc<DeployedFlow>>,
        cancel: CancellationToken,
    ) -> FlowExecution {
        let started = Instant::now();
        execution.mark_running();
        if let Err(e) = self.services.runs.update_execution(&execution).await {
            tracing::error!(execution = %execution.id, error = %e, "failed to persist RUNNING state");
        }
        self.bus.emit(ExecutionEvent::ExecutionStarted {
            execution_id: execution.id,
            flow_id: execution.flow_id,
            trigger: execution.trigger,
            timestamp: Utc::now(),
        });
        tracing::info!(
            execution = %execution.id,
            flow = %flow.name,
            trigger = ?execution.trigger,
            attempt = execution.retry_attempt,
            "starting flow execution"
        );

        let outcome = self
            .drive(&execution, flow.clone(), deployment.clone(), cancel)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                execution.mark_completed(duration_ms);
                tracing::info!(execution = %execution.id, duration_ms, "flow execution completed");
            }
            Err(e) if e.is_cancelled() => {
                execution.mark_cancelled();
                execution.duration_ms = Some(duration_ms);
                tracing::info!(execution = %execution.id, "flow execution cancelled");
            }
            Err(e) => {
                let detail = match e.source() {
                    Some(cause) => {
                        ErrorDetail::new(e.kind(), e.to_string()).with_cause(cause.to_string())
                    }
                    None => ErrorDetail::new(e.kind(), e.to_string()),
                };
                tracing::error!(execution = %execution.id, error = %e, "flow execution failed");
                execution.mark_failed(e.to_string(), detail, duration_ms);
            }
        }

        // Failure is counted, not discarded: metrics and statistics are
        // folded in for every terminal state.
        execution.files_processed = self
            .services
            .runs
            .total_files_processed(execution.id)
            .await
            .unwrap_or(0);
        execution.bytes_processed = self
            .services
            .runs
            .total_bytes_processed(execution.id)
            .await
            .unwrap_or(0);
        if let Err(e) = self.services.runs.update_execution(&execution).await {
            tracing::error!(execution = %execution.id, error = %e, "failed to persist terminal state");
        }
        if let Some(deployment) = &deployment {
            if let Err(e) = self
                .services
                .deployments
                .record_execution(deployment.id, &execution)
                .await
            {
                tracing::warn!(
                    deployment = %deployment.id,
                    error = %e,
                    "failed to update deployment statistics"
                );
            }
        }
        self.bus.emit(ExecutionEvent::ExecutionFinished {
            execution_id: execution.id,
            status: execution.status,
            duration_ms,
            timestamp: Utc::now(),
        });
        execution
    }

    async fn drive(
        &self,
        execution: &FlowExecution,
        flow: Arc<FlowDefinition>,
        deployment: Option<Arc<DeployedFlow>>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        // A missing start node is recorded before any step runs
        let start = flow
            .start_node()
            .ok_or(EngineError::Flow(FlowError::MissingStartNode))?;
        let start_id = start.id.clone();

        let context = self.seed_context(execution, deployment.as_deref());
        let state = Arc::new(RunState {
            execution_id: execution.id,
            flow,
            deployment,
            registry: self.registry.clone(),
            services: self.services.clone(),
            bus: self.bus.clone(),
            pool: self.pool.clone(),
            cancel,
            join_timeout: self.settings.join_timeout,
            sequence: AtomicU32::new(0),
        });

        walk(state, start_id, context).await.map(|_| ())
    }

    /// Seed the context from the run payload plus the deployment snapshot
    fn seed_context(
        &self,
        execution: &FlowExecution,
        deployment: Option<&DeployedFlow>,
    ) -> ExecutionContext {
        let mut context = ExecutionContext::from_map(execution.payload.clone());
        context.insert(keys::EXECUTION_ID, execution.id.to_string());
        context.insert(keys::FLOW_ID, execution.flow_id.to_string());
        if let Some(correlation_id) = &execution.correlation_id {
            context.insert(keys::CORRELATION_ID, correlation_id.clone());
        }
        context.insert(
            keys::JOIN_TIMEOUT_SECS,
            self.settings.join_timeout.as_secs(),
        );
        if let Some(environment) = &self.settings.environment {
            context.insert(keys::ENVIRONMENT, environment.clone());
        }
        if let Some(deployment) = deployment {
            context.insert(
                keys::SENDER_ADAPTER_ID,
                deployment.sender_adapter_id.to_string(),
            );
            context.insert(
                keys::RECEIVER_ADAPTER_IDS,
                deployment
                    .receiver_adapter_ids
                    .iter()
                    .map(|id| Value::from(id.to_string()))
                    .collect::<Vec<_>>(),
            );
            if let Some(environment) = &deployment.environment {
                context.insert(keys::ENVIRONMENT, environment.clone());
            }
        }
        context
    }
}

/// Depth-first visit of one node and everything downstream of it.
///
/// Boxed because the recursion crosses an async boundary; the returned
/// context is the branch context after this subtree completed.
fn walk(
    state: Arc<RunState>,
    node_id: String,
    mut context: ExecutionContext,
) -> BoxFuture<'static, Result<ExecutionContext, EngineError>> {
    Box::pin(async move {
        if state.cancel.is_cancelled() {
            return Err(EngineError::Node {
                node_id,
                source: NodeError::Cancelled,
            });
        }

        let node = state
            .flow
            .node(&node_id)
            .cloned()
            .ok_or_else(|| EngineError::Flow(FlowError::NodeNotFound(node_id.clone())))?;

        let sequence = state.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut step = FlowExecutionStep::new(
            state.execution_id,
            node.id.as_str(),
            node.display_name(),
            node.kind,
            sequence,
            context.values().clone(),
        );
        step.mark_running();
        state.services.runs.create_step(&step).await?;
        state.bus.emit(ExecutionEvent::StepStarted {
            execution_id: state.execution_id,
            step_id: step.id,
            node_id: node.id.clone(),
            node_kind: node.kind,
            sequence,
            timestamp: Utc::now(),
        });
        tracing::debug!(
            execution = %state.execution_id,
            node = %node.id,
            kind = %node.kind,
            sequence,
            "executing node"
        );

        let handler = state.registry.resolve(node.kind).ok_or_else(|| {
            EngineError::Flow(FlowError::UnknownNodeKind(node.kind.to_string()))
        })?;

        let handler_ctx = HandlerContext {
            node: node.clone(),
            flow: state.flow.clone(),
            context: context.clone(),
            deployment: state.deployment.clone(),
            services: state.services.clone(),
            step: step.clone(),
            events: state.bus.create_emitter(state.execution_id, node.id.clone()),
            cancellation: state.cancel.clone(),
        };

        match handler.execute(handler_ctx).await {
            Ok(result) => {
                step.files_processed = result
                    .get(keys::FILES_PROCESSED)
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                step.bytes_processed = result
                    .get(keys::BYTES_PROCESSED)
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                step.mark_completed(result.clone());
                state.services.runs.update_step(&step).await?;
                state.bus.emit(ExecutionEvent::StepFinished {
                    execution_id: state.execution_id,
                    step_id: step.id,
                    node_id: node.id.clone(),
                    status: StepStatus::Completed,
                    timestamp: Utc::now(),
                });
                context.extend(result);
            }
            Err(source) => {
                step.mark_failed(source.to_string());
                if let Err(e) = state.services.runs.update_step(&step).await {
                    tracing::error!(step = %step.id, error = %e, "failed to persist FAILED step");
                }
                state.bus.emit(ExecutionEvent::StepFinished {
                    execution_id: state.execution_id,
                    step_id: step.id,
                    node_id: node.id.clone(),
                    status: StepStatus::Failed,
                    timestamp: Utc::now(),
                });
                // Not retried locally: the failure aborts the whole run
                return Err(EngineError::Node {
                    node_id: node.id.clone(),
                    source,
                });
            }
        }

        let mut targets: Vec<String> = state
            .flow
            .outgoing(&node.id)
            .into_iter()
            .map(String::from)
            .collect();
        if targets.is_empty() {
            Ok(context)
        } else if targets.len() == 1 {
            walk(state.clone(), targets.swap_remove(0), context).await
        } else {
            fan_out(state, targets, context).await
        }
    })
}

/// Fan out to all targets on the worker pool, each with a forked context,
/// and block until every branch finishes or the join timeout elapses
async fn fan_out(
    state: Arc<RunState>,
    targets: Vec<String>,
    context: ExecutionContext,
) -> Result<ExecutionContext, EngineError> {
    let timeout_secs = state.join_timeout.as_secs();
    tracing::debug!(
        execution = %state.execution_id,
        branches = targets.len(),
        "fanning out parallel branches"
    );

    let mut branches = FuturesUnordered::new();
    for target in targets {
        let branch_context = context.fork();
        branches.push(state.pool.spawn(walk(state.clone(), target, branch_context)));
    }

    let mut merged = context;
    let join = async {
        while let Some(joined) = branches.next().await {
            let branch = joined.map_err(|e| EngineError::Branch(e.to_string()))??;
            merged.merge(branch);
        }
        Ok::<(), EngineError>(())
    };
    let joined = timeout(state.join_timeout, join).await;
    match joined {
        Ok(Ok(())) => Ok(merged),
        Ok(Err(e)) => Err(e),
        // Branches still in flight are not forcibly cancelled, only abandoned
        Err(_) => Err(EngineError::JoinTimeout {
            seconds: timeout_secs,
        }),
    }
}
