use crate::adapter::{AdapterId, AdapterStatus};
use crate::deployment::DeploymentId;
use crate::execution::{ExecutionId, ExecutionStatus, StepId, StepStatus, TriggerType};
use crate::flow::{FlowId, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Notifications pushed during execution and orchestration.
///
/// Fan-out is fire-and-forget: emitting with no live subscribers is not an
/// error, and a bus failure can never fail a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        flow_id: FlowId,
        trigger: TriggerType,
        timestamp: DateTime<Utc>,
    },
    ExecutionFinished {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        execution_id: ExecutionId,
        step_id: StepId,
        node_id: String,
        node_kind: NodeKind,
        sequence: u32,
        timestamp: DateTime<Utc>,
    },
    StepFinished {
        execution_id: ExecutionId,
        step_id: StepId,
        node_id: String,
        status: StepStatus,
        timestamp: DateTime<Utc>,
    },
    AdapterStatusChanged {
        adapter_id: AdapterId,
        status: AdapterStatus,
        timestamp: DateTime<Utc>,
    },
    FlowDeployed {
        deployment_id: DeploymentId,
        flow_id: FlowId,
        timestamp: DateTime<Utc>,
    },
    FlowUndeployed {
        flow_id: FlowId,
        deployments_removed: usize,
        timestamp: DateTime<Utc>,
    },
    StepEvent {
        execution_id: ExecutionId,
        node_id: String,
        event: StepEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events a node handler can push mid-step for live dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StepEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Handle node handlers use to push step-scoped events
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    node_id: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        node_id: String,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            node_id,
            sender,
        }
    }

    pub fn emit(&self, event: StepEvent) {
        let _ = self.sender.send(ExecutionEvent::StepEvent {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(StepEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(StepEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(StepEvent::Progress { percent, message });
    }
}

/// Global notification bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, node_id: String) -> EventEmitter {
        EventEmitter::new(execution_id, node_id, self.sender.clone())
    }
}
