use crate::deployment::DeploymentId;
use crate::flow::{FlowId, NodeKind};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type ExecutionId = Uuid;
pub type StepId = Uuid;

/// What caused a run to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Retry,
}

/// Run status state machine:
/// `Pending -> Running -> { Completed, Failed, Cancelled } | RetryPending`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    RetryPending,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
            ExecutionStatus::RetryPending => "RETRY_PENDING",
        };
        write!(f, "{}", s)
    }
}

/// Step status state machine:
/// `Pending -> Running -> { Completed, Failed, Cancelled }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Structured failure detail attached to a FAILED run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
    pub cause: Option<String>,
}

impl ErrorDetail {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            at: Utc::now(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// One end-to-end invocation of a deployed flow.
///
/// Owned exclusively by the engine while running; monitoring collaborators
/// read it afterwards through the run store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowExecution {
    pub id: ExecutionId,
    pub flow_id: FlowId,
    pub deployment_id: Option<DeploymentId>,
    pub trigger: TriggerType,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    pub correlation_id: Option<String>,
    pub retry_attempt: u32,
    pub error: Option<String>,
    pub error_detail: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub files_processed: u64,
    pub bytes_processed: u64,
}

impl FlowExecution {
    pub fn new(flow_id: FlowId, trigger: TriggerType, payload: HashMap<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow_id,
            deployment_id: None,
            trigger,
            status: ExecutionStatus::Pending,
            payload,
            correlation_id: None,
            retry_attempt: 0,
            error: None,
            error_detail: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            deadline: None,
            duration_ms: None,
            files_processed: 0,
            bytes_processed: 0,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, duration_ms: u64) {
        self.status = ExecutionStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
    }

    pub fn mark_failed(&mut self, message: impl Into<String>, detail: ErrorDetail, duration_ms: u64) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(message.into());
        self.error_detail = Some(detail);
        self.finished_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
    }

    pub fn mark_cancelled(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Reset for a retry attempt: same identity, cleared outcome, bumped
    /// attempt counter. Step records are deleted separately by the caller.
    pub fn reset_for_retry(&mut self) {
        self.trigger = TriggerType::Retry;
        self.status = ExecutionStatus::Pending;
        self.retry_attempt += 1;
        self.error = None;
        self.error_detail = None;
        self.started_at = None;
        self.finished_at = None;
        self.duration_ms = None;
        self.files_processed = 0;
        self.bytes_processed = 0;
    }
}

/// Record of one node's execution within a run. Append-only; a retry deletes
/// and regenerates the whole set for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowExecutionStep {
    pub id: StepId,
    pub execution_id: ExecutionId,
    pub node_id: String,
    pub node_name: String,
    pub node_kind: NodeKind,
    pub sequence: u32,
    pub status: StepStatus,
    #[serde(default)]
    pub input: HashMap<String, Value>,
    #[serde(default)]
    pub output: HashMap<String, Value>,
    pub error: Option<String>,
    pub files_processed: u64,
    pub bytes_processed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FlowExecutionStep {
    pub fn new(
        execution_id: ExecutionId,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        node_kind: NodeKind,
        sequence: u32,
        input: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            node_id: node_id.into(),
            node_name: node_name.into(),
            node_kind,
            sequence,
            status: StepStatus::Pending,
            input,
            output: HashMap::new(),
            error: None,
            files_processed: 0,
            bytes_processed: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, output: HashMap<String, Value>) {
        self.status = StepStatus::Completed;
        self.output = output;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = StepStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }
}
