use crate::adapter::AdapterId;
use crate::execution::{ExecutionStatus, FlowExecution};
use crate::flow::{FlowDefinition, FlowId};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type DeploymentId = Uuid;

/// The binding of one flow version to live adapters.
///
/// The flow graph and every bound adapter's configuration are snapshotted at
/// deploy time; later edits to the source records never affect a running
/// deployment. Destroyed by undeploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedFlow {
    pub id: DeploymentId,
    pub flow_id: FlowId,
    pub flow_version: u32,
    pub status: DeploymentStatus,
    pub sender_adapter_id: AdapterId,
    pub receiver_adapter_ids: Vec<AdapterId>,
    pub flow_snapshot: FlowDefinition,
    pub adapter_snapshots: HashMap<AdapterId, HashMap<String, Value>>,
    pub environment: Option<String>,
    pub deployed_by: String,
    pub deployed_at: DateTime<Utc>,
    pub stats: DeploymentStats,
}

/// A deployment record only exists while the binding is live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Active,
}

/// Rolling statistics and health counters, folded in after every run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentStats {
    pub executions: u64,
    pub completed: u64,
    pub failed: u64,
    pub files_processed: u64,
    pub bytes_processed: u64,
    pub last_execution_at: Option<DateTime<Utc>>,
    pub last_status: Option<ExecutionStatus>,
}

impl DeploymentStats {
    /// Fold one terminal run into the counters. Failures are counted, not
    /// discarded.
    pub fn record(&mut self, execution: &FlowExecution) {
        self.executions += 1;
        match execution.status {
            ExecutionStatus::Completed => self.completed += 1,
            ExecutionStatus::Failed => self.failed += 1,
            _ => {}
        }
        self.files_processed += execution.files_processed;
        self.bytes_processed += execution.bytes_processed;
        self.last_execution_at = execution.finished_at.or(Some(Utc::now()));
        self.last_status = Some(execution.status);
    }
}

/// Returned by a successful deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub deployment_id: DeploymentId,
    pub flow_id: FlowId,
    pub flow_version: u32,
    pub adapters_started: Vec<AdapterId>,
    pub deployed_at: DateTime<Utc>,
}

/// Returned by undeploy. The call succeeds even on partial failure; callers
/// detect it by comparing the counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndeploySummary {
    pub flow_id: FlowId,
    pub adapters_stopped: usize,
    pub adapters_referenced: usize,
    pub deployments_removed: usize,
    pub deployments_found: usize,
}

/// Outcome of `validate_deployment`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentValidation {
    pub can_deploy: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}
