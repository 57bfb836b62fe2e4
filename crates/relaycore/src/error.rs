use crate::adapter::AdapterId;
use crate::flow::FlowId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(crate::execution::ExecutionId),

    #[error("Execution {id} is {status} and cannot be retried")]
    NotRetryable {
        id: crate::execution::ExecutionId,
        status: crate::execution::ExecutionStatus,
    },

    #[error("Run task join error: {0}")]
    TaskJoin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Structural/configuration problems with a flow definition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("Flow graph has no nodes")]
    EmptyGraph,

    #[error("Flow has no start node")]
    MissingStartNode,

    #[error("Flow has {0} start nodes, expected exactly one")]
    MultipleStartNodes(usize),

    #[error("Edge {from} -> {target} references unknown node '{missing}'")]
    DanglingEdge {
        from: String,
        target: String,
        missing: String,
    },

    #[error("Flow graph contains a cycle")]
    CyclicGraph,

    #[error("Node not found in flow: {0}")]
    NodeNotFound(String),

    #[error("No handler registered for node kind '{0}'")]
    UnknownNodeKind(String),
}

/// Adapter lookup and lifecycle violations
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("Adapter not found: {0}")]
    NotFound(AdapterId),

    #[error("Adapter {0} is inactive and cannot be started")]
    Inactive(AdapterId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Deployment orchestration failures
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Flow {0} is already deployed")]
    AlreadyDeployed(FlowId),

    #[error("Flow {0} is not currently deployed")]
    NotDeployed(FlowId),

    #[error("Flow not found: {0}")]
    FlowNotFound(FlowId),

    #[error("Deployment validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("Flow references no adapters")]
    NoAdaptersReferenced,

    #[error("Flow references no sender adapter")]
    NoSenderAdapter,

    #[error("Adapter {id} is not ready: {reason}")]
    AdapterNotReady { id: AdapterId, reason: String },

    #[error("Failed to start adapter {id}: {source}")]
    StartFailed {
        id: AdapterId,
        #[source]
        source: AdapterError,
    },

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures raised by node handlers; these abort the enclosing run
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required node data: {0}")]
    MissingData(String),

    #[error("Invalid node data for '{field}': {reason}")]
    InvalidData { field: String, reason: String },

    #[error("Adapter not found: {0}")]
    AdapterNotFound(AdapterId),

    #[error("Adapter {0} is inactive")]
    AdapterInactive(AdapterId),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Internal engine propagation; converted into the terminal run state and
/// never escaping `FlowEngine::run`
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Node '{node_id}' failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Parallel branch join timed out after {seconds}s")]
    JoinTimeout { seconds: u64 },

    #[error("Branch task failed: {0}")]
    Branch(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Error taxonomy label recorded into `ErrorDetail.kind`
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Node { .. } => "node",
            EngineError::Flow(_) => "configuration",
            EngineError::JoinTimeout { .. } => "join-timeout",
            EngineError::Branch(_) => "branch",
            EngineError::Store(_) => "store",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            EngineError::Node {
                source: NodeError::Cancelled,
                ..
            }
        )
    }
}

/// Collaborator persistence failures
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
