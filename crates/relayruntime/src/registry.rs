use crate::services::Services;
use async_trait::async_trait;
use relaycore::{
    Adapter, AdapterId, DeployedFlow, EventEmitter, ExecutionContext, FlowDefinition,
    FlowExecutionStep, FlowNode, NodeError, NodeKind, StoreError, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One node behavior, dispatched by kind through the registry.
///
/// Handlers consume the branch context and return a result map the engine
/// merges back for all subsequent nodes on that path.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn kind(&self) -> NodeKind;

    /// One-line description for operator tooling
    fn describe(&self) -> &str {
        ""
    }

    async fn execute(&self, ctx: HandlerContext) -> Result<HashMap<String, Value>, NodeError>;
}

/// Everything a handler may need for one dispatch, owned per invocation
pub struct HandlerContext {
    pub node: FlowNode,
    pub flow: Arc<FlowDefinition>,
    pub context: ExecutionContext,
    pub deployment: Option<Arc<DeployedFlow>>,
    pub services: Arc<Services>,
    pub step: FlowExecutionStep,
    pub events: EventEmitter,
    pub cancellation: CancellationToken,
}

impl HandlerContext {
    pub fn data(&self, key: &str) -> Option<&Value> {
        self.node.data.get(key)
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.node.data.get(key).and_then(Value::as_str)
    }

    /// Get required node data or return error
    pub fn require_data(&self, key: &str) -> Result<&Value, NodeError> {
        self.node
            .data
            .get(key)
            .ok_or_else(|| NodeError::MissingData(key.to_string()))
    }

    pub fn require_data_str(&self, key: &str) -> Result<&str, NodeError> {
        self.require_data(key)?
            .as_str()
            .ok_or_else(|| NodeError::InvalidData {
                field: key.to_string(),
                reason: "expected a string".to_string(),
            })
    }

    /// Parse an adapter id out of node data
    pub fn adapter_id(&self, key: &str) -> Result<AdapterId, NodeError> {
        self.require_data_str(key)?
            .parse()
            .map_err(|_| NodeError::InvalidData {
                field: key.to_string(),
                reason: "expected an adapter id".to_string(),
            })
    }

    /// Load an adapter record, mapping a missing record to the node-level
    /// not-found error
    pub async fn fetch_adapter(&self, id: AdapterId) -> Result<Adapter, NodeError> {
        match self.services.adapters.get(id).await {
            Ok(adapter) => Ok(adapter),
            Err(StoreError::NotFound(_)) => Err(NodeError::AdapterNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Cooperative cancellation point for handlers with long operations
    pub fn ensure_not_cancelled(&self) -> Result<(), NodeError> {
        if self.cancellation.is_cancelled() {
            Err(NodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Registry of node handlers keyed by node kind
pub struct HandlerRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let kind = handler.kind();
        tracing::info!(%kind, "registering node handler");
        self.handlers.insert(kind, handler);
    }

    pub fn resolve(&self, kind: NodeKind) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<NodeKind> {
        self.handlers.keys().copied().collect()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn NodeHandler>> {
        self.handlers.values()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
