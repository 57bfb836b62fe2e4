use async_trait::async_trait;
use relaycore::{keys, NodeError, NodeKind, Value};
use relayruntime::{HandlerContext, NodeHandler};
use std::collections::HashMap;

/// Metadata-only marker node. The engine's generic multi-edge rule performs
/// the actual fan-out; this handler just reports what is about to happen.
pub struct ParallelSplitHandler;

#[async_trait]
impl NodeHandler for ParallelSplitHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::ParallelSplit
    }

    fn describe(&self) -> &str {
        "Marks a fan-out point for parallel branches"
    }

    async fn execute(&self, ctx: HandlerContext) -> Result<HashMap<String, Value>, NodeError> {
        let queued = ctx
            .context
            .get(keys::FILES_TO_PROCESS)
            .and_then(Value::as_array)
            .map(<[Value]>::len)
            .unwrap_or(0);
        let paths = ctx.flow.outgoing(&ctx.node.id).len();
        ctx.events.info(format!(
            "{} files queued across {} parallel paths",
            queued, paths
        ));

        let mut result = HashMap::new();
        result.insert("queuedFiles".to_string(), Value::from(queued as u64));
        result.insert("parallelPaths".to_string(), Value::from(paths as u64));
        Ok(result)
    }
}
