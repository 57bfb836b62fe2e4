use async_trait::async_trait;
use relaycore::{keys, NodeError, NodeKind, Value};
use relayruntime::{HandlerContext, NodeHandler};
use std::collections::HashMap;

/// Delegates the actual data transfer to the adapter-execution
/// collaborator. The adapter must exist and be active; the result map is
/// tagged with the adapter's identity.
pub struct AdapterHandler;

#[async_trait]
impl NodeHandler for AdapterHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Adapter
    }

    fn describe(&self) -> &str {
        "Moves data through a configured adapter"
    }

    async fn execute(&self, ctx: HandlerContext) -> Result<HashMap<String, Value>, NodeError> {
        let adapter_id = ctx.adapter_id(keys::ADAPTER_ID)?;
        let adapter = ctx.fetch_adapter(adapter_id).await?;
        if !adapter.active {
            return Err(NodeError::AdapterInactive(adapter_id));
        }
        ctx.ensure_not_cancelled()?;

        tracing::debug!(
            adapter = %adapter_id,
            direction = %adapter.direction,
            node = %ctx.node.id,
            "delegating transfer to adapter execution"
        );
        let mut result = ctx
            .services
            .adapter_exec
            .execute(&adapter, &ctx.context, &ctx.step)
            .await?;
        result.insert(
            keys::ADAPTER_ID.to_string(),
            Value::from(adapter_id.to_string()),
        );
        result.insert(
            keys::ADAPTER_DIRECTION.to_string(),
            Value::from(adapter.direction.to_string()),
        );
        Ok(result)
    }
}
