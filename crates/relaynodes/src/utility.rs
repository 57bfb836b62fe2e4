use async_trait::async_trait;
use relaycore::{keys, NodeError, NodeKind, Value};
use relayruntime::{HandlerContext, NodeHandler};
use std::collections::HashMap;

/// Delegates payload processing (compression, PGP, ...) to the
/// utility-execution collaborator
pub struct UtilityHandler;

#[async_trait]
impl NodeHandler for UtilityHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Utility
    }

    fn describe(&self) -> &str {
        "Runs a utility payload processor"
    }

    async fn execute(&self, ctx: HandlerContext) -> Result<HashMap<String, Value>, NodeError> {
        let utility_type = ctx.require_data_str(keys::UTILITY_TYPE)?.to_string();
        let config = ctx
            .data("config")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        ctx.ensure_not_cancelled()?;

        tracing::debug!(utility_type = %utility_type, node = %ctx.node.id, "delegating to utility execution");
        let mut result = ctx
            .services
            .utility_exec
            .execute(&utility_type, &config, &ctx.context, &ctx.step)
            .await?;
        result
            .entry(keys::UTILITY_TYPE.to_string())
            .or_insert_with(|| Value::from(utility_type));
        Ok(result)
    }
}
