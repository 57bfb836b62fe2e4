use async_trait::async_trait;
use relaycore::{keys, NodeError, NodeKind, Value};
use relayruntime::{HandlerContext, NodeHandler};
use std::collections::HashMap;

/// Pure flow control: promotes any `triggerData.foundFiles` the sender
/// adapter execution already deposited into `filesToProcess`. Never calls
/// an adapter itself.
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Start
    }

    fn describe(&self) -> &str {
        "Entry point; queues files found by the sender adapter"
    }

    async fn execute(&self, ctx: HandlerContext) -> Result<HashMap<String, Value>, NodeError> {
        let mut result = HashMap::new();
        let found = ctx
            .context
            .get(keys::TRIGGER_DATA)
            .and_then(Value::as_object)
            .and_then(|trigger| trigger.get(keys::FOUND_FILES))
            .or_else(|| ctx.context.get(keys::FOUND_FILES));
        if let Some(files) = found {
            let queued = files.as_array().map(<[Value]>::len).unwrap_or(0);
            ctx.events
                .info(format!("{} files queued for processing", queued));
            result.insert(keys::FILES_TO_PROCESS.to_string(), files.clone());
        }
        Ok(result)
    }
}

/// Pure flow control: hands `filesToProcess` on as `receiverFiles` for
/// downstream adapter nodes
pub struct EndHandler;

#[async_trait]
impl NodeHandler for EndHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::End
    }

    fn describe(&self) -> &str {
        "Terminates a path, forwarding queued files to receivers"
    }

    async fn execute(&self, ctx: HandlerContext) -> Result<HashMap<String, Value>, NodeError> {
        Ok(forward_receiver_files(&ctx))
    }
}

/// Like `end`, but may additionally invoke one receiver adapter inline with
/// an event-type/payload envelope
pub struct MessageEndHandler;

#[async_trait]
impl NodeHandler for MessageEndHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::MessageEnd
    }

    fn describe(&self) -> &str {
        "Terminates a path and notifies a receiver adapter inline"
    }

    async fn execute(&self, ctx: HandlerContext) -> Result<HashMap<String, Value>, NodeError> {
        let mut result = forward_receiver_files(&ctx);

        if ctx.data(keys::RECEIVER_ADAPTER_ID).is_some() {
            let adapter_id = ctx.adapter_id(keys::RECEIVER_ADAPTER_ID)?;
            let adapter = ctx.fetch_adapter(adapter_id).await?;
            if !adapter.active {
                return Err(NodeError::AdapterInactive(adapter_id));
            }
            ctx.ensure_not_cancelled()?;

            let event_type = ctx.data_str(keys::EVENT_TYPE).unwrap_or("flow-completed");
            let mut envelope = HashMap::new();
            envelope.insert(keys::EVENT_TYPE.to_string(), Value::from(event_type));
            envelope.insert(
                "payload".to_string(),
                result
                    .get(keys::RECEIVER_FILES)
                    .cloned()
                    .unwrap_or(Value::Null),
            );

            let mut delivery = ctx.context.fork();
            delivery.insert(keys::MESSAGE_EVENT, Value::Object(envelope));
            let delivered = ctx
                .services
                .adapter_exec
                .execute(&adapter, &delivery, &ctx.step)
                .await?;
            result.extend(delivered);
            result.insert(
                keys::RECEIVER_ADAPTER_ID.to_string(),
                Value::from(adapter_id.to_string()),
            );
        }
        Ok(result)
    }
}

fn forward_receiver_files(ctx: &HandlerContext) -> HashMap<String, Value> {
    let mut result = HashMap::new();
    if let Some(files) = ctx.context.get(keys::FILES_TO_PROCESS) {
        result.insert(keys::RECEIVER_FILES.to_string(), files.clone());
    }
    result
}
