use relaycore::memory::{
    EchoAdapterExecution, EchoUtilityExecution, MemoryAdapterRegistry, MemoryDeploymentStore,
    MemoryFlowStore, MemoryRunStore, NullScheduler,
};
use relaycore::{
    keys, Adapter, AdapterDirection, EventBus, ExecutionContext, FlowDefinition, FlowExecutionStep,
    FlowNode, NodeError, NodeKind, Value,
};
use relaynodes::{
    AdapterHandler, DecisionHandler, EndHandler, MessageEndHandler, ParallelSplitHandler,
    StartHandler, UtilityHandler,
};
use relayruntime::{HandlerContext, NodeHandler, Services};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn services_with_adapters(adapters: Vec<Adapter>) -> Arc<Services> {
    let registry = MemoryAdapterRegistry::new();
    for adapter in adapters {
        registry.insert(adapter).await;
    }
    Arc::new(Services {
        adapters: Arc::new(registry),
        flows: Arc::new(MemoryFlowStore::new()),
        deployments: Arc::new(MemoryDeploymentStore::new()),
        runs: Arc::new(MemoryRunStore::new()),
        adapter_exec: Arc::new(EchoAdapterExecution),
        utility_exec: Arc::new(EchoUtilityExecution),
        scheduler: Arc::new(NullScheduler),
    })
}

fn test_ctx(
    node: FlowNode,
    flow: FlowDefinition,
    context: ExecutionContext,
    services: Arc<Services>,
) -> HandlerContext {
    let bus = EventBus::new(64);
    let execution_id = Uuid::new_v4();
    let step = FlowExecutionStep::new(
        execution_id,
        node.id.as_str(),
        node.display_name(),
        node.kind,
        1,
        context.values().clone(),
    );
    HandlerContext {
        events: bus.create_emitter(execution_id, node.id.clone()),
        node,
        flow: Arc::new(flow),
        context,
        deployment: None,
        services,
        step,
        cancellation: CancellationToken::new(),
    }
}

fn file_list() -> Value {
    Value::Array(vec![
        Value::Object(HashMap::from([
            ("name".to_string(), Value::from("a.csv")),
            ("size".to_string(), Value::from(100u64)),
        ])),
        Value::Object(HashMap::from([
            ("name".to_string(), Value::from("b.csv")),
            ("size".to_string(), Value::from(50u64)),
        ])),
    ])
}

#[tokio::test]
async fn start_promotes_trigger_data_found_files() {
    let mut trigger = HashMap::new();
    trigger.insert(keys::FOUND_FILES.to_string(), file_list());
    let mut context = ExecutionContext::new();
    context.insert(keys::TRIGGER_DATA, Value::Object(trigger));

    let ctx = test_ctx(
        FlowNode::new("start", NodeKind::Start),
        FlowDefinition::new("f"),
        context,
        services_with_adapters(vec![]).await,
    );
    let result = StartHandler.execute(ctx).await.unwrap();
    assert_eq!(result.get(keys::FILES_TO_PROCESS), Some(&file_list()));
}

#[tokio::test]
async fn start_without_trigger_data_queues_nothing() {
    let ctx = test_ctx(
        FlowNode::new("start", NodeKind::Start),
        FlowDefinition::new("f"),
        ExecutionContext::new(),
        services_with_adapters(vec![]).await,
    );
    let result = StartHandler.execute(ctx).await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn end_forwards_files_to_receivers() {
    let mut context = ExecutionContext::new();
    context.insert(keys::FILES_TO_PROCESS, file_list());
    let ctx = test_ctx(
        FlowNode::new("end", NodeKind::End),
        FlowDefinition::new("f"),
        context,
        services_with_adapters(vec![]).await,
    );
    let result = EndHandler.execute(ctx).await.unwrap();
    assert_eq!(result.get(keys::RECEIVER_FILES), Some(&file_list()));
}

#[tokio::test]
async fn message_end_invokes_the_receiver_inline() {
    let receiver = Adapter::new("mailbox", AdapterDirection::Receiver);
    let receiver_id = receiver.id;
    let services = services_with_adapters(vec![receiver]).await;

    let mut context = ExecutionContext::new();
    context.insert(keys::FILES_TO_PROCESS, file_list());
    let node = FlowNode::new("notify", NodeKind::MessageEnd)
        .with_data(keys::RECEIVER_ADAPTER_ID, receiver_id.to_string())
        .with_data(keys::EVENT_TYPE, "transfer-complete");

    let ctx = test_ctx(node, FlowDefinition::new("f"), context, services);
    let result = MessageEndHandler.execute(ctx).await.unwrap();
    assert_eq!(result.get(keys::RECEIVER_FILES), Some(&file_list()));
    assert_eq!(
        result.get(keys::RECEIVER_ADAPTER_ID),
        Some(&Value::from(receiver_id.to_string()))
    );
    // the echo execution reports the forwarded files as processed
    assert_eq!(
        result.get(keys::FILES_PROCESSED),
        Some(&Value::from(2u64))
    );
}

#[tokio::test]
async fn message_end_rejects_an_inactive_receiver() {
    let receiver = Adapter::new("mailbox", AdapterDirection::Receiver).inactive();
    let receiver_id = receiver.id;
    let services = services_with_adapters(vec![receiver]).await;

    let node = FlowNode::new("notify", NodeKind::MessageEnd)
        .with_data(keys::RECEIVER_ADAPTER_ID, receiver_id.to_string());
    let ctx = test_ctx(
        node,
        FlowDefinition::new("f"),
        ExecutionContext::new(),
        services,
    );
    let err = MessageEndHandler.execute(ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::AdapterInactive(got) if got == receiver_id));
}

#[tokio::test]
async fn adapter_handler_tags_the_result() {
    let adapter = Adapter::new("share", AdapterDirection::Receiver);
    let adapter_id = adapter.id;
    let services = services_with_adapters(vec![adapter]).await;

    let mut context = ExecutionContext::new();
    context.insert(keys::FILES_TO_PROCESS, file_list());
    let node =
        FlowNode::new("transfer", NodeKind::Adapter).with_data(keys::ADAPTER_ID, adapter_id.to_string());
    let ctx = test_ctx(node, FlowDefinition::new("f"), context, services);

    let result = AdapterHandler.execute(ctx).await.unwrap();
    assert_eq!(
        result.get(keys::ADAPTER_ID),
        Some(&Value::from(adapter_id.to_string()))
    );
    assert_eq!(
        result.get(keys::ADAPTER_DIRECTION),
        Some(&Value::from("RECEIVER"))
    );
    assert_eq!(result.get(keys::FILES_PROCESSED), Some(&Value::from(2u64)));
    assert_eq!(result.get(keys::BYTES_PROCESSED), Some(&Value::from(150u64)));
}

#[tokio::test]
async fn adapter_handler_requires_the_reference() {
    let ctx = test_ctx(
        FlowNode::new("transfer", NodeKind::Adapter),
        FlowDefinition::new("f"),
        ExecutionContext::new(),
        services_with_adapters(vec![]).await,
    );
    let err = AdapterHandler.execute(ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::MissingData(field) if field == keys::ADAPTER_ID));
}

#[tokio::test]
async fn adapter_handler_rejects_inactive_and_unknown_adapters() {
    let inactive = Adapter::new("down", AdapterDirection::Receiver).inactive();
    let inactive_id = inactive.id;
    let services = services_with_adapters(vec![inactive]).await;

    let node = FlowNode::new("transfer", NodeKind::Adapter)
        .with_data(keys::ADAPTER_ID, inactive_id.to_string());
    let ctx = test_ctx(
        node,
        FlowDefinition::new("f"),
        ExecutionContext::new(),
        services.clone(),
    );
    assert!(matches!(
        AdapterHandler.execute(ctx).await.unwrap_err(),
        NodeError::AdapterInactive(got) if got == inactive_id
    ));

    let ghost = Uuid::new_v4();
    let node =
        FlowNode::new("transfer", NodeKind::Adapter).with_data(keys::ADAPTER_ID, ghost.to_string());
    let ctx = test_ctx(node, FlowDefinition::new("f"), ExecutionContext::new(), services);
    assert!(matches!(
        AdapterHandler.execute(ctx).await.unwrap_err(),
        NodeError::AdapterNotFound(got) if got == ghost
    ));
}

#[tokio::test]
async fn utility_handler_requires_a_type() {
    let ctx = test_ctx(
        FlowNode::new("compress", NodeKind::Utility),
        FlowDefinition::new("f"),
        ExecutionContext::new(),
        services_with_adapters(vec![]).await,
    );
    let err = UtilityHandler.execute(ctx).await.unwrap_err();
    assert!(matches!(err, NodeError::MissingData(field) if field == keys::UTILITY_TYPE));
}

#[tokio::test]
async fn utility_handler_delegates_and_tags() {
    let node = FlowNode::new("compress", NodeKind::Utility).with_data(keys::UTILITY_TYPE, "ZIP");
    let ctx = test_ctx(
        node,
        FlowDefinition::new("f"),
        ExecutionContext::new(),
        services_with_adapters(vec![]).await,
    );
    let result = UtilityHandler.execute(ctx).await.unwrap();
    assert_eq!(result.get(keys::UTILITY_TYPE), Some(&Value::from("ZIP")));
}

async fn decide(condition: &str, context: ExecutionContext) -> bool {
    let node =
        FlowNode::new("check", NodeKind::Decision).with_data(keys::CONDITION_TYPE, condition);
    let ctx = test_ctx(
        node,
        FlowDefinition::new("f"),
        context,
        services_with_adapters(vec![]).await,
    );
    DecisionHandler
        .execute(ctx)
        .await
        .unwrap()
        .get(keys::CONDITION_RESULT)
        .and_then(Value::as_bool)
        .expect("decision must write a boolean")
}

#[tokio::test]
async fn decision_evaluates_the_fixed_condition_kinds() {
    assert!(decide("ALWAYS_TRUE", ExecutionContext::new()).await);
    assert!(!decide("ALWAYS_FALSE", ExecutionContext::new()).await);

    let mut context = ExecutionContext::new();
    context.insert("env", "prod");
    assert!(decide("CONTEXT_CONTAINS_KEY env", context.fork()).await);
    assert!(!decide("CONTEXT_CONTAINS_KEY region", context.fork()).await);
    assert!(decide("CONTEXT_VALUE_EQUALS env=prod", context.fork()).await);
    assert!(!decide("CONTEXT_VALUE_EQUALS env=staging", context.fork()).await);

    let mut context = ExecutionContext::new();
    context.insert(keys::FILES_TO_PROCESS, file_list());
    assert!(decide("FILE_COUNT_GREATER_THAN 1", context.fork()).await);
    assert!(!decide("FILE_COUNT_GREATER_THAN 5", context.fork()).await);
}

#[tokio::test]
async fn unknown_condition_kinds_default_to_true() {
    assert!(decide("REGEX_MATCHES .*\\.csv", ExecutionContext::new()).await);
    assert!(decide("", ExecutionContext::new()).await);
}

#[tokio::test]
async fn parallel_split_reports_queue_and_path_counts() {
    let mut flow = FlowDefinition::new("f");
    flow.add_node(FlowNode::new("split", NodeKind::ParallelSplit));
    flow.add_node(FlowNode::new("a", NodeKind::End));
    flow.add_node(FlowNode::new("b", NodeKind::End));
    flow.connect("split", "a");
    flow.connect("split", "b");

    let mut context = ExecutionContext::new();
    context.insert(keys::FILES_TO_PROCESS, file_list());
    let ctx = test_ctx(
        FlowNode::new("split", NodeKind::ParallelSplit),
        flow,
        context,
        services_with_adapters(vec![]).await,
    );
    let result = ParallelSplitHandler.execute(ctx).await.unwrap();
    assert_eq!(result.get("queuedFiles"), Some(&Value::from(2u64)));
    assert_eq!(result.get("parallelPaths"), Some(&Value::from(2u64)));
}
