use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known context keys shared between the engine, node handlers, and
/// adapter/utility collaborators
pub mod keys {
    /// Files discovered by the sender adapter, queued for processing
    pub const FILES_TO_PROCESS: &str = "filesToProcess";
    /// Files handed to receiver adapter nodes by end nodes
    pub const RECEIVER_FILES: &str = "receiverFiles";
    /// Trigger envelope deposited by the sender-adapter execution
    pub const TRIGGER_DATA: &str = "triggerData";
    /// File list inside the trigger envelope
    pub const FOUND_FILES: &str = "foundFiles";

    pub const ADAPTER_ID: &str = "adapterId";
    pub const ADAPTER_DIRECTION: &str = "adapterDirection";
    pub const SENDER_ADAPTER_ID: &str = "senderAdapterId";
    pub const RECEIVER_ADAPTER_ID: &str = "receiverAdapterId";
    pub const RECEIVER_ADAPTER_IDS: &str = "receiverAdapterIds";

    pub const EXECUTION_ID: &str = "executionId";
    pub const FLOW_ID: &str = "flowId";
    pub const CORRELATION_ID: &str = "correlationId";
    pub const ENVIRONMENT: &str = "environment";
    pub const JOIN_TIMEOUT_SECS: &str = "joinTimeoutSecs";

    pub const UTILITY_TYPE: &str = "utilityType";
    pub const CONDITION_TYPE: &str = "conditionType";
    pub const CONDITION_RESULT: &str = "conditionResult";
    pub const MESSAGE_EVENT: &str = "messageEvent";
    pub const EVENT_TYPE: &str = "eventType";

    /// Per-step metrics copied from handler results onto the step record
    pub const FILES_PROCESSED: &str = "filesProcessed";
    pub const BYTES_PROCESSED: &str = "bytesProcessed";
}

/// The mutable key/value bag threaded through a run.
///
/// Each parallel branch owns a fork (a full clone — `Value` is an owned
/// tree, so there are no shared references between siblings); forks are
/// merged back at the join point with an explicit reducer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    values: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Merge a handler result map; incoming keys overwrite
    pub fn extend(&mut self, result: HashMap<String, Value>) {
        self.values.extend(result);
    }

    /// Independent copy for one parallel branch
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Join reducer: fold a finished branch back in, key by key. The branch
    /// merged later wins on conflict, so branches that need deterministic
    /// joins must write to disjoint keys.
    pub fn merge(&mut self, branch: ExecutionContext) {
        self.values.extend(branch.values);
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
