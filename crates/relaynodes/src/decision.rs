use async_trait::async_trait;
use relaycore::{keys, ExecutionContext, NodeError, NodeKind, Value};
use relayruntime::{HandlerContext, NodeHandler};
use std::collections::HashMap;

/// Evaluates a condition against the context and writes the boolean result
/// back for downstream nodes.
///
/// Unknown condition kinds evaluate to `true` with a warning. That
/// looseness is deliberate and long-standing; flows in the field rely on
/// it.
pub struct DecisionHandler;

#[async_trait]
impl NodeHandler for DecisionHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::Decision
    }

    fn describe(&self) -> &str {
        "Evaluates a condition against the execution context"
    }

    async fn execute(&self, ctx: HandlerContext) -> Result<HashMap<String, Value>, NodeError> {
        let raw = ctx.data_str(keys::CONDITION_TYPE).unwrap_or("").to_string();
        let outcome = match Condition::parse(&raw) {
            Some(condition) => condition.evaluate(&ctx.context),
            None => {
                tracing::warn!(
                    node = %ctx.node.id,
                    condition = %raw,
                    "unknown condition kind, defaulting to true"
                );
                ctx.events
                    .warn(format!("unknown condition '{}', defaulting to true", raw));
                true
            }
        };

        let mut result = HashMap::new();
        result.insert(keys::CONDITION_RESULT.to_string(), Value::from(outcome));
        result.insert(keys::CONDITION_TYPE.to_string(), Value::from(raw));
        Ok(result)
    }
}

/// The fixed set of condition kinds the decision node understands
#[derive(Debug, Clone, PartialEq)]
enum Condition {
    AlwaysTrue,
    AlwaysFalse,
    ContextContainsKey(String),
    ContextValueEquals { key: String, expected: String },
    FileCountGreaterThan(u64),
}

impl Condition {
    /// Parse a condition expression: a kind keyword optionally followed by
    /// one argument (`CONTEXT_VALUE_EQUALS key=value`,
    /// `FILE_COUNT_GREATER_THAN n`). Anything unparseable is unknown.
    fn parse(raw: &str) -> Option<Condition> {
        let raw = raw.trim();
        let (kind, arg) = match raw.split_once(char::is_whitespace) {
            Some((kind, arg)) => (kind, Some(arg.trim())),
            None => (raw, None),
        };
        match (kind, arg) {
            ("ALWAYS_TRUE", _) => Some(Condition::AlwaysTrue),
            ("ALWAYS_FALSE", _) => Some(Condition::AlwaysFalse),
            ("CONTEXT_CONTAINS_KEY", Some(key)) if !key.is_empty() => {
                Some(Condition::ContextContainsKey(key.to_string()))
            }
            ("CONTEXT_VALUE_EQUALS", Some(pair)) => {
                pair.split_once('=').map(|(key, expected)| {
                    Condition::ContextValueEquals {
                        key: key.trim().to_string(),
                        expected: expected.trim().to_string(),
                    }
                })
            }
            ("FILE_COUNT_GREATER_THAN", Some(n)) => {
                n.parse().ok().map(Condition::FileCountGreaterThan)
            }
            _ => None,
        }
    }

    fn evaluate(&self, context: &ExecutionContext) -> bool {
        match self {
            Condition::AlwaysTrue => true,
            Condition::AlwaysFalse => false,
            Condition::ContextContainsKey(key) => context.contains_key(key),
            Condition::ContextValueEquals { key, expected } => context
                .get(key)
                .map(|value| value_equals(value, expected))
                .unwrap_or(false),
            Condition::FileCountGreaterThan(n) => {
                let count = context
                    .get(keys::FILES_TO_PROCESS)
                    .and_then(Value::as_array)
                    .map(<[Value]>::len)
                    .unwrap_or(0) as u64;
                count > *n
            }
        }
    }
}

/// Loose comparison against the textual form of the expected value
fn value_equals(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Number(n) => expected.parse::<f64>().map(|e| e == *n).unwrap_or(false),
        Value::Bool(b) => expected.parse::<bool>().map(|e| e == *b).unwrap_or(false),
        _ => false,
    }
}
