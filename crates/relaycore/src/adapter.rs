use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type AdapterId = Uuid;

/// A configured connector to an external system.
///
/// Status transitions go through the lifecycle controller only; the record
/// itself is plain data. An inactive adapter may never be started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adapter {
    pub id: AdapterId,
    pub name: String,
    pub active: bool,
    pub status: AdapterStatus,
    pub direction: AdapterDirection,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl Adapter {
    pub fn new(name: impl Into<String>, direction: AdapterDirection) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            active: true,
            status: AdapterStatus::Stopped,
            direction,
            config: HashMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Adapter lifecycle state.
///
/// `Errored` encodes the failure in the state machine itself instead of a
/// side audit channel; for every "must be stopped" precondition it counts as
/// stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum AdapterStatus {
    Stopped,
    Started,
    Errored {
        message: String,
        at: DateTime<Utc>,
    },
}

impl AdapterStatus {
    pub fn errored(message: impl Into<String>) -> Self {
        AdapterStatus::Errored {
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, AdapterStatus::Started)
    }

    pub fn is_stopped(&self) -> bool {
        !self.is_started()
    }
}

impl std::fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterStatus::Stopped => write!(f, "STOPPED"),
            AdapterStatus::Started => write!(f, "STARTED"),
            AdapterStatus::Errored { message, .. } => write!(f, "ERRORED ({})", message),
        }
    }
}

/// Whether the adapter originates transfers or receives them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterDirection {
    Sender,
    Receiver,
}

impl std::fmt::Display for AdapterDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterDirection::Sender => write!(f, "SENDER"),
            AdapterDirection::Receiver => write!(f, "RECEIVER"),
        }
    }
}
