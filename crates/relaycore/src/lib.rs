//! Core abstractions for the relay integration engine
//!
//! This crate provides the data model and collaborator contracts that all
//! other components depend on: flow definitions, adapters, deployments,
//! executions and their steps, the dynamic `Value` type, the execution
//! context, the event bus, and the persistence/execution collaborator traits
//! with in-memory implementations.

mod adapter;
mod collab;
mod context;
mod deployment;
mod error;
pub mod events;
mod execution;
mod flow;
pub mod memory;
mod value;

pub use adapter::{Adapter, AdapterDirection, AdapterId, AdapterStatus};
pub use collab::{
    AdapterExecution, AdapterRegistry, DeploymentStore, FlowStore, RunStore, Scheduler,
    SchedulerError, UtilityExecution,
};
pub use context::{keys, ExecutionContext};
pub use deployment::{
    DeployedFlow, DeploymentId, DeploymentStats, DeploymentStatus, DeploymentSummary,
    DeploymentValidation, UndeploySummary,
};
pub use error::{
    AdapterError, DeployError, EngineError, FlowError, NodeError, RelayError, StoreError,
};
pub use events::{EventBus, EventEmitter, ExecutionEvent, StepEvent};
pub use execution::{
    ErrorDetail, ExecutionId, ExecutionStatus, FlowExecution, FlowExecutionStep, StepId,
    StepStatus, TriggerType,
};
pub use flow::{FlowDefinition, FlowEdge, FlowId, FlowNode, FlowValidation, NodeKind};
pub use value::Value;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
