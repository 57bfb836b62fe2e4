//! Flow execution runtime
//!
//! This crate provides the three core subsystems of the relay engine: the
//! flow graph execution engine, the deployment orchestrator, and the
//! adapter lifecycle controller, plus the node handler registry, the
//! bounded worker pool, and the runtime facade that wires them together.

mod engine;
mod lifecycle;
mod orchestrator;
mod registry;
mod runtime;
mod services;
mod settings;
mod worker;

pub use engine::FlowEngine;
pub use lifecycle::AdapterLifecycle;
pub use orchestrator::DeploymentOrchestrator;
pub use registry::{HandlerContext, HandlerRegistry, NodeHandler};
pub use runtime::{RelayRuntime, RunHandle};
pub use services::Services;
pub use settings::{
    clamp_join_timeout, EngineSettings, DEFAULT_EVENT_CAPACITY, DEFAULT_JOIN_TIMEOUT_SECS,
    DEFAULT_WORKER_POOL_SIZE, JOIN_TIMEOUT_MAX_SECS, JOIN_TIMEOUT_MIN_SECS,
};
pub use worker::WorkerPool;
