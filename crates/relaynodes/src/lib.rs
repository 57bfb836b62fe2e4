//! Built-in node handlers
//!
//! One handler per node kind, dispatched through the runtime's handler
//! registry. Adapter and utility handlers delegate the real work to the
//! execution collaborators; the rest are pure flow control.

mod adapter;
mod control;
mod decision;
mod split;
mod utility;

pub use adapter::AdapterHandler;
pub use control::{EndHandler, MessageEndHandler, StartHandler};
pub use decision::DecisionHandler;
pub use split::ParallelSplitHandler;
pub use utility::UtilityHandler;

use relayruntime::HandlerRegistry;
use std::sync::Arc;

/// Register all built-in handlers with a registry
pub fn register_builtin(registry: &mut HandlerRegistry) {
    registry.register(Arc::new(StartHandler));
    registry.register(Arc::new(EndHandler));
    registry.register(Arc::new(MessageEndHandler));
    registry.register(Arc::new(AdapterHandler));
    registry.register(Arc::new(UtilityHandler));
    registry.register(Arc::new(DecisionHandler));
    registry.register(Arc::new(ParallelSplitHandler));
}
