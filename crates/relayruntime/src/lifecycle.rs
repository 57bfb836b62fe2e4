use chrono::Utc;
use relaycore::{
    Adapter, AdapterError, AdapterId, AdapterRegistry, AdapterStatus, EventBus, ExecutionEvent,
    StoreError,
};
use std::sync::Arc;

/// Enforces the adapter state machine.
///
/// Every status write in the system goes through here, onto the registry's
/// single atomic update. `Errored` counts as stopped for every
/// "must be stopped" precondition, and a start from `Errored` is allowed —
/// the error stays visible until an operator or the orchestrator moves the
/// adapter on.
pub struct AdapterLifecycle {
    adapters: Arc<dyn AdapterRegistry>,
    bus: Arc<EventBus>,
}

impl AdapterLifecycle {
    pub fn new(adapters: Arc<dyn AdapterRegistry>, bus: Arc<EventBus>) -> Self {
        Self { adapters, bus }
    }

    /// Start an adapter. Requires it to be active; a no-op if already
    /// started.
    pub async fn start(&self, id: AdapterId) -> Result<Adapter, AdapterError> {
        let adapter = self.fetch(id).await?;
        if !adapter.active {
            return Err(AdapterError::Inactive(id));
        }
        if adapter.status.is_started() {
            tracing::debug!(adapter = %id, "start is a no-op, already started");
            return Ok(adapter);
        }
        self.transition(id, AdapterStatus::Started).await
    }

    /// Stop an adapter. A no-op if already stopped; from `Errored` this
    /// clears the error and leaves a plain `Stopped`.
    pub async fn stop(&self, id: AdapterId) -> Result<Adapter, AdapterError> {
        let adapter = self.fetch(id).await?;
        if adapter.status == AdapterStatus::Stopped {
            tracing::debug!(adapter = %id, "stop is a no-op, already stopped");
            return Ok(adapter);
        }
        self.transition(id, AdapterStatus::Stopped).await
    }

    pub async fn restart(&self, id: AdapterId) -> Result<Adapter, AdapterError> {
        let adapter = self.fetch(id).await?;
        if adapter.status.is_started() {
            self.transition(id, AdapterStatus::Stopped).await?;
        }
        self.start(id).await
    }

    /// Deactivating a started adapter implicitly stops it first
    pub async fn set_active(&self, id: AdapterId, active: bool) -> Result<Adapter, AdapterError> {
        let adapter = self.fetch(id).await?;
        if !active && adapter.status.is_started() {
            self.transition(id, AdapterStatus::Stopped).await?;
        }
        self.adapters
            .set_active(id, active)
            .await
            .map_err(|e| map_store(id, e))
    }

    /// Record a failure into the state machine itself
    pub async fn set_error(
        &self,
        id: AdapterId,
        message: impl Into<String>,
    ) -> Result<Adapter, AdapterError> {
        self.fetch(id).await?;
        let message = message.into();
        tracing::warn!(adapter = %id, error = %message, "adapter moved to errored state");
        self.transition(
            id,
            AdapterStatus::Errored {
                message,
                at: Utc::now(),
            },
        )
        .await
    }

    async fn fetch(&self, id: AdapterId) -> Result<Adapter, AdapterError> {
        self.adapters.get(id).await.map_err(|e| map_store(id, e))
    }

    async fn transition(
        &self,
        id: AdapterId,
        status: AdapterStatus,
    ) -> Result<Adapter, AdapterError> {
        let updated = self
            .adapters
            .update_status(id, status)
            .await
            .map_err(|e| map_store(id, e))?;
        tracing::info!(adapter = %id, status = %updated.status, "adapter status changed");
        self.bus.emit(ExecutionEvent::AdapterStatusChanged {
            adapter_id: id,
            status: updated.status.clone(),
            timestamp: Utc::now(),
        });
        Ok(updated)
    }
}

fn map_store(id: AdapterId, e: StoreError) -> AdapterError {
    match e {
        StoreError::NotFound(_) => AdapterError::NotFound(id),
        other => AdapterError::Store(other),
    }
}
