use crate::lifecycle::AdapterLifecycle;
use crate::services::Services;
use crate::settings::EngineSettings;
use chrono::Utc;
use relaycore::{
    AdapterDirection, AdapterError, AdapterId, DeployError, DeployedFlow, DeploymentStatus,
    DeploymentSummary, DeploymentValidation, EventBus, ExecutionEvent, FlowId, StoreError,
    UndeploySummary,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Binds a flow to the live adapters it references, starting them as a
/// group with rollback on partial failure, and later reverses the binding.
pub struct DeploymentOrchestrator {
    services: Arc<Services>,
    lifecycle: Arc<AdapterLifecycle>,
    bus: Arc<EventBus>,
    settings: EngineSettings,
}

impl DeploymentOrchestrator {
    pub fn new(
        services: Arc<Services>,
        lifecycle: Arc<AdapterLifecycle>,
        bus: Arc<EventBus>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            services,
            lifecycle,
            bus,
            settings,
        }
    }

    /// Dry-run check with zero side effects
    pub async fn validate_deployment(
        &self,
        flow_id: FlowId,
    ) -> Result<DeploymentValidation, DeployError> {
        let flow = match self.services.flows.get(flow_id).await {
            Ok(flow) => flow,
            Err(StoreError::NotFound(_)) => return Err(DeployError::FlowNotFound(flow_id)),
            Err(e) => return Err(e.into()),
        };

        let structural = flow.validate();
        let mut errors = structural.errors;
        let mut warnings = structural.warnings;

        if !self
            .services
            .deployments
            .find_by_flow(flow_id)
            .await?
            .is_empty()
        {
            errors.push(DeployError::AlreadyDeployed(flow_id).to_string());
        }

        let adapter_ids = flow.referenced_adapter_ids();
        if adapter_ids.is_empty() {
            errors.push(DeployError::NoAdaptersReferenced.to_string());
        } else {
            let mut saw_sender = false;
            for id in &adapter_ids {
                match self.services.adapters.get(*id).await {
                    Ok(adapter) => {
                        if adapter.direction == AdapterDirection::Sender {
                            saw_sender = true;
                        }
                        if !adapter.active {
                            errors.push(format!("adapter {} ({}) is inactive", adapter.name, id));
                        }
                        if adapter.status.is_started() {
                            errors.push(format!(
                                "adapter {} ({}) is already started",
                                adapter.name, id
                            ));
                        }
                        if let relaycore::AdapterStatus::Errored { message, .. } = &adapter.status {
                            warnings.push(format!(
                                "adapter {} ({}) is errored ({}); deploying will restart it",
                                adapter.name, id, message
                            ));
                        }
                    }
                    Err(StoreError::NotFound(_)) => {
                        errors.push(format!("referenced adapter {} does not exist", id));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if !saw_sender {
                errors.push(DeployError::NoSenderAdapter.to_string());
            }
        }

        Ok(DeploymentValidation {
            can_deploy: errors.is_empty(),
            errors,
            warnings,
        })
    }

    /// Deploy protocol: strict, all-or-nothing on the adapter side
    pub async fn deploy(
        &self,
        flow_id: FlowId,
        actor: &str,
    ) -> Result<DeploymentSummary, DeployError> {
        // 1. one deployment in flight per flow
        if !self
            .services
            .deployments
            .find_by_flow(flow_id)
            .await?
            .is_empty()
        {
            return Err(DeployError::AlreadyDeployed(flow_id));
        }

        let flow = match self.services.flows.get(flow_id).await {
            Ok(flow) => flow,
            Err(StoreError::NotFound(_)) => return Err(DeployError::FlowNotFound(flow_id)),
            Err(e) => return Err(e.into()),
        };

        // 2. structural validation, zero side effects
        let structural = flow.validate();
        if !structural.is_valid() {
            return Err(DeployError::ValidationFailed {
                errors: structural.errors,
            });
        }

        // 3. the full referenced adapter set
        let adapter_ids = flow.referenced_adapter_ids();
        if adapter_ids.is_empty() {
            return Err(DeployError::NoAdaptersReferenced);
        }

        // Phase A: every referenced adapter must be active and stopped
        let mut adapters = Vec::with_capacity(adapter_ids.len());
        for id in &adapter_ids {
            let adapter = match self.services.adapters.get(*id).await {
                Ok(adapter) => adapter,
                Err(StoreError::NotFound(_)) => {
                    return Err(DeployError::Adapter(AdapterError::NotFound(*id)))
                }
                Err(e) => return Err(e.into()),
            };
            if !adapter.active {
                return Err(DeployError::AdapterNotReady {
                    id: *id,
                    reason: format!("adapter {} is inactive", adapter.name),
                });
            }
            if adapter.status.is_started() {
                return Err(DeployError::AdapterNotReady {
                    id: *id,
                    reason: format!("adapter {} is already started", adapter.name),
                });
            }
            adapters.push(adapter);
        }
        let sender = adapters
            .iter()
            .find(|a| a.direction == AdapterDirection::Sender)
            .ok_or(DeployError::NoSenderAdapter)?;
        let sender_adapter_id = sender.id;
        let receiver_adapter_ids: Vec<AdapterId> = adapters
            .iter()
            .filter(|a| a.direction == AdapterDirection::Receiver)
            .map(|a| a.id)
            .collect();

        // Phase B: start as a group; any failure rolls the group back
        let mut started: Vec<AdapterId> = Vec::new();
        for adapter in &adapters {
            match self.lifecycle.start(adapter.id).await {
                Ok(updated) if updated.status.is_started() => started.push(adapter.id),
                Ok(_) => {
                    self.rollback(&started).await;
                    return Err(DeployError::StartFailed {
                        id: adapter.id,
                        source: AdapterError::Store(StoreError::Backend(format!(
                            "status write for adapter {} did not take effect",
                            adapter.id
                        ))),
                    });
                }
                Err(source) => {
                    self.rollback(&started).await;
                    return Err(DeployError::StartFailed {
                        id: adapter.id,
                        source,
                    });
                }
            }
        }

        // Phase C: commit. Snapshots make the deployment immune to later
        // edits of the flow or adapter records.
        let deployment = DeployedFlow {
            id: Uuid::new_v4(),
            flow_id,
            flow_version: flow.version,
            status: DeploymentStatus::Active,
            sender_adapter_id,
            receiver_adapter_ids,
            adapter_snapshots: adapters
                .iter()
                .map(|a| (a.id, a.config.clone()))
                .collect(),
            flow_snapshot: flow,
            environment: self.settings.environment.clone(),
            deployed_by: actor.to_string(),
            deployed_at: Utc::now(),
            stats: Default::default(),
        };
        let summary = DeploymentSummary {
            deployment_id: deployment.id,
            flow_id,
            flow_version: deployment.flow_version,
            adapters_started: started,
            deployed_at: deployment.deployed_at,
        };
        self.services.deployments.insert(deployment.clone()).await?;

        // Scheduling registration failure does not undo phases A/B
        if let Err(e) = self.services.scheduler.on_flow_deployed(&deployment).await {
            tracing::error!(
                deployment = %deployment.id,
                error = %e,
                "scheduling registration failed; adapters remain started"
            );
        }

        self.bus.emit(ExecutionEvent::FlowDeployed {
            deployment_id: deployment.id,
            flow_id,
            timestamp: Utc::now(),
        });
        tracing::info!(
            deployment = %deployment.id,
            flow = %flow_id,
            adapters = summary.adapters_started.len(),
            actor,
            "flow deployed"
        );
        Ok(summary)
    }

    /// Undeploy protocol: best-effort, never aborts on partial failure.
    /// Callers detect partial failure from the returned counts.
    pub async fn undeploy(
        &self,
        flow_id: FlowId,
        actor: &str,
    ) -> Result<UndeploySummary, DeployError> {
        let found = self.services.deployments.find_by_flow(flow_id).await?;
        if found.is_empty() {
            return Err(DeployError::NotDeployed(flow_id));
        }

        // Re-extract from the deployment snapshots, not the live flow record
        let mut seen = HashSet::new();
        let mut referenced: Vec<AdapterId> = Vec::new();
        for deployment in &found {
            for id in deployment.flow_snapshot.referenced_adapter_ids() {
                if seen.insert(id) {
                    referenced.push(id);
                }
            }
        }

        let mut adapters_stopped = 0;
        for id in &referenced {
            match self.services.adapters.get(*id).await {
                Ok(adapter) if adapter.status.is_started() => {
                    match self.lifecycle.stop(*id).await {
                        Ok(_) => adapters_stopped += 1,
                        Err(e) => {
                            tracing::warn!(adapter = %id, error = %e, "failed to stop adapter during undeploy");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(adapter = %id, error = %e, "referenced adapter unavailable during undeploy");
                }
            }
        }

        let deployments_found = found.len();
        let mut deployments_removed = 0;
        for deployment in &found {
            if let Err(e) = self
                .services
                .scheduler
                .on_flow_undeployed(deployment.id)
                .await
            {
                tracing::warn!(deployment = %deployment.id, error = %e, "scheduler deregistration failed");
            }
            match self.services.deployments.delete(deployment.id).await {
                Ok(()) => deployments_removed += 1,
                Err(e) => {
                    tracing::warn!(deployment = %deployment.id, error = %e, "failed to delete deployment record");
                }
            }
        }

        self.bus.emit(ExecutionEvent::FlowUndeployed {
            flow_id,
            deployments_removed,
            timestamp: Utc::now(),
        });
        tracing::info!(
            flow = %flow_id,
            adapters_stopped,
            adapters_referenced = referenced.len(),
            deployments_removed,
            actor,
            "flow undeployed"
        );
        Ok(UndeploySummary {
            flow_id,
            adapters_stopped,
            adapters_referenced: referenced.len(),
            deployments_removed,
            deployments_found,
        })
    }

    /// Stop everything started in this attempt, leaving the flow exactly as
    /// it was before the deploy
    async fn rollback(&self, started: &[AdapterId]) {
        tracing::warn!(
            count = started.len(),
            "deploy failed mid-start, rolling back started adapters"
        );
        for id in started.iter().rev() {
            if let Err(e) = self.lifecycle.stop(*id).await {
                tracing::error!(adapter = %id, error = %e, "rollback failed to stop adapter");
            }
        }
    }
}
