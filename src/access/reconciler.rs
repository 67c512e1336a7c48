//! Idempotent endpoint reconciliation
//!
//! The deterministic endpoint name is the only idempotency key: find by name,
//! update if present, create otherwise, then (re)attach access on both paths.

use portcullis_connect::{
    naming, AccessApi, ConnectError, Endpoint, EndpointSpec, EndpointUpdate, ServiceType,
    ShellAuth, UpstreamTarget,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::policy_manager::{AttachOutcome, PersonalPolicy, PolicyManager};

/// Desired configuration for one (workload, service type) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEndpoint {
    pub workload_id: String,
    pub service_type: ServiceType,
    pub upstream: UpstreamTarget,
    pub connector_ids: Vec<String>,
    /// Ignored for service types without credentials
    pub shell_auth: Option<ShellAuth>,
}

impl DesiredEndpoint {
    pub fn name(&self) -> String {
        naming::endpoint_name(self.service_type, &self.workload_id)
    }

    pub fn spec(&self) -> EndpointSpec {
        EndpointSpec {
            name: self.name(),
            service_type: self.service_type,
            connector_ids: self.connector_ids.clone(),
            upstream: self.upstream.clone(),
            shell_auth: self
                .shell_auth
                .clone()
                .filter(|_| self.service_type.has_credentials()),
        }
    }
}

/// Endpoint state after reconciliation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciled {
    pub endpoint: Endpoint,
    /// False when an existing endpoint was updated
    pub created: bool,
    pub access: AttachOutcome,
}

pub struct EndpointReconciler {
    api: Arc<dyn AccessApi>,
    policies: PolicyManager,
}

impl EndpointReconciler {
    pub fn new(api: Arc<dyn AccessApi>) -> Self {
        Self {
            policies: PolicyManager::new(api.clone()),
            api,
        }
    }

    pub fn policy_manager(&self) -> &PolicyManager {
        &self.policies
    }

    /// Converge one endpoint and its access policies
    pub async fn reconcile(
        &self,
        desired: &DesiredEndpoint,
        principal_email: Option<&str>,
        predefined_policy_ids: &[String],
    ) -> Result<Reconciled, ConnectError> {
        let personal = self.policies.resolve_personal(principal_email).await;
        self.reconcile_resolved(desired, &personal, predefined_policy_ids)
            .await
    }

    /// `reconcile` with the personal policy already resolved, so that several
    /// service types of one workload can share a single resolution
    pub async fn reconcile_resolved(
        &self,
        desired: &DesiredEndpoint,
        personal: &PersonalPolicy,
        predefined_policy_ids: &[String],
    ) -> Result<Reconciled, ConnectError> {
        let (endpoint, created) = self.upsert(desired).await?;

        let access = self
            .policies
            .attach_resolved(&endpoint.id, personal, predefined_policy_ids)
            .await?;

        Ok(Reconciled {
            endpoint,
            created,
            access,
        })
    }

    async fn upsert(&self, desired: &DesiredEndpoint) -> Result<(Endpoint, bool), ConnectError> {
        let spec = desired.spec();

        match self.api.find_endpoint_by_name(&spec.name).await? {
            Some(existing) => {
                debug!("Endpoint {} exists ({}); updating upstream", spec.name, existing.id);
                let endpoint = self
                    .api
                    .update_endpoint(&existing.id, &EndpointUpdate::from(&spec))
                    .await?;
                info!(
                    "Updated endpoint {} -> {}:{}",
                    spec.name, spec.upstream.host, spec.upstream.port
                );
                Ok((endpoint, false))
            }
            None => {
                let endpoint = self.api.create_endpoint(&spec).await?;
                info!(
                    "Created endpoint {} ({}) -> {}:{}",
                    spec.name, endpoint.id, spec.upstream.host, spec.upstream.port
                );
                Ok((endpoint, true))
            }
        }
    }
}
