//! Provisioning facade
//!
//! The entry points the request layer calls: `reconcile_all` when a workload
//! appears, `teardown` when it goes away, and `run_maintenance_once` for the
//! sweep.

use futures::future::join_all;
use portcullis_connect::{
    naming, AccessApi, AccessClient, Endpoint, PolicyKind, ServiceType, UpstreamTarget,
};
use portcullis_sentinel::{Collection, GarbageCollector, MaintenanceRun};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::access::{AttachOutcome, DesiredEndpoint, EndpointReconciler};
use crate::config::{AccessConfig, Config};
use crate::discovery::{StaticDiscovery, WorkloadDiscovery, WorkloadInfo};
use crate::error::{PortcullisError, Result, EXIT_FATAL, EXIT_PARTIAL, EXIT_SUCCESS};
use crate::services::{self, ServiceConfig, ServiceRequest};

/// Services to expose for one workload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub services: BTreeMap<ServiceType, ServiceRequest>,
    #[serde(default)]
    pub principal_email: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ProvisionRequest {
    /// Request `types` on their default (or labelled) ports
    pub fn for_services(types: impl IntoIterator<Item = ServiceType>) -> Self {
        Self {
            services: types
                .into_iter()
                .map(|t| (t, ServiceRequest::default()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.principal_email = Some(email.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Result of reconciling one service type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceOutcome {
    Ready {
        endpoint_id: String,
        name: String,
        public_address: Option<String>,
        port: u16,
        created: bool,
        access: AttachOutcome,
    },
    Failed {
        error: String,
    },
}

impl ServiceOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceOutcome::Ready { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub workload_id: String,
    pub principal_email: Option<String>,
    pub services: BTreeMap<ServiceType, ServiceOutcome>,
}

impl ReconcileReport {
    pub fn failed(&self) -> impl Iterator<Item = ServiceType> + '_ {
        self.services
            .iter()
            .filter(|(_, o)| !o.is_ready())
            .map(|(t, _)| *t)
    }

    /// Some service types failed; the rest stay provisioned
    pub fn is_partial(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn exit_code(&self) -> i32 {
        let failed = self.failed().count();
        if failed == 0 {
            EXIT_SUCCESS
        } else if failed < self.services.len() {
            EXIT_PARTIAL
        } else {
            EXIT_FATAL
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub workload_id: String,
    pub deleted_endpoint_count: usize,
    /// Personal policies removed because the teardown orphaned them
    pub deleted_policy_count: usize,
}

pub struct Portcullis {
    api: Arc<dyn AccessApi>,
    discovery: Arc<dyn WorkloadDiscovery>,
    reconciler: EndpointReconciler,
    collector: Arc<GarbageCollector>,
    access: AccessConfig,
}

impl Portcullis {
    pub fn new(
        api: Arc<dyn AccessApi>,
        discovery: Arc<dyn WorkloadDiscovery>,
        access: AccessConfig,
    ) -> Self {
        Self {
            reconciler: EndpointReconciler::new(api.clone()),
            collector: Arc::new(GarbageCollector::new(api.clone())),
            api,
            discovery,
            access,
        }
    }

    /// Real HTTP client plus static discovery, both from config
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = AccessClient::new(config.client_config())?;
        let discovery = StaticDiscovery::new(config.workloads.clone());
        Ok(Self::new(
            Arc::new(client),
            Arc::new(discovery),
            config.access.clone(),
        ))
    }

    /// Shared with `MaintenanceScheduler`
    pub fn collector(&self) -> Arc<GarbageCollector> {
        self.collector.clone()
    }

    /// Provision every enabled service type for a workload.
    ///
    /// Fails only when the workload cannot be found. Per-type failures are
    /// reported in the result and do not affect the other types.
    pub async fn reconcile_all(
        &self,
        workload_id: &str,
        request: &ProvisionRequest,
    ) -> Result<ReconcileReport> {
        let info = self
            .discovery
            .workload_info(workload_id, request.namespace.as_deref())
            .await?
            .ok_or_else(|| PortcullisError::WorkloadNotFound(workload_id.to_string()))?;
        let Some(ip) = info.ip else {
            return Err(PortcullisError::WorkloadNotFound(format!(
                "{} (no address)",
                workload_id
            )));
        };

        let principal_email = request
            .principal_email
            .clone()
            .or_else(|| info.email.clone())
            .or_else(|| services::owner_email(&info.labels).map(str::to_string));

        let mut outcomes = BTreeMap::new();
        let mut targets = Vec::new();
        for (service_type, resolved) in services::resolve_all(&request.services, &info.labels) {
            match resolved {
                Ok(config) if config.enabled => targets.push((service_type, config)),
                Ok(_) => {}
                Err(e) if was_asked_for(service_type, request, &info) => {
                    warn!("Skipping {} for {}: {}", service_type, workload_id, e);
                    outcomes.insert(service_type, ServiceOutcome::Failed { error: e.to_string() });
                }
                Err(e) => debug!("Ignoring {} for {}: {}", service_type, workload_id, e),
            }
        }

        if !targets.is_empty() {
            // One resolution per request; concurrent per-type creates would race
            let personal = self
                .reconciler
                .policy_manager()
                .resolve_personal(principal_email.as_deref())
                .await;

            let reconciles = targets.iter().map(|(service_type, config)| {
                let desired = self.desired(workload_id, *service_type, ip.to_string(), *config);
                let personal = &personal;
                async move {
                    let result = self
                        .reconciler
                        .reconcile_resolved(&desired, personal, &self.access.predefined_policy_ids)
                        .await;
                    (desired.service_type, config.port, result)
                }
            });

            for (service_type, port, result) in join_all(reconciles).await {
                let outcome = match result {
                    Ok(reconciled) => ServiceOutcome::Ready {
                        endpoint_id: reconciled.endpoint.id,
                        name: reconciled.endpoint.name,
                        public_address: reconciled.endpoint.public_address,
                        port,
                        created: reconciled.created,
                        access: reconciled.access,
                    },
                    Err(e) => {
                        warn!("Reconciling {} for {} failed: {}", service_type, workload_id, e);
                        ServiceOutcome::Failed { error: e.to_string() }
                    }
                };
                outcomes.insert(service_type, outcome);
            }
        }

        let report = ReconcileReport {
            workload_id: workload_id.to_string(),
            principal_email,
            services: outcomes,
        };
        info!(
            "Reconciled {}: {} service(s), {} failed",
            workload_id,
            report.services.len(),
            report.failed().count()
        );
        Ok(report)
    }

    fn desired(
        &self,
        workload_id: &str,
        service_type: ServiceType,
        host: String,
        config: ServiceConfig,
    ) -> DesiredEndpoint {
        DesiredEndpoint {
            workload_id: workload_id.to_string(),
            service_type,
            upstream: UpstreamTarget::new(host, config.port),
            connector_ids: self.access.connector_ids.clone(),
            shell_auth: Some(self.access.shell_auth()),
        }
    }

    /// Delete every endpoint derived from `workload_id`, then eagerly collect
    /// the personal policies those endpoints leave orphaned.
    ///
    /// Endpoint deletion errors propagate; policy cleanup is best-effort and
    /// anything missed is left for the next sweep.
    pub async fn teardown(&self, workload_id: &str) -> Result<TeardownReport> {
        let owned: Vec<Endpoint> = self
            .api
            .list_endpoints()
            .await?
            .into_iter()
            .filter(|e| naming::belongs_to_workload(&e.name, workload_id))
            .collect();

        let mut personal = BTreeSet::new();
        let mut unnamed = BTreeSet::new();
        let mut report = TeardownReport {
            workload_id: workload_id.to_string(),
            ..Default::default()
        };

        for endpoint in &owned {
            let (named, anonymous) = endpoint.personal_policy_ids();
            personal.extend(named);
            unnamed.extend(anonymous);

            self.api.delete_endpoint(&endpoint.id).await?;
            report.deleted_endpoint_count += 1;
            info!("Deleted endpoint {} ({})", endpoint.name, endpoint.id);
        }

        if !unnamed.is_empty() {
            personal.extend(self.personal_among(&unnamed).await);
        }

        for policy_id in &personal {
            match self.collector.collect_if_orphaned(policy_id).await {
                Ok(Collection::Deleted) => report.deleted_policy_count += 1,
                Ok(Collection::Retained(count)) => {
                    debug!("Policy {} still attached to {} endpoint(s)", policy_id, count)
                }
                Err(e) => warn!("Could not collect policy {}: {}", policy_id, e),
            }
        }

        info!(
            "Teardown of {}: {} endpoint(s), {} policy(ies) deleted",
            workload_id, report.deleted_endpoint_count, report.deleted_policy_count
        );
        Ok(report)
    }

    /// Which of `ids` are personal policies, for endpoint records that carry
    /// policy references without names
    async fn personal_among(&self, ids: &BTreeSet<String>) -> Vec<String> {
        match self.api.list_policies().await {
            Ok(policies) => policies
                .into_iter()
                .filter(|p| ids.contains(&p.id) && p.kind() == PolicyKind::Personal)
                .map(|p| p.id)
                .collect(),
            Err(e) => {
                warn!("Could not resolve attached policy names: {}", e);
                Vec::new()
            }
        }
    }

    /// One garbage-collection sweep. Never fails.
    pub async fn run_maintenance_once(&self) -> MaintenanceRun {
        self.collector.run_maintenance_once().await
    }
}

/// Resolution errors are reported only for types somebody asked for
fn was_asked_for(service_type: ServiceType, request: &ProvisionRequest, info: &WorkloadInfo) -> bool {
    request.services.contains_key(&service_type)
        || info
            .labels
            .contains_key(&services::label_key(service_type, "enabled"))
}
