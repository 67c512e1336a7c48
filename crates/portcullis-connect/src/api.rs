//! The `AccessApi` trait: the seam between reconciliation logic and the
//! remote access-control service.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Endpoint, EndpointSpec, EndpointUpdate, Policy, PolicySpec};

/// Operations the core needs from the remote access-control service.
///
/// Implementations never retry; retry policy belongs to callers.
#[async_trait]
pub trait AccessApi: Send + Sync {
    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<Endpoint>;

    async fn update_endpoint(&self, endpoint_id: &str, update: &EndpointUpdate)
        -> Result<Endpoint>;

    async fn delete_endpoint(&self, endpoint_id: &str) -> Result<()>;

    async fn list_endpoints(&self) -> Result<Vec<Endpoint>>;

    async fn create_policy(&self, spec: &PolicySpec) -> Result<Policy>;

    async fn delete_policy(&self, policy_id: &str) -> Result<()>;

    async fn list_policies(&self) -> Result<Vec<Policy>>;

    /// Number of live endpoints the policy is attached to
    async fn count_endpoint_attachments(&self, policy_id: &str) -> Result<u64>;

    /// Attach every policy in `policy_ids` to the endpoint in one call
    async fn attach_policies(&self, endpoint_id: &str, policy_ids: &[String]) -> Result<()>;

    async fn find_endpoint_by_name(&self, name: &str) -> Result<Option<Endpoint>> {
        Ok(self
            .list_endpoints()
            .await?
            .into_iter()
            .find(|e| e.name == name))
    }

    async fn list_endpoints_by_name_prefix(&self, prefix: &str) -> Result<Vec<Endpoint>> {
        Ok(self
            .list_endpoints()
            .await?
            .into_iter()
            .filter(|e| e.name.starts_with(prefix))
            .collect())
    }

    async fn find_policy_by_name(&self, name: &str) -> Result<Option<Policy>> {
        Ok(self
            .list_policies()
            .await?
            .into_iter()
            .find(|p| p.name == name))
    }
}
