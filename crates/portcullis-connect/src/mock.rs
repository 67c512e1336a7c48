//! In-memory access service for testing
//!
//! Behaves like the remote service closely enough to exercise idempotency,
//! deduplication and garbage collection without a network. Failures can be
//! injected per operation or per endpoint name.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::api::AccessApi;
use crate::error::{ConnectError, Result};
use crate::types::{Endpoint, EndpointSpec, EndpointUpdate, Policy, PolicyRef, PolicySpec};

#[derive(Debug, Default)]
struct MockState {
    endpoints: BTreeMap<String, Endpoint>,
    policies: BTreeMap<String, Policy>,
    /// endpoint id -> attached policy ids
    attachments: BTreeMap<String, BTreeSet<String>>,
    /// endpoint id -> most recent update body
    updates: BTreeMap<String, EndpointUpdate>,
    next_id: u64,
    calls: Vec<String>,
    failing_ops: HashMap<String, u16>,
    failing_names: HashMap<String, u16>,
    embed_counts: bool,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn check(&mut self, op: &str, name: Option<&str>) -> Result<()> {
        self.calls.push(op.to_string());
        let status = self
            .failing_ops
            .get(op)
            .or_else(|| name.and_then(|n| self.failing_names.get(n)));
        match status {
            Some(code) => Err(ConnectError::UnexpectedStatus {
                status: StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body: format!("injected failure for {}", op),
            }),
            None => Ok(()),
        }
    }

    fn attachment_count(&self, policy_id: &str) -> u64 {
        self.attachments
            .values()
            .filter(|ids| ids.contains(policy_id))
            .count() as u64
    }

    fn render_endpoint(&self, endpoint: &Endpoint) -> Endpoint {
        let mut rendered = endpoint.clone();
        rendered.attached_policies = self
            .attachments
            .get(&endpoint.id)
            .into_iter()
            .flatten()
            .map(|policy_id| PolicyRef {
                id: policy_id.clone(),
                name: self.policies.get(policy_id).map(|p| p.name.clone()),
            })
            .collect();
        rendered
    }

    fn render_policy(&self, policy: &Policy) -> Policy {
        let mut rendered = policy.clone();
        if self.embed_counts {
            rendered.socket_count = Some(self.attachment_count(&policy.id));
        }
        rendered
    }
}

/// Mock access service for testing
///
/// # Example
///
/// ```rust
/// use portcullis_connect::{AccessApi, MockAccessApi};
///
/// # async fn example() -> portcullis_connect::Result<()> {
/// let api = MockAccessApi::new();
/// let policy_id = api.seed_policy("engineering");
///
/// assert_eq!(api.count_endpoint_attachments(&policy_id).await?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockAccessApi {
    state: Arc<RwLock<MockState>>,
}

impl MockAccessApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed `socket_count` in policy listings instead of requiring per-policy lookups
    pub fn with_embedded_counts(self) -> Self {
        self.state.write().unwrap().embed_counts = true;
        self
    }

    /// Make every call to `op` (e.g. `"create_policy"`) fail with `status`
    pub fn fail_operation(&self, op: &str, status: u16) {
        self.state
            .write()
            .unwrap()
            .failing_ops
            .insert(op.to_string(), status);
    }

    /// Make create/update calls for the endpoint named `name` fail with `status`
    pub fn fail_endpoint_named(&self, name: &str, status: u16) {
        self.state
            .write()
            .unwrap()
            .failing_names
            .insert(name.to_string(), status);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.write().unwrap();
        state.failing_ops.clear();
        state.failing_names.clear();
    }

    /// Insert an endpoint directly, returning its id
    pub fn seed_endpoint(&self, name: &str) -> String {
        let mut state = self.state.write().unwrap();
        let id = state.next_id("sock");
        state.endpoints.insert(
            id.clone(),
            Endpoint {
                id: id.clone(),
                name: name.to_string(),
                service_type: None,
                connector_ids: Vec::new(),
                upstream: None,
                public_address: Some(format!("{}.edge.test", name)),
                attached_policies: Vec::new(),
            },
        );
        id
    }

    /// Insert a policy directly, returning its id
    pub fn seed_policy(&self, name: &str) -> String {
        let mut state = self.state.write().unwrap();
        let id = state.next_id("pol");
        state.policies.insert(
            id.clone(),
            Policy {
                id: id.clone(),
                name: name.to_string(),
                description: None,
                socket_count: None,
                socket_ids: None,
            },
        );
        id
    }

    /// Attach a policy to an endpoint directly
    pub fn seed_attachment(&self, endpoint_id: &str, policy_id: &str) {
        self.state
            .write()
            .unwrap()
            .attachments
            .entry(endpoint_id.to_string())
            .or_default()
            .insert(policy_id.to_string());
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        let state = self.state.read().unwrap();
        state
            .endpoints
            .values()
            .map(|e| state.render_endpoint(e))
            .collect()
    }

    pub fn policies(&self) -> Vec<Policy> {
        self.state.read().unwrap().policies.values().cloned().collect()
    }

    pub fn policy_named(&self, name: &str) -> Option<Policy> {
        self.policies().into_iter().find(|p| p.name == name)
    }

    /// Names of the policies attached to an endpoint
    pub fn attached_policy_names(&self, endpoint_id: &str) -> Vec<String> {
        let state = self.state.read().unwrap();
        state
            .attachments
            .get(endpoint_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.policies.get(id).map(|p| p.name.clone()))
            .collect()
    }

    /// Body of the most recent update sent for an endpoint
    pub fn last_update(&self, endpoint_id: &str) -> Option<EndpointUpdate> {
        self.state
            .read()
            .unwrap()
            .updates
            .get(endpoint_id)
            .cloned()
    }

    /// Every operation invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.read().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == op)
            .count()
    }
}

#[async_trait]
impl AccessApi for MockAccessApi {
    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<Endpoint> {
        let mut state = self.state.write().unwrap();
        state.check("create_endpoint", Some(spec.name.as_str()))?;

        let id = state.next_id("sock");
        let endpoint = Endpoint {
            id: id.clone(),
            name: spec.name.clone(),
            service_type: Some(spec.service_type),
            connector_ids: spec.connector_ids.clone(),
            upstream: Some(spec.upstream.clone()),
            public_address: Some(format!("{}.edge.test", spec.name)),
            attached_policies: Vec::new(),
        };
        state.endpoints.insert(id, endpoint.clone());
        Ok(endpoint)
    }

    async fn update_endpoint(
        &self,
        endpoint_id: &str,
        update: &EndpointUpdate,
    ) -> Result<Endpoint> {
        let mut state = self.state.write().unwrap();
        let name = state.endpoints.get(endpoint_id).map(|e| e.name.clone());
        state.check("update_endpoint", name.as_deref())?;

        let Some(endpoint) = state.endpoints.get_mut(endpoint_id) else {
            return Err(not_found("socket", endpoint_id));
        };
        endpoint.upstream = Some(update.upstream.clone());
        let endpoint = endpoint.clone();
        state
            .updates
            .insert(endpoint_id.to_string(), update.clone());
        Ok(state.render_endpoint(&endpoint))
    }

    async fn delete_endpoint(&self, endpoint_id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.check("delete_endpoint", None)?;

        state
            .endpoints
            .remove(endpoint_id)
            .ok_or_else(|| not_found("socket", endpoint_id))?;
        state.attachments.remove(endpoint_id);
        Ok(())
    }

    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut state = self.state.write().unwrap();
        state.check("list_endpoints", None)?;

        Ok(state
            .endpoints
            .values()
            .map(|e| state.render_endpoint(e))
            .collect())
    }

    async fn create_policy(&self, spec: &PolicySpec) -> Result<Policy> {
        let mut state = self.state.write().unwrap();
        state.check("create_policy", None)?;

        if state.policies.values().any(|p| p.name == spec.name) {
            return Err(ConnectError::UnexpectedStatus {
                status: StatusCode::CONFLICT,
                body: format!("policy {} already exists", spec.name),
            });
        }

        let id = state.next_id("pol");
        let policy = Policy {
            id: id.clone(),
            name: spec.name.clone(),
            description: Some(spec.description.clone()),
            socket_count: None,
            socket_ids: None,
        };
        state.policies.insert(id, policy.clone());
        Ok(policy)
    }

    async fn delete_policy(&self, policy_id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.check("delete_policy", None)?;

        state
            .policies
            .remove(policy_id)
            .ok_or_else(|| not_found("policy", policy_id))?;
        for attached in state.attachments.values_mut() {
            attached.remove(policy_id);
        }
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        let mut state = self.state.write().unwrap();
        state.check("list_policies", None)?;

        Ok(state
            .policies
            .values()
            .map(|p| state.render_policy(p))
            .collect())
    }

    async fn count_endpoint_attachments(&self, policy_id: &str) -> Result<u64> {
        let mut state = self.state.write().unwrap();
        state.check("count_endpoint_attachments", None)?;

        if !state.policies.contains_key(policy_id) {
            return Err(not_found("policy", policy_id));
        }
        Ok(state.attachment_count(policy_id))
    }

    async fn attach_policies(&self, endpoint_id: &str, policy_ids: &[String]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.check("attach_policies", None)?;

        if !state.endpoints.contains_key(endpoint_id) {
            return Err(not_found("socket", endpoint_id));
        }
        state
            .attachments
            .entry(endpoint_id.to_string())
            .or_default()
            .extend(policy_ids.iter().cloned());
        Ok(())
    }
}

fn not_found(kind: &str, id: &str) -> ConnectError {
    ConnectError::UnexpectedStatus {
        status: StatusCode::NOT_FOUND,
        body: format!("{} {} not found", kind, id),
    }
}
