//! AccessClient: reqwest-backed implementation of `AccessApi`

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::api::AccessApi;
use crate::error::{ConnectError, Result};
use crate::normalize::{normalize_item, normalize_list, ResourceKind};
use crate::types::{Endpoint, EndpointSpec, EndpointUpdate, Policy, PolicySpec};

/// Resource path segments.
///
/// Collection and item paths are configured separately because deployed
/// service versions do not agree on pluralization (`/sockets` vs `/socket/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiPaths {
    pub endpoint_collection: String,
    pub endpoint_item: String,
    pub policy_collection: String,
    pub policy_item: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            endpoint_collection: "sockets".to_string(),
            endpoint_item: "socket".to_string(),
            policy_collection: "policies".to_string(),
            policy_item: "policy".to_string(),
        }
    }
}

/// Connection settings for `AccessClient`
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    pub paths: ApiPaths,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
            paths: ApiPaths::default(),
        }
    }
}

/// Typed client over the remote access-control REST API.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct AccessClient {
    http: Client,
    base_url: String,
    token: String,
    paths: ApiPaths,
}

impl AccessClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(ConnectError::InvalidConfig("base_url is empty".to_string()));
        }
        if config.token.is_empty() {
            return Err(ConnectError::InvalidConfig("API token is empty".to_string()));
        }

        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
            paths: config.paths,
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(segment.trim_matches('/'));
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!("{} {}", method, url);
        self.http.request(method, url).bearer_auth(&self.token)
    }

    /// Send a request and decode its JSON body; empty bodies become `Value::Null`
    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::UnexpectedStatus { status, body });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|source| ConnectError::Decode {
            kind: "response",
            source,
        })
    }
}

#[async_trait]
impl AccessApi for AccessClient {
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<Endpoint> {
        let value = self
            .send(
                self.request(Method::POST, &[&self.paths.endpoint_collection])
                    .json(spec),
            )
            .await?;
        normalize_item(value, ResourceKind::Endpoint, None)
    }

    #[instrument(skip(self, update))]
    async fn update_endpoint(
        &self,
        endpoint_id: &str,
        update: &EndpointUpdate,
    ) -> Result<Endpoint> {
        let value = self
            .send(
                self.request(Method::PUT, &[&self.paths.endpoint_item, endpoint_id])
                    .json(update),
            )
            .await?;
        normalize_item(value, ResourceKind::Endpoint, Some(endpoint_id))
    }

    #[instrument(skip(self))]
    async fn delete_endpoint(&self, endpoint_id: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &[&self.paths.endpoint_item, endpoint_id]))
            .await?;
        Ok(())
    }

    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let value = self
            .send(self.request(Method::GET, &[&self.paths.endpoint_collection]))
            .await?;
        normalize_list(value, ResourceKind::Endpoint)
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create_policy(&self, spec: &PolicySpec) -> Result<Policy> {
        let value = self
            .send(
                self.request(Method::POST, &[&self.paths.policy_collection])
                    .json(spec),
            )
            .await?;
        normalize_item(value, ResourceKind::Policy, None)
    }

    #[instrument(skip(self))]
    async fn delete_policy(&self, policy_id: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &[&self.paths.policy_item, policy_id]))
            .await?;
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        let value = self
            .send(self.request(Method::GET, &[&self.paths.policy_collection]))
            .await?;
        normalize_list(value, ResourceKind::Policy)
    }

    async fn count_endpoint_attachments(&self, policy_id: &str) -> Result<u64> {
        let value = self
            .send(self.request(
                Method::GET,
                &[
                    &self.paths.policy_item,
                    policy_id,
                    &self.paths.endpoint_collection,
                ],
            ))
            .await?;
        // An empty body is not a count
        if value.is_null() {
            return Err(ConnectError::UnexpectedShape {
                kind: ResourceKind::Endpoint.label(),
                detail: "empty attachment listing".to_string(),
            });
        }
        let attached: Vec<Value> = normalize_list(value, ResourceKind::Endpoint)?;
        Ok(attached.len() as u64)
    }

    #[instrument(skip(self, policy_ids), fields(count = policy_ids.len()))]
    async fn attach_policies(&self, endpoint_id: &str, policy_ids: &[String]) -> Result<()> {
        let actions: Vec<Value> = policy_ids
            .iter()
            .map(|id| json!({ "action": "add", "id": id }))
            .collect();
        self.send(
            self.request(
                Method::PUT,
                &[&self.paths.endpoint_item, endpoint_id, &self.paths.policy_item],
            )
            .json(&json!({ "actions": actions })),
        )
        .await?;
        Ok(())
    }
}
