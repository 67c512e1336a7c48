//! Remote resource model: endpoints (sockets), policies and the request bodies
//! used to create or mutate them.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::naming;

/// Kind of service exposed through an endpoint.
///
/// The serialized form is the remote service's wire name (`ssh`, `vnc`, ...);
/// the friendly names used in configuration and endpoint names are accepted
/// as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceType {
    #[serde(rename = "ssh", alias = "shell")]
    Shell,
    #[serde(rename = "vnc", alias = "desktop")]
    Desktop,
    #[serde(rename = "http", alias = "web")]
    Web,
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "rdp")]
    Rdp,
    #[serde(rename = "database")]
    Database,
}

impl ServiceType {
    pub const ALL: [ServiceType; 6] = [
        ServiceType::Shell,
        ServiceType::Desktop,
        ServiceType::Web,
        ServiceType::Tcp,
        ServiceType::Rdp,
        ServiceType::Database,
    ];

    /// Friendly name, used as the endpoint name prefix and in labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Shell => "shell",
            ServiceType::Desktop => "desktop",
            ServiceType::Web => "web",
            ServiceType::Tcp => "tcp",
            ServiceType::Rdp => "rdp",
            ServiceType::Database => "database",
        }
    }

    /// Name the remote service uses for this socket type
    pub fn wire_name(&self) -> &'static str {
        match self {
            ServiceType::Shell => "ssh",
            ServiceType::Desktop => "vnc",
            ServiceType::Web => "http",
            ServiceType::Tcp => "tcp",
            ServiceType::Rdp => "rdp",
            ServiceType::Database => "database",
        }
    }

    /// Whether updates for this type carry an authentication sub-configuration
    pub fn has_credentials(&self) -> bool {
        matches!(self, ServiceType::Shell)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ServiceType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered || t.wire_name() == lowered)
            .ok_or_else(|| format!("unknown service type: {}", s))
    }
}

/// Host/port pair reachable from inside the workload's network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
}

impl UpstreamTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// How a shell endpoint authenticates against the upstream host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShellAuthMode {
    /// Short-lived certificates issued by the access service
    #[default]
    Certificate,
    /// Static key configured on the upstream host
    PublicKey,
}

/// Authentication sub-configuration for shell endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellAuth {
    pub username: String,
    #[serde(rename = "authentication_type")]
    pub mode: ShellAuthMode,
}

/// Reference to a policy as embedded in an endpoint record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRef {
    #[serde(alias = "policy_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Remote endpoint ("socket") record, already normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    /// `None` when the record carries no type or one this crate does not manage
    #[serde(
        default,
        rename = "socket_type",
        deserialize_with = "known_service_type"
    )]
    pub service_type: Option<ServiceType>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub connector_ids: Vec<String>,
    #[serde(default)]
    pub upstream: Option<UpstreamTarget>,
    #[serde(default, alias = "dnsname")]
    pub public_address: Option<String>,
    #[serde(default, rename = "policies", deserialize_with = "null_as_empty")]
    pub attached_policies: Vec<PolicyRef>,
}

/// Socket types outside [`ServiceType`] (VPN, for instance) exist on the
/// service but are never created here; they decode as untyped.
fn known_service_type<'de, D>(deserializer: D) -> Result<Option<ServiceType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|name| name.parse().ok()))
}

/// Collections the service may send as `null` instead of `[]`
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Endpoint {
    /// Ids of attached policies whose names follow the personal-policy convention.
    ///
    /// References without a name are returned separately so callers can resolve them.
    pub fn personal_policy_ids(&self) -> (Vec<String>, Vec<String>) {
        let mut personal = Vec::new();
        let mut unnamed = Vec::new();
        for policy in &self.attached_policies {
            match &policy.name {
                Some(name) if naming::is_personal_policy(name) => personal.push(policy.id.clone()),
                Some(_) => {}
                None => unnamed.push(policy.id.clone()),
            }
        }
        (personal, unnamed)
    }
}

/// Full desired configuration for creating an endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSpec {
    pub name: String,
    #[serde(rename = "socket_type")]
    pub service_type: ServiceType,
    pub connector_ids: Vec<String>,
    pub upstream: UpstreamTarget,
    #[serde(rename = "ssh", skip_serializing_if = "Option::is_none")]
    pub shell_auth: Option<ShellAuth>,
}

/// Fields that may legitimately change across workload restarts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointUpdate {
    pub upstream: UpstreamTarget,
    #[serde(rename = "ssh", skip_serializing_if = "Option::is_none")]
    pub shell_auth: Option<ShellAuth>,
}

impl From<&EndpointSpec> for EndpointUpdate {
    fn from(spec: &EndpointSpec) -> Self {
        Self {
            upstream: spec.upstream.clone(),
            shell_auth: spec.shell_auth.clone(),
        }
    }
}

/// Personal vs. externally managed policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Personal,
    Predefined,
}

/// Remote policy record, already normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_ids: Option<Vec<String>>,
}

impl Policy {
    pub fn kind(&self) -> PolicyKind {
        if naming::is_personal_policy(&self.name) {
            PolicyKind::Personal
        } else {
            PolicyKind::Predefined
        }
    }

    /// Attachment count embedded in the listing, when the service provides one
    pub fn embedded_attachment_count(&self) -> Option<u64> {
        self.socket_count
            .or_else(|| self.socket_ids.as_ref().map(|ids| ids.len() as u64))
    }
}

/// Principal restriction attached to a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCondition {
    pub who: PolicyWho,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyWho {
    pub email: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyData {
    pub version: String,
    pub action: Vec<String>,
    pub condition: PolicyCondition,
}

/// Body for creating a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySpec {
    pub name: String,
    pub description: String,
    pub policy_data: PolicyData,
}

impl PolicySpec {
    /// Personal policy for one principal, granting every supported service type
    pub fn personal(email: &str) -> Self {
        Self {
            name: naming::personal_policy_name(email),
            description: format!("Personal access for {}", email),
            policy_data: PolicyData {
                version: "v1".to_string(),
                action: ServiceType::ALL
                    .iter()
                    .map(|t| t.wire_name().to_string())
                    .collect(),
                condition: PolicyCondition {
                    who: PolicyWho {
                        email: vec![email.to_string()],
                    },
                },
            },
        }
    }
}
