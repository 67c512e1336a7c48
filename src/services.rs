//! Per-service-type configuration resolution
//!
//! Every service type gets a `ServiceConfig` before reconciliation starts.
//! Sources, highest precedence first:
//!
//! 1. the explicit provisioning request
//! 2. workload labels `portcullis.<type>.enabled` / `portcullis.<type>.port`
//! 3. built-in default ports; types are disabled unless requested or labelled

use portcullis_connect::ServiceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const LABEL_PREFIX: &str = "portcullis";

/// Label naming the principal that owns a workload
pub const OWNER_LABEL: &str = "portcullis.owner";

/// Explicit per-type overrides carried by a provisioning request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Defaults to enabled when the type appears in the request at all
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl ServiceRequest {
    pub fn on_port(port: u16) -> Self {
        Self {
            enabled: Some(true),
            port: Some(port),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: Some(false),
            port: None,
        }
    }
}

/// Resolved configuration for one service type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub enabled: bool,
    /// 0 when disabled and no port is known
    pub port: u16,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("label {key} has invalid value {value:?}")]
    InvalidLabel { key: String, value: String },

    #[error("{0} is enabled but has no port")]
    MissingPort(ServiceType),
}

/// Port used when neither the request nor a label names one
pub fn default_port(service_type: ServiceType) -> Option<u16> {
    match service_type {
        ServiceType::Shell => Some(22),
        ServiceType::Desktop => Some(5900),
        ServiceType::Web => Some(80),
        ServiceType::Tcp => None,
        ServiceType::Rdp => Some(3389),
        ServiceType::Database => Some(5432),
    }
}

pub fn label_key(service_type: ServiceType, field: &str) -> String {
    format!("{}.{}.{}", LABEL_PREFIX, service_type.as_str(), field)
}

/// Principal email from the owner label, if any
pub fn owner_email(labels: &BTreeMap<String, String>) -> Option<&str> {
    labels
        .get(OWNER_LABEL)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Resolve one service type
pub fn resolve(
    service_type: ServiceType,
    request: Option<&ServiceRequest>,
    labels: &BTreeMap<String, String>,
) -> Result<ServiceConfig, ResolveError> {
    let label_enabled = parse_label::<bool>(labels, label_key(service_type, "enabled"))?;
    let label_port = parse_label::<u16>(labels, label_key(service_type, "port"))?;

    let enabled = match request {
        Some(request) => request.enabled.unwrap_or(true),
        None => label_enabled.unwrap_or(false),
    };

    let port = request
        .and_then(|r| r.port)
        .or(label_port)
        .or_else(|| default_port(service_type))
        .filter(|port| *port != 0);

    match (enabled, port) {
        (true, None) => Err(ResolveError::MissingPort(service_type)),
        (enabled, port) => Ok(ServiceConfig {
            enabled,
            port: port.unwrap_or(0),
        }),
    }
}

/// Resolve every service type
pub fn resolve_all(
    requests: &BTreeMap<ServiceType, ServiceRequest>,
    labels: &BTreeMap<String, String>,
) -> BTreeMap<ServiceType, Result<ServiceConfig, ResolveError>> {
    ServiceType::ALL
        .into_iter()
        .map(|t| (t, resolve(t, requests.get(&t), labels)))
        .collect()
}

fn parse_label<T: std::str::FromStr>(
    labels: &BTreeMap<String, String>,
    key: String,
) -> Result<Option<T>, ResolveError> {
    match labels.get(&key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ResolveError::InvalidLabel {
                key,
                value: value.clone(),
            }),
    }
}
