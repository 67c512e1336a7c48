//! Workload discovery
//!
//! Translates a container or pod identifier into an address and label set.
//! Runtime-specific adapters (Docker, Kubernetes) implement `WorkloadDiscovery`
//! outside this crate; `StaticDiscovery` serves workloads listed in config.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::config::StaticWorkload;
use crate::error::Result;

/// What discovery knows about a running workload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadInfo {
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait WorkloadDiscovery: Send + Sync {
    /// `Ok(None)` when the workload does not exist
    async fn workload_info(&self, id: &str, namespace: Option<&str>)
        -> Result<Option<WorkloadInfo>>;
}

/// Discovery backed by a fixed list of workloads
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    workloads: Vec<StaticWorkload>,
}

impl StaticDiscovery {
    pub fn new(workloads: Vec<StaticWorkload>) -> Self {
        Self { workloads }
    }
}

#[async_trait]
impl WorkloadDiscovery for StaticDiscovery {
    async fn workload_info(
        &self,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<Option<WorkloadInfo>> {
        let found = self.workloads.iter().find(|w| {
            w.id == id && (namespace.is_none() || w.namespace.as_deref() == namespace)
        });

        Ok(found.map(|w| WorkloadInfo {
            ip: w.ip,
            labels: w.labels.clone(),
            email: w.email.clone(),
        }))
    }
}
