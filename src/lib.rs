/*!
 * Portcullis - workload access provisioning
 *
 * Converges an identity-aware access-control service to the workloads that
 * are actually running:
 * - one endpoint per (workload, service type), found by deterministic name
 * - one personal policy per principal, shared by all of their endpoints
 * - orphaned personal policies collected on an adaptive schedule
 */

pub mod access;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod provision;
pub mod services;

// Re-export commonly used types
pub use access::{AttachOutcome, DesiredEndpoint, EndpointReconciler, PolicyManager, Reconciled};
pub use config::{Config, LogLevel};
pub use discovery::{StaticDiscovery, WorkloadDiscovery, WorkloadInfo};
pub use error::{PortcullisError, Result};
pub use provision::{
    Portcullis, ProvisionRequest, ReconcileReport, ServiceOutcome, TeardownReport,
};
pub use services::{ServiceConfig, ServiceRequest};

pub use portcullis_connect::ServiceType;
pub use portcullis_sentinel::MaintenanceRun;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
