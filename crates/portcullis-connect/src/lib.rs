//! Portcullis Connect: typed access to the remote access-control service
//!
//! This crate owns everything that knows about the remote API's shape:
//!
//! - **AccessApi**: the async trait the reconciliation core is written against
//! - **AccessClient**: reqwest implementation with bearer auth and no retries
//! - **normalize**: the single place list containers and id fields are canonicalized
//! - **naming**: deterministic endpoint and personal-policy names
//! - **MockAccessApi**: in-memory service used by tests across the workspace
//!
//! # Example
//!
//! ```rust,no_run
//! use portcullis_connect::{AccessApi, AccessClient, ClientConfig};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = AccessClient::new(ClientConfig::new(
//!         "https://access.example.net/api/v1",
//!         "secret-token",
//!     ))?;
//!
//!     let sockets = client.list_endpoints_by_name_prefix("shell-").await?;
//!     println!("{} shell sockets", sockets.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod mock;
pub mod naming;
pub mod normalize;
pub mod types;

pub use api::AccessApi;
pub use client::{AccessClient, ApiPaths, ClientConfig};
pub use error::{ConnectError, Result};
pub use mock::MockAccessApi;
pub use types::{
    Endpoint, EndpointSpec, EndpointUpdate, Policy, PolicyKind, PolicyRef, PolicySpec,
    ServiceType, ShellAuth, ShellAuthMode, UpstreamTarget,
};
