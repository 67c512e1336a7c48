//! Portcullis Sentinel: orphaned-policy collection on an adaptive schedule
//!
//! Personal policies are created lazily and shared across every endpoint a
//! principal owns, so nothing deletes them when endpoints go away. The
//! sentinel sweeps them up.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  fire   ┌──────────────────────┐
//! │ MaintenanceScheduler │ ──────> │   GarbageCollector   │
//! │   (Idle / Running)   │ <────── │  list -> count -> rm │
//! └──────────────────────┘   run   └──────────────────────┘
//!            │
//!            └──> BackoffPolicy picks the next delay:
//!                 slow or failed -> jittered [0, 5m]
//!                 healthy        -> fixed 1h
//! ```
//!
//! # Example
//!
//! ```no_run
//! use portcullis_connect::{AccessClient, ClientConfig};
//! use portcullis_sentinel::{BackoffPolicy, GarbageCollector, MaintenanceScheduler};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = AccessClient::new(ClientConfig::new("https://access.example.net/api/v1", "token"))?;
//! let gc = Arc::new(GarbageCollector::new(Arc::new(client)));
//!
//! MaintenanceScheduler::new(gc, BackoffPolicy::default()).run().await;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod daemon;
pub mod metrics;
pub mod policy;

pub use collector::{Collection, GarbageCollector};
pub use daemon::{MaintenanceScheduler, MaintenanceTask, SchedulerState};
pub use metrics::SweepStats;
pub use policy::{BackoffPolicy, MaintenanceRun};
