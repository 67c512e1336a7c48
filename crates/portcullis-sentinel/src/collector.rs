//! Orphaned personal-policy collection
//!
//! Reachability is the only criterion: a personal policy attached to zero
//! live endpoints is deleted on sight, with no grace period. Predefined
//! policies are recognized by *not* following the personal naming convention
//! and are never touched.

use async_trait::async_trait;
use chrono::Utc;
use portcullis_connect::{AccessApi, ConnectError, Policy, PolicyKind};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::daemon::MaintenanceTask;
use crate::metrics::{SweepStats, SweepStatsBuilder};
use crate::policy::MaintenanceRun;

/// Result of checking one policy for orphaning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Zero attachments; the policy was deleted
    Deleted,
    /// Still attached to this many endpoints
    Retained(u64),
}

pub struct GarbageCollector {
    api: Arc<dyn AccessApi>,
}

impl GarbageCollector {
    pub fn new(api: Arc<dyn AccessApi>) -> Self {
        Self { api }
    }

    /// Scan every policy and delete personal policies with zero attachments.
    ///
    /// Fails only if the policy listing itself fails; per-policy errors are
    /// counted in the returned stats.
    pub async fn sweep(&self) -> Result<SweepStats, ConnectError> {
        debug!("Starting policy sweep");
        let mut stats = SweepStatsBuilder::new();

        let policies = self.api.list_policies().await?;
        stats.record_scanned(policies.len());

        for policy in &policies {
            if policy.kind() == PolicyKind::Predefined {
                stats.record_predefined();
                continue;
            }

            match self.collect_listed(policy).await {
                Ok(Collection::Deleted) => stats.record_deleted(),
                Ok(Collection::Retained(_)) => stats.record_retained(),
                Err(e) => {
                    warn!("Failed to collect policy {} ({}): {}", policy.name, policy.id, e);
                    stats.record_error();
                }
            }
        }

        let stats = stats.finish();
        info!("{}", stats.summary());
        Ok(stats)
    }

    /// Check a single personal policy by id and delete it if orphaned.
    ///
    /// Used eagerly after endpoint deletion; always asks the service for a
    /// fresh attachment count.
    pub async fn collect_if_orphaned(&self, policy_id: &str) -> Result<Collection, ConnectError> {
        let count = self.api.count_endpoint_attachments(policy_id).await?;
        self.delete_if_zero(policy_id, count).await
    }

    async fn collect_listed(&self, policy: &Policy) -> Result<Collection, ConnectError> {
        let count = match policy.embedded_attachment_count() {
            Some(count) => count,
            None => self.api.count_endpoint_attachments(&policy.id).await?,
        };
        self.delete_if_zero(&policy.id, count).await
    }

    async fn delete_if_zero(&self, policy_id: &str, count: u64) -> Result<Collection, ConnectError> {
        if count > 0 {
            debug!("Policy {} retained ({} attachments)", policy_id, count);
            return Ok(Collection::Retained(count));
        }

        self.api.delete_policy(policy_id).await?;
        info!("Deleted orphaned policy {}", policy_id);
        Ok(Collection::Deleted)
    }

    /// One sweep, timed and reduced to the outcome the scheduler needs.
    /// Never fails: errors become `success: false`.
    pub async fn run_maintenance_once(&self) -> MaintenanceRun {
        let started_at = Utc::now();
        let start = Instant::now();

        let (success, deleted) = match self.sweep().await {
            Ok(stats) => (stats.is_clean(), stats.deleted),
            Err(e) => {
                error!("Policy sweep failed: {}", e);
                (false, 0)
            }
        };

        MaintenanceRun {
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            success,
            deleted,
        }
    }
}

#[async_trait]
impl MaintenanceTask for GarbageCollector {
    async fn run_once(&self) -> MaintenanceRun {
        self.run_maintenance_once().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_connect::MockAccessApi;

    fn collector(api: &MockAccessApi) -> GarbageCollector {
        GarbageCollector::new(Arc::new(api.clone()))
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_unattached_personal_policies() {
        let api = MockAccessApi::new();
        let endpoint = api.seed_endpoint("shell-c1234567");
        let attached = api.seed_policy("user-policy-alice-example-com");
        let orphan = api.seed_policy("user-policy-bob-example-com");
        let global = api.seed_policy("engineering");
        api.seed_attachment(&endpoint, &attached);

        let stats = collector(&api).sweep().await.unwrap();

        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.retained, 1);
        assert_eq!(stats.predefined, 1);

        let remaining: Vec<String> = api.policies().into_iter().map(|p| p.id).collect();
        assert!(remaining.contains(&attached));
        assert!(remaining.contains(&global));
        assert!(!remaining.contains(&orphan));
    }

    #[tokio::test]
    async fn test_sweep_uses_embedded_counts_when_present() {
        let api = MockAccessApi::new().with_embedded_counts();
        api.seed_policy("user-policy-bob-example-com");

        let stats = collector(&api).sweep().await.unwrap();

        assert_eq!(stats.deleted, 1);
        assert_eq!(api.call_count("count_endpoint_attachments"), 0);
    }

    #[tokio::test]
    async fn test_predefined_policy_with_zero_attachments_survives() {
        let api = MockAccessApi::new();
        let global = api.seed_policy("contractors");

        collector(&api).sweep().await.unwrap();

        assert!(api.policies().iter().any(|p| p.id == global));
        assert_eq!(api.call_count("delete_policy"), 0);
    }

    #[tokio::test]
    async fn test_listing_failure_fails_the_run() {
        let api = MockAccessApi::new();
        api.fail_operation("list_policies", 503);

        let run = collector(&api).run_maintenance_once().await;

        assert!(!run.success);
        assert_eq!(run.deleted, 0);
    }

    #[tokio::test]
    async fn test_delete_failure_is_counted_not_raised() {
        let api = MockAccessApi::new();
        api.seed_policy("user-policy-a");
        api.seed_policy("user-policy-b");
        api.fail_operation("delete_policy", 500);

        let stats = collector(&api).sweep().await.unwrap();
        assert_eq!(stats.errors, 2);

        let run = collector(&api).run_maintenance_once().await;
        assert!(!run.success);
    }

    #[tokio::test]
    async fn test_unknown_attachment_count_keeps_policy() {
        let api = MockAccessApi::new();
        let policy = api.seed_policy("user-policy-a");
        api.fail_operation("count_endpoint_attachments", 502);

        let stats = collector(&api).sweep().await.unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.deleted, 0);
        assert_eq!(api.call_count("delete_policy"), 0);
        assert!(api.policies().iter().any(|p| p.id == policy));
        assert!(collector(&api).collect_if_orphaned(&policy).await.is_err());
    }

    #[tokio::test]
    async fn test_collect_if_orphaned() {
        let api = MockAccessApi::new();
        let endpoint = api.seed_endpoint("web-c1234567");
        let policy = api.seed_policy("user-policy-a");
        api.seed_attachment(&endpoint, &policy);

        let gc = collector(&api);
        assert_eq!(
            gc.collect_if_orphaned(&policy).await.unwrap(),
            Collection::Retained(1)
        );

        api.delete_endpoint(&endpoint).await.unwrap();
        assert_eq!(
            gc.collect_if_orphaned(&policy).await.unwrap(),
            Collection::Deleted
        );
        assert!(api.policies().is_empty());
    }
}
