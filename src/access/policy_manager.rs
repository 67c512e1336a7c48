//! Personal-policy resolution and attachment
//!
//! Each principal gets exactly one personal policy, named after their email
//! and shared by every endpoint they own. Creation is optimistic: the service
//! does not let this client verify identities up front, so a failed create
//! degrades the endpoint to global-only access instead of failing it.

use portcullis_connect::{naming, AccessApi, ConnectError, PolicySpec};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// HTTP status the service answers with when a policy name is taken
const CONFLICT: u16 = 409;

/// The personal policy for one principal, resolved once per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonalPolicy {
    /// No principal on the request
    None,
    Resolved(String),
    /// The personal policy could not be resolved; carries the reason.
    ///
    /// Covers both a failed lookup (e.g. the listing call erred) and a failed
    /// create, including a 409 whose re-lookup did not find the policy.
    Unavailable(String),
}

/// What an attach call ended up doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttachOutcome {
    /// Personal (when requested) and predefined policies attached
    Attached { policy_ids: Vec<String> },
    /// The personal policy was unavailable; only predefined policies attached
    AttachedGlobalOnly {
        policy_ids: Vec<String>,
        reason: String,
    },
    /// The personal policy was unavailable and there was nothing else to attach
    Failed { reason: String },
    /// Nothing to attach; no call made
    Skipped,
}

impl AttachOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            AttachOutcome::AttachedGlobalOnly { .. } | AttachOutcome::Failed { .. }
        )
    }
}

pub struct PolicyManager {
    api: Arc<dyn AccessApi>,
}

impl PolicyManager {
    pub fn new(api: Arc<dyn AccessApi>) -> Self {
        Self { api }
    }

    /// Find or create the personal policy for `email`. Never fails.
    pub async fn resolve_personal(&self, email: Option<&str>) -> PersonalPolicy {
        let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
            return PersonalPolicy::None;
        };
        let name = naming::personal_policy_name(email);

        match self.api.find_policy_by_name(&name).await {
            Ok(Some(policy)) => {
                debug!("Reusing personal policy {} ({})", name, policy.id);
                return PersonalPolicy::Resolved(policy.id);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Personal policy lookup for {} failed: {}", email, e);
                return PersonalPolicy::Unavailable(e.to_string());
            }
        }

        match self.api.create_policy(&PolicySpec::personal(email)).await {
            Ok(policy) => {
                info!("Created personal policy {} ({})", name, policy.id);
                PersonalPolicy::Resolved(policy.id)
            }
            Err(e) if is_conflict(&e) => self.adopt_concurrent(&name, e).await,
            Err(e) => {
                warn!(
                    "Could not create personal policy for {}; attaching global policies only: {}",
                    email, e
                );
                PersonalPolicy::Unavailable(e.to_string())
            }
        }
    }

    /// Someone else created the policy between our lookup and our create
    async fn adopt_concurrent(&self, name: &str, conflict: ConnectError) -> PersonalPolicy {
        match self.api.find_policy_by_name(name).await {
            Ok(Some(policy)) => {
                debug!("Personal policy {} created concurrently; reusing", name);
                PersonalPolicy::Resolved(policy.id)
            }
            _ => {
                warn!("Personal policy {} conflicted but is not listed: {}", name, conflict);
                PersonalPolicy::Unavailable(conflict.to_string())
            }
        }
    }

    /// Resolve the personal policy and attach it with the predefined ones
    pub async fn attach(
        &self,
        endpoint_id: &str,
        email: Option<&str>,
        predefined_policy_ids: &[String],
    ) -> Result<AttachOutcome, ConnectError> {
        let personal = self.resolve_personal(email).await;
        self.attach_resolved(endpoint_id, &personal, predefined_policy_ids)
            .await
    }

    /// Attach an already-resolved personal policy plus the predefined ones in
    /// one bulk call. Only the bulk call itself can fail.
    pub async fn attach_resolved(
        &self,
        endpoint_id: &str,
        personal: &PersonalPolicy,
        predefined_policy_ids: &[String],
    ) -> Result<AttachOutcome, ConnectError> {
        let mut policy_ids = predefined_policy_ids.to_vec();

        let degraded = match personal {
            PersonalPolicy::None => None,
            PersonalPolicy::Resolved(id) => {
                if !policy_ids.contains(id) {
                    policy_ids.push(id.clone());
                }
                None
            }
            PersonalPolicy::Unavailable(reason) => Some(reason.clone()),
        };

        if policy_ids.is_empty() {
            return Ok(match degraded {
                Some(reason) => AttachOutcome::Failed { reason },
                None => AttachOutcome::Skipped,
            });
        }

        self.api.attach_policies(endpoint_id, &policy_ids).await?;
        debug!("Attached {} policies to {}", policy_ids.len(), endpoint_id);

        Ok(match degraded {
            Some(reason) => AttachOutcome::AttachedGlobalOnly { policy_ids, reason },
            None => AttachOutcome::Attached { policy_ids },
        })
    }
}

fn is_conflict(err: &ConnectError) -> bool {
    err.status().map(|s| s.as_u16()) == Some(CONFLICT)
}
