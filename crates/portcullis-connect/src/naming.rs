//! Deterministic resource names
//!
//! Endpoint names are the sole idempotency key for reconciliation, and
//! personal-policy names are the deduplication key for principals. Both are
//! derived here so every component agrees on them.

use crate::types::ServiceType;

/// Marker prefix shared by every personal policy
pub const PERSONAL_POLICY_PREFIX: &str = "user-policy-";

/// Number of workload-id characters kept in endpoint names
pub const SHORT_ID_LEN: usize = 8;

/// First `SHORT_ID_LEN` characters of a workload id
pub fn short_id(workload_id: &str) -> &str {
    match workload_id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &workload_id[..idx],
        None => workload_id,
    }
}

/// `{service_type}-{short_id}`, e.g. `shell-c1234567`
pub fn endpoint_name(service_type: ServiceType, workload_id: &str) -> String {
    format!("{}-{}", service_type.as_str(), short_id(workload_id))
}

/// Split an endpoint name back into its service type and short workload id
pub fn parse_endpoint_name(name: &str) -> Option<(ServiceType, &str)> {
    let (prefix, short) = name.split_once('-')?;
    let service_type = ServiceType::ALL
        .into_iter()
        .find(|t| t.as_str() == prefix)?;
    if short.is_empty() {
        return None;
    }
    Some((service_type, short))
}

/// True when `name` is the deterministic name of some endpoint owned by `workload_id`
pub fn belongs_to_workload(name: &str, workload_id: &str) -> bool {
    matches!(parse_endpoint_name(name), Some((_, short)) if short == short_id(workload_id))
}

/// Personal policy name for a principal: every non-alphanumeric character
/// becomes `-`, e.g. `dev@example.com` -> `user-policy-dev-example-com`
pub fn personal_policy_name(email: &str) -> String {
    let slug: String = email
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}{}", PERSONAL_POLICY_PREFIX, slug)
}

pub fn is_personal_policy(name: &str) -> bool {
    name.starts_with(PERSONAL_POLICY_PREFIX)
}
